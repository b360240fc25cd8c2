//! Command-line runner for the `rssky` pipeline.
//!
//! The binary is a thin shell around two pieces that are usable on their
//! own:
//!
//! - [`Config`]: the TOML configuration file and its conversion into
//!   library settings.
//! - [`Runner`]: one pass over an items file, from content caching through
//!   the digest.
//!
//! ```ignore
//! use rssky_cli::{Config, Runner, load_items};
//!
//! let config = Config::load_or_init("rssky.toml".as_ref())?;
//! let items = load_items("items.json".as_ref())?;
//! ```

pub mod config;
pub mod runner;

pub use config::{API_KEY_ENV, Config, ConfigError, DEFAULT_CONFIG_PATH};
pub use runner::{InputError, RunItem, Runner, load_items};
