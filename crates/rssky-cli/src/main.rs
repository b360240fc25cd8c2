//! `rssky`: summarize feed items and aggregate them into a digest.
//!
//! # Examples
//!
//! ```sh
//! # Summarize items.json and print the digest
//! rssky run --items items.json
//!
//! # Regenerate every summary and write the digest to a file
//! rssky run --items items.json --force --out digest.json
//!
//! # Drop cached items older than three days
//! rssky evict --days 3
//! ```

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use rssky::prelude::*;
use rssky_cli::{API_KEY_ENV, Config, DEFAULT_CONFIG_PATH, Runner, load_items};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for configuration and input errors.
const EXIT_CONFIG: i32 = 1;
/// Exit code for failures while processing.
const EXIT_PROCESSING: i32 = 3;

/// Summarize feed items and aggregate them into a digest.
#[derive(Parser)]
#[command(name = "rssky", version)]
struct Cli {
    /// Path to the TOML config file. Created with defaults when missing.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[cache].dir`.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Override `[api].model`.
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize every item in a JSON file and build the digest.
    Run {
        /// JSON array of `{feed_url, feed_title, ...item fields}`.
        #[arg(long)]
        items: PathBuf,

        /// Regenerate summaries even when cached.
        #[arg(long)]
        force: bool,

        /// Write the digest here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Clear the whole cache before starting.
        #[arg(long)]
        clear_cache: bool,
    },
    /// Remove cached items not touched within the retention window.
    Evict {
        /// Retention in days. Defaults to `[cache].retention_days`.
        #[arg(long)]
        days: Option<u64>,
    },
    /// Remove cached artifacts for one source, or for all of them.
    Clear {
        /// Source identity (directory name) to clear.
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_or_init(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            process::exit(EXIT_CONFIG);
        }
    };
    config.apply_key_override(std::env::var(API_KEY_ENV).ok());
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = dir;
    }
    if let Some(model) = cli.model {
        config.api.model = model;
    }

    let code = match cli.command {
        Command::Run {
            items,
            force,
            out,
            clear_cache,
        } => run(&config, &items, force, out, clear_cache).await,
        Command::Evict { days } => evict(&config, days),
        Command::Clear { source } => clear(&config, source),
    };
    process::exit(code);
}

async fn run(
    config: &Config,
    items_path: &std::path::Path,
    force: bool,
    out: Option<PathBuf>,
    clear_cache: bool,
) -> i32 {
    let items = match load_items(items_path) {
        Ok(items) => items,
        Err(e) => {
            error!("{e}");
            return EXIT_CONFIG;
        }
    };
    let client = match OpenAiClient::new(&config.api.url, config.api_key()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create API client: {e}");
            return EXIT_CONFIG;
        }
    };
    let store = match ArtifactStore::initialize(
        &config.cache.dir,
        &config.cache_settings(clear_cache),
        &LoggingHandler,
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open cache: {e}");
            return EXIT_PROCESSING;
        }
    };

    let prompts = config.prompt_templates();
    let settings = config.model_settings();
    info!(
        "Processing {} item(s) with {} via {}",
        items.len(),
        settings.model,
        client.endpoint()
    );

    let runner = Runner {
        store: &store,
        backend: &client,
        prompts: &prompts,
        settings: &settings,
        events: &LoggingHandler,
        snapshot_max_age_hours: config.cache.snapshot_max_age_hours,
    };
    let digest = match runner.run(&items, force).await {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            return EXIT_PROCESSING;
        }
    };

    let json = match serde_json::to_string_pretty(&digest) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize digest: {e}");
            return EXIT_PROCESSING;
        }
    };
    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, json) {
                error!("Failed to write {}: {e}", path.display());
                return EXIT_PROCESSING;
            }
            info!(
                "Digest with {} story(ies) written to {}",
                digest.stories.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    0
}

fn evict(config: &Config, days: Option<u64>) -> i32 {
    let store = match ArtifactStore::open(&config.cache.dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open cache: {e}");
            return EXIT_PROCESSING;
        }
    };
    let report =
        store.evict_older_than(days.unwrap_or(config.cache.retention_days), &LoggingHandler);
    info!("Removed {} item(s), {} failure(s)", report.removed, report.failed);
    if report.failed > 0 { EXIT_PROCESSING } else { 0 }
}

fn clear(config: &Config, source: Option<String>) -> i32 {
    let store = match ArtifactStore::open(&config.cache.dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open cache: {e}");
            return EXIT_PROCESSING;
        }
    };
    let result = match source {
        Some(source) => {
            if matches!(source.as_str(), "" | "." | "..") || source.contains(['/', '\\']) {
                error!("Invalid source identity '{source}'");
                return EXIT_CONFIG;
            }
            let source = SourceIdentity::from_raw(source);
            store.clear_source(&source).map(|()| {
                info!("Cleared {source}");
                true
            })
        }
        None => store.clear_all().map(|report| {
            info!(
                "Cleared {} source(s), {} failure(s)",
                report.removed, report.failed
            );
            report.failed == 0
        }),
    };
    match result {
        Ok(true) => 0,
        Ok(false) => EXIT_PROCESSING,
        Err(e) => {
            error!("{e}");
            EXIT_PROCESSING
        }
    }
}
