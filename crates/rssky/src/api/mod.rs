//! Upstream interaction support: retry policy and response-shape hints.
//!
//! - [`retry`]: bounded [`RetryPolicy`] with fixed or exponential pauses,
//!   and the [`Sleeper`] seam used to make retries testable.
//! - [`schema`]: JSON Schema hints for the summary and digest responses,
//!   the model check deciding whether to send them, and validation of
//!   responses against them.

pub mod retry;
pub mod schema;

pub use retry::{Backoff, RecordingSleeper, RetryPolicy, SleepFuture, Sleeper, TokioSleeper};
pub use schema::{accepts_schema_hint, digest_schema, schema_violations, summary_schema};
