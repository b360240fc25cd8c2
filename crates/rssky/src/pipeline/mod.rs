//! Artifact-producing pipelines.
//!
//! - [`summarize::Summarizer`]: one feed item to one cached
//!   [`SummaryRecord`](crate::cache::SummaryRecord). Cache hit, bounded
//!   retry, sentinel handling and fallback all live here.
//! - [`digest::Digester`]: the period's cached summaries to a single
//!   [`DigestRecord`].
//! - [`prompt`]: the templates both of them render.
//! - [`events`]: the [`EventHandler`] trait and the [`PipelineEvent`]s
//!   reported along the way.

pub mod digest;
pub mod events;
pub mod prompt;
pub mod summarize;

pub use digest::{
    ALTERNATE_STORY_KEYS, DigestRecord, Digester, IMPORTANCE_THRESHOLD, SourceAttribution, Story,
};
pub use events::{
    CompositeEventHandler, EventHandler, FallbackReason, FnEventHandler, LoggingHandler,
    NoopHandler, PipelineEvent, RecordingHandler,
};
pub use prompt::PromptTemplates;
pub use summarize::{FALLBACK_IMPACT, Summarized, Summarizer, SummaryOutcome, fallback_record};
