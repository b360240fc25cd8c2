//! Convenience re-exports for common `rssky` types.
//!
//! ```ignore
//! use rssky::prelude::*;
//! ```
//!
//! Covers a full run: the client, the store, identities, both pipelines,
//! and event handlers. Extraction internals and schema helpers are left
//! out; import those from their modules when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatBackend, ChatRequest, Message, ModelSettings, OpenAiClient, json_schema_for};

// ── Cache ───────────────────────────────────────────────────────────
pub use crate::cache::{
    ArtifactStore, CacheSettings, ClearReport, EvictionReport, Importance, SourceSnapshot, SummaryRecord,
};
pub use crate::content::{ContentExtractor, InlineContentExtractor, ensure_content, placeholder_content};
pub use crate::identity::{ItemIdentity, SourceIdentity, item_id, source_id};
pub use crate::item::{FeedItem, PeriodItem};

// ── Pipelines ───────────────────────────────────────────────────────
pub use crate::api::{RetryPolicy, Sleeper, TokioSleeper};
pub use crate::error::{DigestError, StorageError, UpstreamError};
pub use crate::pipeline::{
    CompositeEventHandler, DigestRecord, Digester, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, PipelineEvent, PromptTemplates, Story, Summarized, Summarizer, SummaryOutcome,
};
