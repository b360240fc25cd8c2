//! Events and handlers for the summarization and digest pipelines.
//!
//! Pipeline components never log through a global. They receive an
//! injected [`EventHandler`] and report what happened as typed
//! [`PipelineEvent`]s; the caller decides whether those become `tracing`
//! output, counters in a test, or nothing at all.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`RecordingHandler`] | Assertions on the sequence of events |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::identity::{ItemIdentity, SourceIdentity};

// ── Events ─────────────────────────────────────────────────────────

/// Why an item ended in a synthesized fallback record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No extracted content was cached for the item.
    MissingContent,
    /// Every attempt failed to produce a parseable record.
    AttemptsExhausted,
}

/// Events emitted while producing artifacts.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// A cached summary was returned without contacting upstream.
    SummaryCacheHit {
        source: &'a SourceIdentity,
        item: &'a ItemIdentity,
    },
    /// No cached summary (or a forced refresh); generation will start.
    SummaryCacheMiss {
        source: &'a SourceIdentity,
        item: &'a ItemIdentity,
        forced: bool,
    },
    /// An upstream request for one item is about to be sent.
    UpstreamAttempt {
        item: &'a ItemIdentity,
        attempt: u32,
        max_attempts: u32,
    },
    /// The attempt failed outright (transport, status, or unparseable body).
    AttemptFailed {
        item: &'a ItemIdentity,
        attempt: u32,
        error: &'a str,
    },
    /// The attempt parsed, but the record is a failure sentinel.
    SoftFailure {
        item: &'a ItemIdentity,
        attempt: u32,
        summary: &'a str,
    },
    /// A synthesized fallback record replaced a real summary.
    Fallback {
        item: &'a ItemIdentity,
        reason: FallbackReason,
    },
    /// A terminal summary record was written to the store.
    SummaryStored {
        item: &'a ItemIdentity,
        sentinel: bool,
    },
    /// A store write failed; the in-memory result is still returned.
    StorageFailure {
        path: &'a Path,
        error: &'a StorageError,
    },
    /// An item directory was removed by the age sweep.
    ItemEvicted {
        source: &'a str,
        item: &'a str,
    },
    /// A digest request is about to be sent.
    DigestAttempt {
        attempt: u32,
        max_attempts: u32,
        batch_size: usize,
    },
    /// A digest attempt failed and may be retried.
    DigestAttemptFailed { attempt: u32, error: &'a str },
    /// No item qualified for the digest; upstream was not contacted.
    DigestEmpty,
    /// The digest was produced.
    DigestReady { stories: usize },
}

impl PipelineEvent<'_> {
    /// Stable short name of the variant, for counting and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::SummaryCacheHit { .. } => "summary_cache_hit",
            PipelineEvent::SummaryCacheMiss { .. } => "summary_cache_miss",
            PipelineEvent::UpstreamAttempt { .. } => "upstream_attempt",
            PipelineEvent::AttemptFailed { .. } => "attempt_failed",
            PipelineEvent::SoftFailure { .. } => "soft_failure",
            PipelineEvent::Fallback { .. } => "fallback",
            PipelineEvent::SummaryStored { .. } => "summary_stored",
            PipelineEvent::StorageFailure { .. } => "storage_failure",
            PipelineEvent::ItemEvicted { .. } => "item_evicted",
            PipelineEvent::DigestAttempt { .. } => "digest_attempt",
            PipelineEvent::DigestAttemptFailed { .. } => "digest_attempt_failed",
            PipelineEvent::DigestEmpty => "digest_empty",
            PipelineEvent::DigestReady { .. } => "digest_ready",
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Observer for pipeline events. The default implementation ignores them.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let PipelineEvent::Fallback { item, .. } = event {
///         eprintln!("fallback for {item}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(metrics_handler);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Records the [`kind`](PipelineEvent::kind) of every event it sees.
#[derive(Default)]
pub struct RecordingHandler {
    kinds: Mutex<Vec<&'static str>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded kinds, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().map(|k| k.clone()).unwrap_or_default()
    }

    /// Number of recorded events of the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(event.kind());
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::SummaryCacheHit { source, item } => {
                debug!("Using cached summary for {source}/{item}");
            }
            PipelineEvent::SummaryCacheMiss {
                source,
                item,
                forced,
            } => {
                if *forced {
                    debug!("Force refresh: regenerating summary for {source}/{item}");
                } else {
                    debug!("No cached summary for {source}/{item}");
                }
            }
            PipelineEvent::UpstreamAttempt {
                item,
                attempt,
                max_attempts,
            } => {
                debug!("Requesting summary for {item} (attempt {attempt}/{max_attempts})");
            }
            PipelineEvent::AttemptFailed {
                item,
                attempt,
                error,
            } => {
                warn!("Summary attempt {attempt} for {item} failed: {error}");
            }
            PipelineEvent::SoftFailure {
                item,
                attempt,
                summary,
            } => {
                warn!("Summary attempt {attempt} for {item} returned an error record: {summary}");
            }
            PipelineEvent::Fallback { item, reason } => match reason {
                FallbackReason::MissingContent => {
                    warn!("No extracted content for {item}, caching fallback summary");
                }
                FallbackReason::AttemptsExhausted => {
                    warn!("All summary attempts for {item} failed, caching fallback summary");
                }
            },
            PipelineEvent::SummaryStored { item, sentinel } => {
                if *sentinel {
                    debug!("Cached sentinel summary for {item}");
                } else {
                    debug!("Cached summary for {item}");
                }
            }
            PipelineEvent::StorageFailure { path, error } => {
                warn!("Cache write to {} failed: {error}", path.display());
            }
            PipelineEvent::ItemEvicted { source, item } => {
                debug!("Evicted expired cache entry {source}/{item}");
            }
            PipelineEvent::DigestAttempt {
                attempt,
                max_attempts,
                batch_size,
            } => {
                info!(
                    "Generating digest from {batch_size} summaries (attempt {attempt}/{max_attempts})"
                );
            }
            PipelineEvent::DigestAttemptFailed { attempt, error } => {
                warn!("Digest attempt {attempt} failed: {error}");
            }
            PipelineEvent::DigestEmpty => {
                info!("No summaries qualified for the digest");
            }
            PipelineEvent::DigestReady { stories } => {
                info!("Digest ready with {stories} stories");
            }
        }
    }
}
