//! Per-item summarization with caching, bounded retry, and fallback.
//!
//! ```text
//! cached && !force ───────────────────────────────► Cached
//! no content ─────────────────────────────────────► Fallback(MissingContent)
//! attempt ─► record ─► real summary ──────────────► Generated
//!               │        sentinel ─► retry │ last ► Sentinel (cached as-is)
//!               └► error ─────────► retry │ last ──► Fallback(AttemptsExhausted)
//! ```
//!
//! Every terminal state except `Cached` writes the record once. A failed
//! write is reported through the event handler and the record is still
//! returned.

use crate::api::{RetryPolicy, Sleeper, TokioSleeper, schema_violations, summary_schema};
use crate::cache::{ArtifactStore, SummaryRecord};
use crate::extract::ResilientExtractor;
use crate::identity::{ItemIdentity, SourceIdentity, item_id};
use crate::item::{FeedItem, today};
use crate::pipeline::events::{EventHandler, FallbackReason, NoopHandler, PipelineEvent};
use crate::pipeline::prompt::PromptTemplates;
use crate::{ChatBackend, ChatRequest, ModelSettings};
use tracing::debug;

/// Impact text used in synthesized fallback records.
pub const FALLBACK_IMPACT: &str = "Impact could not be determined due to processing error.";

/// How a summary was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Served from the cache without contacting upstream.
    Cached,
    /// A real summary was generated and cached.
    Generated,
    /// Every attempt returned a failure sentinel; the last one was cached.
    Sentinel,
    /// A synthesized fallback record was cached.
    Fallback(FallbackReason),
}

/// Result of [`Summarizer::summarize`].
#[derive(Debug, Clone)]
pub struct Summarized {
    pub item: ItemIdentity,
    pub record: SummaryRecord,
    pub outcome: SummaryOutcome,
}

/// Drives one item from cache lookup to a persisted summary.
pub struct Summarizer<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn ChatBackend,
    prompts: &'a PromptTemplates,
    settings: &'a ModelSettings,
    extractor: ResilientExtractor,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    events: &'a dyn EventHandler,
}

impl<'a> Summarizer<'a> {
    pub fn new(
        store: &'a ArtifactStore,
        backend: &'a dyn ChatBackend,
        prompts: &'a PromptTemplates,
        settings: &'a ModelSettings,
    ) -> Self {
        Self {
            store,
            backend,
            prompts,
            settings,
            extractor: ResilientExtractor::new(),
            policy: RetryPolicy::per_item(),
            sleeper: &TokioSleeper,
            events: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, events: &'a dyn EventHandler) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Summarize `item` from `source`, reusing the cached summary unless
    /// `force` is set. Never fails: every error path ends in a cached record.
    pub async fn summarize(&self, source: &SourceIdentity, item: &FeedItem, force: bool) -> Summarized {
        let id = item_id(item);

        if !force && let Some(record) = self.store.get_summary(source, &id) {
            self.events.on_event(&PipelineEvent::SummaryCacheHit {
                source,
                item: &id,
            });
            return Summarized {
                item: id,
                record,
                outcome: SummaryOutcome::Cached,
            };
        }
        self.events.on_event(&PipelineEvent::SummaryCacheMiss {
            source,
            item: &id,
            forced: force,
        });

        let Some(content) = self.store.get_content(source, &id) else {
            return self.fallback(source, id, item, FallbackReason::MissingContent);
        };

        let date = item.raw_date().map_or_else(today, str::to_string);
        let prompt = self
            .prompts
            .render_summary(item.display_title(), &date, &content);
        let request = self.settings.request(prompt, Some(summary_schema()));

        let attempts = self.policy.attempts();
        let mut last_sentinel = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.sleeper.sleep(self.policy.delay_before(attempt)).await;
            }
            self.events.on_event(&PipelineEvent::UpstreamAttempt {
                item: &id,
                attempt,
                max_attempts: attempts,
            });

            match self.attempt(&request).await {
                Ok(record) if record.is_failure_sentinel() => {
                    self.events.on_event(&PipelineEvent::SoftFailure {
                        item: &id,
                        attempt,
                        summary: &record.summary,
                    });
                    last_sentinel = Some(record);
                }
                Ok(mut record) => {
                    record.url = Some(item.locator().unwrap_or_default().to_string());
                    record.title = Some(item.title.clone().unwrap_or_default());
                    record.full_content_available = Some(true);
                    self.persist(source, &id, &record);
                    return Summarized {
                        item: id,
                        record,
                        outcome: SummaryOutcome::Generated,
                    };
                }
                Err(error) => {
                    self.events.on_event(&PipelineEvent::AttemptFailed {
                        item: &id,
                        attempt,
                        error: &error,
                    });
                    last_sentinel = None;
                }
            }
        }

        // The final attempt decides: a sentinel is kept as the answer, an
        // outright failure is replaced by a synthesized record.
        match last_sentinel {
            Some(record) => {
                self.persist(source, &id, &record);
                Summarized {
                    item: id,
                    record,
                    outcome: SummaryOutcome::Sentinel,
                }
            }
            None => self.fallback(source, id, item, FallbackReason::AttemptsExhausted),
        }
    }

    /// One upstream call plus extraction. Errors are flattened to text for
    /// event reporting.
    async fn attempt(&self, request: &ChatRequest) -> Result<SummaryRecord, String> {
        let raw = self
            .backend
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;
        let extracted = self.extractor.extract(&raw).map_err(|e| e.to_string())?;
        if let Some(schema) = &request.response_format {
            for violation in schema_violations(schema, &extracted.value) {
                debug!("Summary response deviates from schema: {violation}");
            }
        }
        extracted.parse::<SummaryRecord>().map_err(|e| e.to_string())
    }

    fn fallback(
        &self,
        source: &SourceIdentity,
        id: ItemIdentity,
        item: &FeedItem,
        reason: FallbackReason,
    ) -> Summarized {
        self.events.on_event(&PipelineEvent::Fallback { item: &id, reason });
        let record = fallback_record(item);
        self.persist(source, &id, &record);
        Summarized {
            item: id,
            record,
            outcome: SummaryOutcome::Fallback(reason),
        }
    }

    fn persist(&self, source: &SourceIdentity, id: &ItemIdentity, record: &SummaryRecord) {
        match self.store.put_summary(source, id, record) {
            Ok(()) => self.events.on_event(&PipelineEvent::SummaryStored {
                item: id,
                sentinel: record.is_failure_sentinel(),
            }),
            Err(error) => {
                let path = self.store.summary_path(source, id);
                self.events
                    .on_event(&PipelineEvent::StorageFailure { path: &path, error: &error });
            }
        }
    }
}

/// Synthesized record for an item that could not be summarized.
pub fn fallback_record(item: &FeedItem) -> SummaryRecord {
    let mut record = SummaryRecord::new(
        5.0,
        format!("Summary could not be extracted for: {}", item.display_title()),
        FALLBACK_IMPACT,
        item.best_effort_date(),
    );
    record.title = item.title.clone();
    record.url = item.locator().map(str::to_string);
    record
}
