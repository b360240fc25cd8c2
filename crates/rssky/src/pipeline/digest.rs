//! Aggregating cached summaries into one digest.
//!
//! Items are filtered by importance, batched into a single prompt, and sent
//! upstream under the digest [`RetryPolicy`]. Unlike per-item
//! summarization there is no fallback: if no attempt yields a `stories`
//! list the run fails with [`DigestError::AggregationExhausted`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::{RetryPolicy, Sleeper, TokioSleeper, digest_schema, schema_violations};
use crate::cache::{ArtifactStore, SummaryRecord};
use crate::error::DigestError;
use crate::extract::ResilientExtractor;
use crate::identity::item_id;
use crate::item::PeriodItem;
use crate::pipeline::events::{EventHandler, NoopHandler, PipelineEvent};
use crate::pipeline::prompt::PromptTemplates;
use crate::{ChatBackend, ChatRequest, ModelSettings};

/// Items at or above this importance are always included.
pub const IMPORTANCE_THRESHOLD: f64 = 5.0;

/// Keys some models use instead of `stories`.
pub const ALTERNATE_STORY_KEYS: &[&str] = &["news", "newsStories"];

// ── Records ────────────────────────────────────────────────────────

/// The aggregated digest handed to the renderer.
///
/// Stories are kept exactly as the model wrote them; only the top-level key
/// is normalized to `stories`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DigestRecord {
    pub stories: Vec<Story>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DigestRecord {
    /// The result when nothing qualified for the digest.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }
}

/// One synthesized story, held as the raw JSON element.
///
/// The accessors read the expected fields without requiring them to be
/// present or well-typed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Story(Value);

impl Story {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    pub fn summary(&self) -> Option<&str> {
        self.get("summary").and_then(Value::as_str)
    }

    pub fn date(&self) -> Option<&str> {
        self.get("date").and_then(Value::as_str)
    }

    /// Importance as a number, if the model gave a usable one.
    pub fn importance(&self) -> Option<f64> {
        match self.get("importance_rating")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Attributions that are JSON objects; anything else in `sources` is
    /// skipped.
    pub fn sources(&self) -> Vec<SourceAttribution<'_>> {
        self.get("sources")
            .and_then(Value::as_array)
            .map(|sources| sources.iter().filter_map(SourceAttribution::from_value).collect())
            .unwrap_or_default()
    }
}

/// Borrowed view of one item a story was built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceAttribution<'a> {
    pub name: Option<&'a str>,
    pub title: Option<&'a str>,
    pub url: Option<&'a str>,
}

impl<'a> SourceAttribution<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| obj.get(key).and_then(Value::as_str);
        Some(Self {
            name: field("name"),
            title: field("title"),
            url: field("url"),
        })
    }
}

/// One element of the batch sent upstream.
#[derive(Serialize, Debug)]
struct BatchEntry<'a> {
    title: &'a str,
    summary: SummaryRecord,
    date: &'a str,
    url: &'a str,
    feed: &'a str,
}

// ── Digester ───────────────────────────────────────────────────────

/// Builds the digest for a period from cached summaries.
pub struct Digester<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn ChatBackend,
    prompts: &'a PromptTemplates,
    settings: &'a ModelSettings,
    extractor: ResilientExtractor,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    events: &'a dyn EventHandler,
}

impl<'a> Digester<'a> {
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
            policy: RetryPolicy::digest(),
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

    /// Generate the digest for `items`.
    ///
    /// Returns [`DigestRecord::empty`] without contacting upstream when no
    /// cached summary qualifies.
    pub async fn generate(&self, items: &[PeriodItem]) -> Result<DigestRecord, DigestError> {
        let batch = self.collect_batch(items);
        if batch.is_empty() {
            self.events.on_event(&PipelineEvent::DigestEmpty);
            return Ok(DigestRecord::empty());
        }

        let summaries_json = serde_json::to_string_pretty(&batch)?;
        let prompt = self.prompts.render_report(&summaries_json);
        let request = self.settings.request(prompt, Some(digest_schema()));

        let attempts = self.policy.attempts();
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.sleeper.sleep(self.policy.delay_before(attempt)).await;
            }
            self.events.on_event(&PipelineEvent::DigestAttempt {
                attempt,
                max_attempts: attempts,
                batch_size: batch.len(),
            });

            match self.attempt(&request).await {
                Ok(digest) => {
                    self.events.on_event(&PipelineEvent::DigestReady {
                        stories: digest.stories.len(),
                    });
                    return Ok(digest);
                }
                Err(error) => {
                    self.events.on_event(&PipelineEvent::DigestAttemptFailed {
                        attempt,
                        error: &error,
                    });
                    last_error = error;
                }
            }
        }

        Err(DigestError::AggregationExhausted {
            attempts,
            last_error,
        })
    }

    /// Cached summaries worth aggregating, with missing identity fields
    /// filled from the item.
    fn collect_batch<'i>(&self, items: &'i [PeriodItem]) -> Vec<BatchEntry<'i>> {
        let mut batch = Vec::new();
        for period_item in items {
            let item = &period_item.item;
            let id = item_id(item);
            let Some(mut summary) = self.store.get_summary(&period_item.source, &id) else {
                debug!("No cached summary for {}/{id}", period_item.source);
                continue;
            };

            let importance = summary.importance.value();
            if importance < IMPORTANCE_THRESHOLD && !summary.is_failure_sentinel() {
                debug!("Skipping {id} with importance {importance}");
                continue;
            }

            let title = item.title.as_deref().unwrap_or("");
            let date = item.raw_date().unwrap_or("");
            let url = item.locator().unwrap_or("");
            let feed = period_item.source_title.as_str();

            summary.title.get_or_insert_with(|| title.to_string());
            if summary.date.is_empty() {
                summary.date = date.to_string();
            }
            summary.url.get_or_insert_with(|| url.to_string());
            summary.feed.get_or_insert_with(|| feed.to_string());

            batch.push(BatchEntry {
                title,
                summary,
                date,
                url,
                feed,
            });
        }
        batch
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<DigestRecord, String> {
        let raw = self
            .backend
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;
        let mut value = self.extractor.extract(&raw).map_err(|e| e.to_string())?.value;
        normalize_story_key(&mut value);

        if !value.get("stories").is_some_and(Value::is_array) {
            return Err("response has no 'stories' list".to_string());
        }
        if let Some(schema) = &request.response_format {
            for violation in schema_violations(schema, &value) {
                debug!("Digest response deviates from schema: {violation}");
            }
        }
        serde_json::from_value(value).map_err(|e| format!("invalid 'stories' shape: {e}"))
    }
}

/// Rename the first alternate story key found to `stories`.
fn normalize_story_key(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    for key in ALTERNATE_STORY_KEYS {
        if let Some(stories) = obj.remove(*key) {
            debug!("Digest response used '{key}' for stories");
            obj.insert("stories".to_string(), stories);
            return;
        }
    }
}
