//! Content-addressed artifact cache and resilient LLM summarization for
//! feed digests.
//!
//! `rssky` turns feed items into durable artifacts: extracted text, a
//! structured per-item summary, and one aggregated digest per run. Every
//! artifact is cached under a deterministic identity so a re-run only pays
//! for what changed, and every upstream call goes through a bounded retry
//! loop that tolerates sloppy JSON.
//!
//! # Getting started
//!
//! ```ignore
//! use rssky::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiClient::new("http://localhost:4000", "sk-...")?;
//!     let store = ArtifactStore::open(".cache")?;
//!     let prompts = PromptTemplates::default();
//!     let settings = ModelSettings::default();
//!
//!     let source = source_id("https://example.com/feed.xml", Some("Example"));
//!     let item = FeedItem::new("Hello", "https://example.com/hello")
//!         .with_content("Some article text.");
//!     let item_id = item_id(&item);
//!     if let Some(text) = InlineContentExtractor.extract(&item) {
//!         store.put_content(&source, &item_id, &text)?;
//!     }
//!
//!     let summary = Summarizer::new(&store, &client, &prompts, &settings)
//!         .with_event_handler(&LoggingHandler)
//!         .summarize(&source, &item, false)
//!         .await;
//!     println!("{}", summary.record.summary);
//!
//!     let period = vec![PeriodItem::new(source, "Example", item)];
//!     let digest = Digester::new(&store, &client, &prompts, &settings)
//!         .with_event_handler(&LoggingHandler)
//!         .generate(&period)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&digest)?);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Identities:** [`identity::source_id`] and [`identity::item_id`].
//! - **The cache:** [`cache::ArtifactStore`] and the records it persists
//!   ([`cache::SummaryRecord`], [`cache::SourceSnapshot`]).
//! - **Recovering JSON from model output:** [`extract::ResilientExtractor`].
//! - **Per-item summaries:** [`pipeline::summarize::Summarizer`].
//! - **The digest:** [`pipeline::digest::Digester`].
//! - **Observing a run:** [`pipeline::events::EventHandler`].
//! - **Talking to a model:** the [`ChatBackend`] trait and [`OpenAiClient`].

pub mod api;
pub mod cache;
pub mod content;
pub mod error;
pub mod extract;
pub mod identity;
pub mod item;
pub mod pipeline;
pub mod prelude;

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::UpstreamError;

// ── Constants ──────────────────────────────────────────────────────

/// Path appended to the configured base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// System turn sent with every request.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that only responds with valid, unformatted JSON.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Schema helper ──────────────────────────────────────────────────

/// Generate a self-contained JSON Schema for `T`.
///
/// Subschemas are inlined and the meta-schema and title are dropped, so the
/// result can be sent as-is in a `response_format` field.
///
/// ```
/// use rssky::json_schema_for;
/// use schemars::JsonSchema;
///
/// #[derive(JsonSchema)]
/// struct Verdict {
///     score: f64,
///     #[serde(default)]
///     note: Option<String>,
/// }
///
/// let schema = json_schema_for::<Verdict>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"score".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
    }
    value
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Raw JSON Schema describing the expected response object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

/// Message role in a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Model identifier and sampling parameters shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ModelSettings {
    /// Build a system + user request for `prompt`. The schema hint is kept
    /// only for models that accept one.
    pub fn request(&self, prompt: impl Into<String>, schema: Option<serde_json::Value>) -> ChatRequest {
        let model = self.model.trim().to_string();
        let response_format = schema.filter(|_| api::accepts_schema_hint(&model));
        ChatRequest {
            model,
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format,
        }
    }
}

// ── Backend trait ──────────────────────────────────────────────────

/// Boxed future returned by [`ChatBackend::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, UpstreamError>> + Send + 'a>>;

/// A text-generation service.
///
/// Returns the first choice's message content. Implemented by
/// [`OpenAiClient`] and by test doubles.
///
/// ```ignore
/// struct Canned(&'static str);
///
/// impl ChatBackend for Canned {
///     fn complete<'a>(&'a self, _request: &'a ChatRequest) -> CompletionFuture<'a> {
///         Box::pin(async move { Ok(self.0.to_string()) })
///     }
/// }
/// ```
pub trait ChatBackend: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> CompletionFuture<'a>;
}

// ── Response types (internal) ──────────────────────────────────────

#[derive(Deserialize)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<RawApiError>,
}

#[derive(Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize)]
struct RawMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawApiError {
    message: String,
}

// ── Client ─────────────────────────────────────────────────────────

/// HTTP client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client for `base_url` (normalized with
    /// [`normalize_endpoint`]) authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rssky/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: normalize_endpoint(base_url),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a chat completion request and return the first choice's content.
    pub async fn chat(&self, body: &ChatRequest) -> Result<String, UpstreamError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}, schema={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
            body.response_format.is_some(),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidEnvelope(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(UpstreamError::InvalidEnvelope(format!(
                "API error: {}",
                err.message
            )));
        }

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                UpstreamError::InvalidEnvelope("no choices or message content in response".into())
            })?;

        debug!("LLM output: {} chars", content.len());
        Ok(content)
    }
}

impl ChatBackend for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> CompletionFuture<'a> {
        Box::pin(self.chat(request))
    }
}

/// Ensure `url` ends with [`CHAT_COMPLETIONS_PATH`].
pub fn normalize_endpoint(url: &str) -> String {
    let url = url.trim();
    if url.ends_with(CHAT_COMPLETIONS_PATH) {
        url.to_string()
    } else if let Some(base) = url.strip_suffix('/') {
        format!("{base}{CHAT_COMPLETIONS_PATH}")
    } else {
        format!("{url}{CHAT_COMPLETIONS_PATH}")
    }
}
