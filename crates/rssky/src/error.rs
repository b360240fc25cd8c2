//! Error taxonomy for the cache and artifact pipeline.
//!
//! Only [`DigestError`] escapes to callers of the pipeline. The others are
//! recovered locally: storage failures degrade to cache misses, extraction
//! and upstream failures feed the retry/fallback state machine in
//! [`pipeline::summarize`](crate::pipeline::summarize).

use std::path::PathBuf;

/// I/O or (de)serialisation failure inside the [`ArtifactStore`](crate::cache::ArtifactStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize artifact for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse cached artifact at {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Failure to recover a JSON object from a raw model response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no JSON object boundary ('{{' ... '}}') found in response")]
    NoJsonBoundary,

    #[error("malformed JSON inside response: {0}")]
    MalformedJson(String),
}

/// Failure talking to the upstream text-generation service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("upstream API HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response envelope: {0}")]
    InvalidEnvelope(String),
}

/// Unrecoverable digest failure. `AggregationExhausted` is the expected
/// one: the upstream never produced a usable `stories` object.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("digest generation failed after {attempts} attempt(s): {last_error}")]
    AggregationExhausted { attempts: u32, last_error: String },

    #[error("failed to serialize digest batch: {0}")]
    Batch(#[from] serde_json::Error),
}
