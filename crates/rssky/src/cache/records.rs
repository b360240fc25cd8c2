//! Serializable artifacts owned by the [`ArtifactStore`](super::ArtifactStore).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::item::FeedItem;

/// Importance assigned when a value is missing or cannot be coerced.
pub const DEFAULT_IMPORTANCE: f64 = 5.0;

/// Phrases that mark a summary as a failure sentinel rather than real
/// content. Matched as substrings of [`SummaryRecord::summary`].
pub const SENTINEL_PHRASES: &[&str] = &["could not be extracted", "parsing error", "API request failed"];

// ── Importance ─────────────────────────────────────────────────────

/// Numeric importance rating (nominally 0 to 10).
///
/// Deserializes from numbers or numeric strings; anything else becomes
/// [`DEFAULT_IMPORTANCE`]. Whole values serialize as JSON integers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Importance(f64);

impl Importance {
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(value)
        } else {
            Self(DEFAULT_IMPORTANCE)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Coerce an arbitrary JSON value.
    pub fn coerce(value: &serde_json::Value) -> Self {
        let parsed = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Self::new(parsed.unwrap_or(DEFAULT_IMPORTANCE))
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self(DEFAULT_IMPORTANCE)
    }
}

impl From<f64> for Importance {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl Serialize for Importance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0.abs() < 1e15 {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Importance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::coerce(&value))
    }
}

/// Accept strings as-is, `null` as empty, and anything else as its JSON text.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ── SummaryRecord ──────────────────────────────────────────────────

/// Structured per-item summary, cached as `summary.json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SummaryRecord {
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub impact: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content_available: Option<bool>,
    /// Additional fields returned by the model, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SummaryRecord {
    pub fn new(
        importance: impl Into<Importance>,
        summary: impl Into<String>,
        impact: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            importance: importance.into(),
            summary: summary.into(),
            impact: impact.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    /// Whether the summary text marks a failed extraction.
    pub fn is_failure_sentinel(&self) -> bool {
        is_sentinel_text(&self.summary)
    }
}

/// Whether `summary` contains one of the [`SENTINEL_PHRASES`].
pub fn is_sentinel_text(summary: &str) -> bool {
    SENTINEL_PHRASES.iter().any(|p| summary.contains(p))
}

// ── SourceSnapshot ─────────────────────────────────────────────────

/// Raw source listing, cached as `rawfeed.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    /// Creation time as fractional UNIX seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub feed_title: String,
    #[serde(default)]
    pub entries: Vec<FeedItem>,
}

impl SourceSnapshot {
    /// Snapshot stamped with the current time.
    pub fn new(feed_title: impl Into<String>, entries: Vec<FeedItem>) -> Self {
        Self {
            timestamp: unix_secs_f64(SystemTime::now()),
            feed_title: feed_title.into(),
            entries,
        }
    }

    /// Seconds elapsed between the snapshot and `now`.
    pub fn age_secs(&self, now: SystemTime) -> f64 {
        unix_secs_f64(now) - self.timestamp
    }

    /// Whether the snapshot is within the freshness window at `now`.
    pub fn is_fresh(&self, max_age_hours: f64, now: SystemTime) -> bool {
        self.age_secs(now) <= max_age_hours * 3600.0
    }
}

pub(crate) fn unix_secs_f64(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
