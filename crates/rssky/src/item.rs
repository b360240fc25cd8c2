//! Typed feed item record.
//!
//! Feed entries arrive with an unstable set of fields. Instead of probing
//! names ad hoc, [`FeedItem`] models the known ones as optional fields and
//! resolves each concern (locator, date, inline text) through an explicit
//! precedence list. Unknown fields are kept in [`FeedItem::extra`] so a
//! stored source snapshot round-trips without loss.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::identity::SourceIdentity;

/// Format used for every date the pipeline writes.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fields consulted, in order, for an item's unique locator.
pub const LOCATOR_FIELDS: &[&str] = &["link", "id"];

/// Fields consulted, in order, for an item's publication date.
pub const DATE_FIELDS: &[&str] = &["published", "updated", "pubDate", "date"];

/// Fields consulted, in order, for text embedded in the feed itself.
pub const INLINE_TEXT_FIELDS: &[&str] = &["content", "summary", "description"];

/// One entry of a content source.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(
        default,
        rename = "pubDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Any other fields the source carried.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FeedItem {
    /// Convenience constructor for the common title + link case.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            link: Some(link.into()),
            ..Default::default()
        }
    }

    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Look up a known field by its wire name. Empty strings count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title" => self.title.as_deref(),
            "link" => self.link.as_deref(),
            "id" => self.id.as_deref(),
            "published" => self.published.as_deref(),
            "updated" => self.updated.as_deref(),
            "pubDate" => self.pub_date.as_deref(),
            "date" => self.date.as_deref(),
            "content" => self.content.as_deref(),
            "summary" => self.summary.as_deref(),
            "description" => self.description.as_deref(),
            other => self.extra.get(other).and_then(|v| v.as_str()),
        };
        value.filter(|v| !v.is_empty())
    }

    /// First non-empty field from a precedence list.
    pub fn first_of(&self, fields: &[&str]) -> Option<&str> {
        fields.iter().find_map(|name| self.field(name))
    }

    /// Non-empty title, if any.
    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    /// Title for prompts and log lines.
    pub fn display_title(&self) -> &str {
        self.title().unwrap_or("Unknown")
    }

    /// Unique locator: permalink, else item id.
    pub fn locator(&self) -> Option<&str> {
        self.first_of(LOCATOR_FIELDS)
    }

    /// Raw publication date string, as the source wrote it.
    pub fn raw_date(&self) -> Option<&str> {
        self.first_of(DATE_FIELDS)
    }

    /// Publication date normalised to `YYYY-MM-DD`, if any date field parses.
    pub fn parsed_date(&self) -> Option<String> {
        DATE_FIELDS
            .iter()
            .filter_map(|name| self.field(name))
            .find_map(parse_date)
            .map(|d| d.format(DATE_FORMAT).to_string())
    }

    /// Best-effort date: parsed publication date, else today.
    pub fn best_effort_date(&self) -> String {
        self.parsed_date().unwrap_or_else(today)
    }

    /// Text embedded in the feed entry itself.
    pub fn inline_text(&self) -> Option<&str> {
        self.first_of(INLINE_TEXT_FIELDS)
    }
}

/// An item together with the source it was read from, as handed to the
/// digest stage.
#[derive(Debug, Clone)]
pub struct PeriodItem {
    pub source: SourceIdentity,
    /// Human-readable source label, echoed into digest attributions.
    pub source_title: String,
    pub item: FeedItem,
}

impl PeriodItem {
    pub fn new(source: SourceIdentity, source_title: impl Into<String>, item: FeedItem) -> Self {
        Self {
            source,
            source_title: source_title.into(),
            item,
        }
    }
}

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Parse the date formats commonly found in feeds.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}
