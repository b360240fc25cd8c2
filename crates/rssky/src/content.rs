//! Extracted-content collaborator.
//!
//! The summarizer only reads content from the cache. Getting it there is the
//! job of a [`ContentExtractor`]; the crate ships [`InlineContentExtractor`],
//! which uses the text embedded in the feed entry itself. Network scrapers
//! plug in behind the same trait.

use tracing::{debug, warn};

use crate::cache::ArtifactStore;
use crate::error::StorageError;
use crate::identity::{ItemIdentity, SourceIdentity};
use crate::item::FeedItem;

/// Produces the plain text to summarize for an item.
pub trait ContentExtractor: Send + Sync {
    /// `None` when no usable text could be produced.
    fn extract(&self, item: &FeedItem) -> Option<String>;
}

/// Uses the entry's own `content`, `summary` or `description` field,
/// cleaned of HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContentExtractor;

impl ContentExtractor for InlineContentExtractor {
    fn extract(&self, item: &FeedItem) -> Option<String> {
        let cleaned = clean_html(item.inline_text()?);
        (!cleaned.is_empty()).then_some(cleaned)
    }
}

/// Cached text for an item whose extractor produced nothing.
pub fn placeholder_content(item: &FeedItem) -> String {
    format!("Title: {}\nNo content available.", item.title().unwrap_or("Untitled"))
}

/// Make sure the cache holds content for the item and return it.
///
/// On a miss the extractor runs; when it yields nothing the
/// [`placeholder_content`] is cached instead, so the item is still
/// summarized from its title. An error means the text could not be written
/// and the cache still has no content for the item.
pub fn ensure_content(
    store: &ArtifactStore,
    extractor: &dyn ContentExtractor,
    source: &SourceIdentity,
    item_id: &ItemIdentity,
    item: &FeedItem,
) -> Result<String, StorageError> {
    if let Some(text) = store.get_content(source, item_id) {
        debug!("Using cached content for {source}/{item_id}");
        return Ok(text);
    }
    let text = extractor.extract(item).unwrap_or_else(|| {
        warn!("No content found for '{}'", item.display_title());
        placeholder_content(item)
    });
    store.put_content(source, item_id, &text)?;
    Ok(text)
}

const BLOCK_CLOSERS: &[&str] = &[
    "</p>", "</div>", "</h1>", "</h2>", "</h3>", "</h4>", "</h5>", "</h6>", "</li>", "</tr>",
];

/// Strip tags from an HTML fragment, keeping paragraph breaks.
///
/// Block-level closing tags become blank lines, `<br>` a newline; every
/// other tag is dropped. Common entities are decoded, runs of three or more
/// newlines collapse to two and runs of spaces to one.
pub fn clean_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(rest.get(..open).unwrap_or_default());
        let tail = rest.get(open..).unwrap_or_default();
        let Some(close) = tail.find('>') else {
            // Unterminated tag: keep the remainder as text.
            out.push_str(tail);
            rest = "";
            break;
        };
        let tag = tail.get(..=close).unwrap_or_default();
        let lower = tag.to_ascii_lowercase();
        if BLOCK_CLOSERS.contains(&lower.as_str()) {
            out.push_str("\n\n");
        } else if matches!(lower.as_str(), "<br>" | "<br/>" | "<br />") {
            out.push('\n');
        }
        rest = tail.get(close + 1..).unwrap_or_default();
    }
    out.push_str(rest);

    let decoded = decode_entities(&out);
    normalize_whitespace(&decoded).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(rest.get(..amp).unwrap_or_default());
        let tail = rest.get(amp..).unwrap_or_default();
        // Entities are short; don't scan far for the terminator.
        let semi = tail.char_indices().take(12).find(|(_, c)| *c == ';').map(|(i, _)| i);
        let decoded = semi.and_then(|i| {
            let name = tail.get(1..i)?;
            decode_entity(name).map(|c| (c, i))
        });
        match decoded {
            Some((c, i)) => {
                out.push(c);
                rest = tail.get(i + 1..).unwrap_or_default();
            }
            None => {
                out.push('&');
                rest = tail.get(1..).unwrap_or_default();
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some(' '),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    let mut spaces = 0;
    for c in text.chars() {
        match c {
            '\n' => {
                spaces = 0;
                newlines += 1;
                if newlines <= 2 {
                    out.push(c);
                }
            }
            ' ' => {
                newlines = 0;
                spaces += 1;
                if spaces == 1 {
                    out.push(c);
                }
            }
            _ => {
                newlines = 0;
                spaces = 0;
                out.push(c);
            }
        }
    }
    out
}
