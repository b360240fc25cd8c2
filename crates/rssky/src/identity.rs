//! Deterministic identities for sources and items.
//!
//! Identities double as directory names in the artifact cache, so they are
//! built from a human-readable, filesystem-safe label plus a short SHA-1
//! suffix of the discriminating input. The suffix is what guarantees
//! uniqueness; the label only aids browsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::item::FeedItem;

/// Maximum length of a sanitized label.
pub const MAX_LABEL_LEN: usize = 100;

/// Number of hex characters kept from the digest for suffixes.
pub const SHORT_HASH_LEN: usize = 8;

/// Prefix for items that have no title.
pub const UNTITLED_ITEM_PREFIX: &str = "entry";

/// Opaque name of a content source (one cache subdirectory).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SourceIdentity(String);

/// Opaque name of one item within a source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ItemIdentity(String);

macro_rules! identity_common {
    ($ty:ident) => {
        impl $ty {
            /// Wrap an already-derived identity (e.g. a directory name read back
            /// from disk).
            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identity_common!(SourceIdentity);
identity_common!(ItemIdentity);

/// Derive a source identity from its canonical address and optional label.
///
/// With a label: `<sanitized label>_<8 hex>`. Without one (or an empty one):
/// the full 40-character SHA-1 of the address.
pub fn source_id(address: &str, label: Option<&str>) -> SourceIdentity {
    match label.filter(|l| !l.is_empty()) {
        Some(label) => SourceIdentity(format!(
            "{}_{}",
            sanitize_label(label),
            short_hash(address)
        )),
        None => SourceIdentity(full_hash(address)),
    }
}

/// Derive an item identity. Never fails and never returns an empty string.
pub fn item_id(item: &FeedItem) -> ItemIdentity {
    let locator = item.locator().unwrap_or("");

    if let Some(title) = item.title() {
        return ItemIdentity(format!(
            "{}_{}",
            sanitize_label(title),
            short_hash(locator)
        ));
    }

    let id = ItemIdentity(format!(
        "{UNTITLED_ITEM_PREFIX}_{}",
        short_hash(locator_fragment(locator))
    ));
    warn!("Item missing title, using fallback key {id} (from '{locator}')");
    id
}

/// Trailing path segment of a locator, stripped of a `key=value` query tail.
fn locator_fragment(locator: &str) -> &str {
    if !locator.contains('/') {
        return locator;
    }
    let segment = locator.rsplit('/').next().unwrap_or(locator);
    if segment.contains('=') {
        segment.rsplit('=').next().unwrap_or(segment)
    } else {
        segment
    }
}

/// Make a string safe to use as a single path component.
///
/// NFKD-normalizes, maps everything outside `[A-Za-z0-9_.-]` to `_`,
/// collapses runs of `_`, trims them from both ends, substitutes
/// `"untitled"` for an empty result and truncates to [`MAX_LABEL_LEN`].
pub fn sanitize_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    // Only ASCII survives the mapping above, so chars == bytes here.
    trimmed.chars().take(MAX_LABEL_LEN).collect()
}

/// First [`SHORT_HASH_LEN`] hex characters of the SHA-1 of `input`.
pub fn short_hash(input: &str) -> String {
    let mut hash = full_hash(input);
    hash.truncate(SHORT_HASH_LEN);
    hash
}

fn full_hash(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_known_vector() {
        assert_eq!(short_hash("http://test.com/feed"), "b714320b");
    }

    #[test]
    fn source_id_with_label() {
        let id = source_id("http://test.com/feed", Some("Example Feed"));
        assert_eq!(id.as_str(), "Example_Feed_b714320b");
    }

    #[test]
    fn source_id_without_label_is_full_hash() {
        let id = source_id("http://test.com/another", None);
        assert_eq!(id.as_str().len(), 40);
        assert!(!id.as_str().contains('_'));
        assert_eq!(source_id("http://test.com/another", Some("")), id);
    }

    #[test]
    fn source_id_is_deterministic_and_collision_resistant() {
        let a = source_id("http://a.example/feed", Some("News"));
        let b = source_id("http://a.example/feed", Some("News"));
        let c = source_id("http://b.example/feed", Some("News"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sanitize_special_characters() {
        let id = source_id("http://special.com/feed", Some(r#"Feed With/:*?"<>|Chars"#));
        assert!(id.as_str().starts_with("Feed_With_Chars_"), "{id}");
    }

    #[test]
    fn sanitize_truncates_long_labels() {
        let label = sanitize_label(&"A".repeat(300));
        assert_eq!(label.len(), MAX_LABEL_LEN);
    }

    #[test]
    fn sanitize_empty_and_symbol_only() {
        assert_eq!(sanitize_label(""), "untitled");
        assert_eq!(sanitize_label("///"), "untitled");
    }

    #[test]
    fn sanitize_normalizes_unicode() {
        // NFKD splits the accent off; the combining mark becomes '_' and is trimmed.
        assert_eq!(sanitize_label("café"), "cafe");
        assert_eq!(sanitize_label("ﬁle name"), "file_name");
    }

    #[test]
    fn item_id_with_title() {
        let item = FeedItem {
            title: Some("Test Entry 1".into()),
            link: Some("http://example.com/entry1".into()),
            id: Some("entry1".into()),
            ..Default::default()
        };
        let id = item_id(&item);
        assert_eq!(
            id.as_str(),
            format!("Test_Entry_1_{}", short_hash("http://example.com/entry1"))
        );
    }

    #[test]
    fn item_id_is_stable_regardless_of_extra_fields() {
        let mut a = FeedItem::new("Same", "https://x.test/1");
        let mut b = FeedItem::new("Same", "https://x.test/1");
        a.extra.insert("alpha".into(), 1.into());
        a.extra.insert("beta".into(), 2.into());
        b.extra.insert("beta".into(), 2.into());
        b.extra.insert("alpha".into(), 1.into());
        b.extra.insert("gamma".into(), 3.into());
        assert_eq!(item_id(&a), item_id(&b));
        assert_eq!(item_id(&a), item_id(&a.clone()));
    }

    #[test]
    fn item_id_without_title_uses_trailing_segment() {
        let item = FeedItem {
            link: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into()),
            ..Default::default()
        };
        assert_eq!(
            item_id(&item).as_str(),
            format!("entry_{}", short_hash("dQw4w9WgXcQ"))
        );

        let item = FeedItem {
            link: Some("https://example.com/posts/hello-world".into()),
            ..Default::default()
        };
        assert_eq!(
            item_id(&item).as_str(),
            format!("entry_{}", short_hash("hello-world"))
        );
    }

    #[test]
    fn item_id_without_title_or_locator_is_never_empty() {
        let id = item_id(&FeedItem::default());
        assert_eq!(id.as_str(), format!("entry_{}", short_hash("")));
        assert_eq!(id.as_str(), "entry_da39a3ee");
    }

    #[test]
    fn item_id_with_title_but_no_locator_hashes_empty_string() {
        let item = FeedItem {
            title: Some("Lonely".into()),
            ..Default::default()
        };
        assert_eq!(item_id(&item).as_str(), "Lonely_da39a3ee");
    }
}
