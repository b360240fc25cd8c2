//! One full pass: ingest items, summarize each, aggregate the digest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rssky::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

/// One line of the items file: a feed entry tagged with the feed it came from.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RunItem {
    pub feed_url: String,
    #[serde(default)]
    pub feed_title: Option<String>,
    #[serde(flatten)]
    pub item: FeedItem,
}

impl RunItem {
    pub fn source(&self) -> SourceIdentity {
        source_id(&self.feed_url, self.feed_title.as_deref())
    }

    /// The human-readable feed name, falling back to the address.
    pub fn source_title(&self) -> &str {
        self.feed_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.feed_url)
    }
}

/// Failure to load the items file.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("cannot read items file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("items file {path} is not a JSON array of items: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_items(path: &Path) -> Result<Vec<RunItem>, InputError> {
    let text = fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Collaborators shared by every step of a run.
pub struct Runner<'a> {
    pub store: &'a ArtifactStore,
    pub backend: &'a dyn ChatBackend,
    pub prompts: &'a PromptTemplates,
    pub settings: &'a ModelSettings,
    pub events: &'a dyn EventHandler,
    pub snapshot_max_age_hours: f64,
}

impl Runner<'_> {
    /// Summarize every item (reusing cached summaries unless `force`), then
    /// build the digest over all of them.
    pub async fn run(&self, items: &[RunItem], force: bool) -> Result<DigestRecord, DigestError> {
        self.record_snapshots(items);

        let summarizer = Summarizer::new(self.store, self.backend, self.prompts, self.settings)
            .with_event_handler(self.events);

        let mut period = Vec::with_capacity(items.len());
        for entry in items {
            let source = entry.source();
            let id = item_id(&entry.item);
            let content =
                ensure_content(self.store, &InlineContentExtractor, &source, &id, &entry.item);
            if let Err(e) = content {
                warn!(
                    "Content for '{}' not cached, its summary will fall back: {e}",
                    entry.item.display_title()
                );
            }

            let result = summarizer.summarize(&source, &entry.item, force).await;
            info!(
                "[{:?}] {} (importance {})",
                result.outcome,
                entry.item.display_title(),
                result.record.importance.value()
            );
            period.push(PeriodItem::new(
                source,
                entry.source_title(),
                entry.item.clone(),
            ));
        }

        Digester::new(self.store, self.backend, self.prompts, self.settings)
            .with_event_handler(self.events)
            .generate(&period)
            .await
    }

    /// Store each feed's entries as its snapshot unless a fresh one exists.
    fn record_snapshots(&self, items: &[RunItem]) {
        let mut feeds: BTreeMap<String, (SourceIdentity, String, Vec<FeedItem>)> = BTreeMap::new();
        for entry in items {
            let source = entry.source();
            feeds
                .entry(source.as_str().to_string())
                .or_insert_with(|| (source, entry.source_title().to_string(), Vec::new()))
                .2
                .push(entry.item.clone());
        }

        for (source, title, entries) in feeds.into_values() {
            if self
                .store
                .get_source_snapshot(&source, self.snapshot_max_age_hours)
                .is_some()
            {
                continue;
            }
            let snapshot = SourceSnapshot::new(title, entries);
            if let Err(e) = self.store.put_source_snapshot(&source, &snapshot) {
                warn!("Failed to store snapshot for {source}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rssky::CompletionFuture;
    use rssky::error::UpstreamError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers summary prompts with a fixed record and digest prompts with
    /// one story.
    struct FakeBackend {
        calls: AtomicU32,
    }

    impl ChatBackend for FakeBackend {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> CompletionFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &request.messages[1].content;
            let reply: Result<String, UpstreamError> = if prompt.contains("summary.json") {
                Ok(r#"{"stories": [{"title": "Combined", "importance_rating": 8, "sources": []}]}"#.into())
            } else {
                Ok(r#"{"importance": 8, "summary": "Done.", "impact": "Some.", "date": "2024-05-01"}"#.into())
            };
            Box::pin(async move { reply })
        }
    }

    fn items_json() -> &'static str {
        r#"[
            {"feed_url": "https://a.example/feed", "feed_title": "A", "title": "One",
             "link": "https://a.example/1", "content": "<p>First.</p>", "category": "x"},
            {"feed_url": "https://a.example/feed", "feed_title": "A", "title": "Two",
             "link": "https://a.example/2", "summary": "Second."},
            {"feed_url": "https://b.example/rss", "title": "Three",
             "link": "https://b.example/3", "description": "Third."}
        ]"#
    }

    #[test]
    fn items_file_parses_with_extra_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        fs::write(&path, items_json()).unwrap();

        let items = load_items(&path).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].item.title.as_deref(), Some("One"));
        assert_eq!(items[0].item.extra["category"], "x");
        assert!(!items[0].item.extra.contains_key("feed_url"));
        assert_eq!(items[2].source_title(), "https://b.example/rss");
        assert_eq!(items[2].source().as_str().len(), 40);
    }

    #[test]
    fn malformed_items_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        assert!(matches!(load_items(&path), Err(InputError::Parse { .. })));
        assert!(matches!(
            load_items(&tmp.path().join("missing.json")),
            Err(InputError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn run_summarizes_then_digests_and_reuses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let backend = FakeBackend {
            calls: AtomicU32::new(0),
        };
        let prompts = PromptTemplates::default();
        let settings = ModelSettings::default();
        let items: Vec<RunItem> = serde_json::from_str(items_json()).unwrap();
        let runner = Runner {
            store: &store,
            backend: &backend,
            prompts: &prompts,
            settings: &settings,
            events: &NoopHandler,
            snapshot_max_age_hours: 6.0,
        };

        let digest = runner.run(&items, false).await.unwrap();
        assert_eq!(digest.stories.len(), 1);
        // Three summaries plus one digest call.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);

        let snapshot = store.get_source_snapshot(&items[0].source(), 6.0).unwrap();
        assert_eq!(snapshot.feed_title, "A");
        assert_eq!(snapshot.entries.len(), 2);

        // Second pass: summaries come from the cache, only the digest is rebuilt.
        runner.run(&items, false).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);

        runner.run(&items, true).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn uncacheable_content_falls_back_without_upstream() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let backend = FakeBackend {
            calls: AtomicU32::new(0),
        };
        let prompts = PromptTemplates::default();
        let settings = ModelSettings::default();
        let items: Vec<RunItem> = serde_json::from_str(items_json()).unwrap();
        // A directory where the first item's content file belongs.
        let blocked = store.content_path(&items[0].source(), &item_id(&items[0].item));
        fs::create_dir_all(blocked.join("inner")).unwrap();

        let runner = Runner {
            store: &store,
            backend: &backend,
            prompts: &prompts,
            settings: &settings,
            events: &NoopHandler,
            snapshot_max_age_hours: 6.0,
        };
        runner.run(&items, false).await.unwrap();

        // Two summaries plus the digest; the blocked item never went upstream.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        let record = store
            .get_summary(&items[0].source(), &item_id(&items[0].item))
            .unwrap();
        assert!(record.is_failure_sentinel());
    }
}
