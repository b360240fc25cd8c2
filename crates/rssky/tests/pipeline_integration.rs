//! End-to-end runs against a mock OpenAI-compatible endpoint.
//!
//! Each test starts a wiremock server, points a real [`OpenAiClient`] at it
//! and drives the summarizer and digester through a temporary cache.

use std::time::Duration;

use rssky::api::RecordingSleeper;
use rssky::pipeline::RecordingHandler;
use rssky::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

/// Marker present only in the per-item prompt.
const SUMMARY_MARKER: &str = "Article:";
/// Marker present only in the digest prompt.
const DIGEST_MARKER: &str = "group news stories together";

struct Run {
    _tmp: tempfile::TempDir,
    store: ArtifactStore,
    prompts: PromptTemplates,
    settings: ModelSettings,
    source: SourceIdentity,
}

impl Run {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        Self {
            store: ArtifactStore::open(tmp.path().join("cache")).unwrap(),
            _tmp: tmp,
            prompts: PromptTemplates::default(),
            settings: ModelSettings::default(),
            source: source_id("https://example.com/feed.xml", Some("Example Feed")),
        }
    }

    /// Cache inline content for `item` the way a fetch pass would.
    fn ingest(&self, item: &FeedItem) {
        let id = item_id(item);
        ensure_content(&self.store, &InlineContentExtractor, &self.source, &id, item).unwrap();
    }
}

#[tokio::test]
async fn second_summarize_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"importance": 7, "summary": "Rates rose.", "impact": "Loans cost more.", "date": "2023-01-01"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let run = Run::new();
    let item = FeedItem::new("Rates Rise", "https://example.com/rates")
        .with_published("2023-01-01")
        .with_content("<p>The central bank raised rates.</p>");
    run.ingest(&item);

    let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
    let summarizer = Summarizer::new(&run.store, &client, &run.prompts, &run.settings);

    let first = summarizer.summarize(&run.source, &item, false).await;
    assert_eq!(first.outcome, SummaryOutcome::Generated);

    let second = summarizer.summarize(&run.source, &item, false).await;
    assert_eq!(second.outcome, SummaryOutcome::Cached);
    assert_eq!(first.record, second.record);
    assert!(
        run.store
            .summary_path(&run.source, &first.item)
            .starts_with(run.store.root())
    );
    // `expect(1)` is verified when the server drops.
}

#[tokio::test]
async fn full_run_produces_digest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains(SUMMARY_MARKER))
        .and(body_string_contains("Rates Rise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"importance\": 9, \"summary\": \"Rates rose.\", \"impact\": \"High.\", \"date\": \"2023-01-01\"}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(SUMMARY_MARKER))
        .and(body_string_contains("Local Fair"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"importance": 2, "summary": "A fair happened.", "impact": "None.", "date": "2023-01-01"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(DIGEST_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"news": [{"title": "Central bank hikes", "importance_rating": 9, "summary": "Rates rose.", "date": "2023-01-01", "sources": [{"name": "Example Feed", "title": "Rates Rise", "url": "https://example.com/rates"}]}]}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let run = Run::new();
    let items = vec![
        FeedItem::new("Rates Rise", "https://example.com/rates")
            .with_published("2023-01-01")
            .with_content("The central bank raised rates."),
        FeedItem::new("Local Fair", "https://example.com/fair")
            .with_published("2023-01-01")
            .with_content("There was a fair."),
    ];

    let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
    let events = RecordingHandler::new();
    let summarizer = Summarizer::new(&run.store, &client, &run.prompts, &run.settings)
        .with_event_handler(&events);

    let mut period = Vec::new();
    for item in &items {
        run.ingest(item);
        summarizer.summarize(&run.source, item, false).await;
        period.push(PeriodItem::new(run.source.clone(), "Example Feed", item.clone()));
    }
    assert_eq!(events.count("summary_stored"), 2);

    let digest = Digester::new(&run.store, &client, &run.prompts, &run.settings)
        .with_event_handler(&events)
        .generate(&period)
        .await
        .unwrap();

    assert_eq!(digest.stories.len(), 1);
    let story = &digest.stories[0];
    assert_eq!(story.title(), Some("Central bank hikes"));
    assert_eq!(story.importance(), Some(9.0));
    assert_eq!(story.sources()[0].url, Some("https://example.com/rates"));
    assert_eq!(events.kinds().last(), Some(&"digest_ready"));
}

#[tokio::test]
async fn digest_gives_up_after_bounded_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(3)
        .mount(&server)
        .await;

    let run = Run::new();
    let item = FeedItem::new("Rates Rise", "https://example.com/rates");
    run.store
        .put_summary(
            &run.source,
            &item_id(&item),
            &SummaryRecord::new(8.0, "Rates rose.", "High.", "2023-01-01"),
        )
        .unwrap();

    let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
    let sleeper = RecordingSleeper::new();
    let err = Digester::new(&run.store, &client, &run.prompts, &run.settings)
        .with_sleeper(&sleeper)
        .generate(&[PeriodItem::new(run.source.clone(), "Example Feed", item)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DigestError::AggregationExhausted { attempts: 3, .. }
    ));
    assert_eq!(sleeper.slept(), vec![Duration::from_secs(3); 2]);
}

#[tokio::test]
async fn item_without_text_is_retried_then_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("No content available."))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json at all")))
        .expect(3)
        .mount(&server)
        .await;

    let run = Run::new();
    // No content, summary or description: the extractor has nothing to offer.
    let item = FeedItem::new("Empty Post", "https://example.com/empty");
    run.ingest(&item);

    let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
    let out = Summarizer::new(&run.store, &client, &run.prompts, &run.settings)
        .with_sleeper(&RecordingSleeper::new())
        .summarize(&run.source, &item, false)
        .await;

    assert!(matches!(out.outcome, SummaryOutcome::Fallback(_)));
    assert_eq!(out.record.importance.value(), 5.0);
    assert_eq!(run.store.get_summary(&run.source, &out.item), Some(out.record));
}

#[tokio::test]
async fn eviction_forces_regeneration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"importance": 6, "summary": "Something.", "impact": "Some.", "date": "2023-01-01"}"#,
        )))
        .expect(2)
        .mount(&server)
        .await;

    let run = Run::new();
    let item = FeedItem::new("Rates Rise", "https://example.com/rates")
        .with_content("The central bank raised rates.");
    let client = OpenAiClient::new(&server.uri(), "sk-test").unwrap();
    let summarizer = Summarizer::new(&run.store, &client, &run.prompts, &run.settings);

    run.ingest(&item);
    summarizer.summarize(&run.source, &item, false).await;

    // A cutoff in the future makes every item directory due.
    let cutoff = std::time::SystemTime::now() + Duration::from_secs(60);
    let report = run.store.evict_before(cutoff, &NoopHandler);
    assert_eq!(report.removed, 1);
    assert!(!run.store.has_summary(&run.source, &item_id(&item)));

    run.ingest(&item);
    let again = summarizer.summarize(&run.source, &item, false).await;
    assert_eq!(again.outcome, SummaryOutcome::Generated);
}
