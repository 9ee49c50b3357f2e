mod common;

use common::*;
use news_relay::traits::ContentCache;
use news_relay::{
    article_cache_key, DeliveryUnit, DiscoveryParams, DiscoveryResult, MemoryJournal, NewsRelay,
    RelayConfig, RelayError, RunState, RunType,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    relay: NewsRelay,
    sources: Arc<FakeSources>,
    cache: Arc<CountingCache>,
    summarizer: Arc<FakeSummarizer>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(sources: FakeSources, summarizer: FakeSummarizer) -> Harness {
    init_tracing();
    let sources = Arc::new(sources);
    let cache = Arc::new(CountingCache::new());
    let summarizer = Arc::new(summarizer);
    let notifier = Arc::new(RecordingNotifier::new());

    let relay = NewsRelay::builder(RelayConfig::default())
        .sources(sources.clone())
        .cache(cache.clone())
        .summarizer(summarizer.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    Harness {
        relay,
        sources,
        cache,
        summarizer,
        notifier,
    }
}

#[tokio::test(start_paused = true)]
async fn triggered_discovery_delivers_new_articles() {
    let h = harness(
        FakeSources::new(
            Some(vec!["https://x/a", "https://x/b"]),
            Some(vec![("https://x/a", entry_meta("A")), ("https://x/b", entry_meta("B"))]),
        ),
        FakeSummarizer::replying("Summary."),
    );

    let response = h.relay.trigger_discovery(DiscoveryParams::default()).await;
    assert!(response.success);
    assert_eq!(response.run_type, RunType::Discovery);
    let run_id = response.run_id.unwrap();

    let status = h.relay.wait(RunType::Discovery, &run_id).await.unwrap();
    assert_eq!(status.state, RunState::Complete);
    let result: DiscoveryResult = serde_json::from_value(status.output.unwrap()).unwrap();
    assert_eq!(result.triggered.len(), 2);

    let failed = h.relay.wait_for_deliveries(&result).await.unwrap();
    assert_eq!(failed, 0);
    assert_eq!(h.notifier.delivered().len(), 2);
    assert!(h.cache.get(&article_cache_key("https://x/a")).await.unwrap().is_some());
    assert!(h.cache.get(&article_cache_key("https://x/b")).await.unwrap().is_some());

    // A second discovery finds nothing new
    let again = h.relay.discover_now(DiscoveryParams::default()).await.unwrap();
    assert_eq!(again.new_articles, 0);
    assert_eq!(h.notifier.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_deliveries_are_reported_per_run() {
    let h = harness(
        FakeSources::new(
            Some(vec!["https://x/a", "https://x/b"]),
            Some(vec![("https://x/a", entry_meta("A")), ("https://x/b", entry_meta("B"))]),
        ),
        FakeSummarizer::replying("Summary."),
    );
    h.cache.set_fail_puts(true);

    let result = h.relay.discover_now(DiscoveryParams::default()).await.unwrap();
    let failed = h.relay.wait_for_deliveries(&result).await.unwrap();

    assert_eq!(failed, 2);
    let status = h
        .relay
        .status(RunType::Delivery, &result.triggered[0].instance_id)
        .await
        .unwrap();
    assert_eq!(status.state, RunState::Errored);
    assert!(status.error.unwrap().contains("https://x/a"));
}

#[tokio::test]
async fn invalid_triggers_are_reported() {
    let h = harness(FakeSources::new(Some(vec![]), None), FakeSummarizer::replying("unused"));

    let response = h
        .relay
        .trigger_discovery(DiscoveryParams {
            listing_url: Some("not a url".to_string()),
            feed_url: None,
        })
        .await;
    assert!(!response.success);
    assert!(response.run_id.is_none());
    assert!(response.error.unwrap().contains("listing_url"));

    let mut bad = article("ftp://x/a");
    let response = h.relay.trigger_delivery(bad.clone(), false).await;
    assert!(!response.success);
    assert_eq!(response.run_type, RunType::Delivery);

    bad.url = "https://x/a".to_string();
    bad.title = "  ".to_string();
    let response = h.relay.trigger_delivery(bad, false).await;
    assert!(response.error.unwrap().contains("title"));
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let h = harness(FakeSources::new(Some(vec![]), None), FakeSummarizer::replying("unused"));

    let err = h.relay.status(RunType::Delivery, "missing").await.unwrap_err();
    assert!(matches!(err, RelayError::RunNotFound { run_type: RunType::Delivery, .. }));
}

#[tokio::test(start_paused = true)]
async fn manual_delivery_runs_once_per_url_while_in_flight() {
    let h = harness(
        FakeSources::new(Some(vec![]), None),
        FakeSummarizer::replying("Summary.").with_delay(Duration::from_secs(5)),
    );
    let article = article("https://x/a");

    let first = h.relay.trigger_delivery(article.clone(), false).await;
    let second = h.relay.trigger_delivery(article.clone(), false).await;
    assert_eq!(first.run_id, second.run_id);

    let status = h.relay.wait(RunType::Delivery, &first.run_id.unwrap()).await.unwrap();
    assert_eq!(status.state, RunState::Complete);
    assert_eq!(h.summarizer.calls(), 1);

    // Reprocess always gets its own run
    let forced = h.relay.trigger_delivery(article, true).await;
    let status = h.relay.wait(RunType::Delivery, &forced.run_id.unwrap()).await.unwrap();
    assert_eq!(status.state, RunState::Complete);
    assert_eq!(h.notifier.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn manual_delivery_skips_delivered_article() {
    let h = harness(FakeSources::new(Some(vec![]), None), FakeSummarizer::replying("Summary."));
    h.cache.seed("https://x/a").await;

    let response = h.relay.trigger_delivery(article("https://x/a"), false).await;
    let status = h.relay.wait(RunType::Delivery, &response.run_id.unwrap()).await.unwrap();

    assert_eq!(status.state, RunState::Complete);
    assert_eq!(status.output.unwrap()["skipped"], true);
    assert!(h.notifier.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_triggers_on_schedule_until_shutdown() {
    let h = harness(FakeSources::new(Some(vec![]), None), FakeSummarizer::replying("unused"));

    h.relay
        .run_periodic(Duration::from_secs(30 * 60), tokio::time::sleep(Duration::from_secs(65 * 60)))
        .await;

    // Ticks at 0, 30 and 60 minutes
    assert_eq!(h.sources.link_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn manual_delivery_uses_the_discovery_cache_key() {
    let h = harness(
        FakeSources::new(
            Some(vec!["https://x/a"]),
            Some(vec![("https://x/a", entry_meta("A"))]),
        ),
        FakeSummarizer::replying("Summary."),
    );

    let response = h
        .relay
        .trigger_delivery(article("https://x/a?utm_source=tw#share"), false)
        .await;
    let status = h.relay.wait(RunType::Delivery, &response.run_id.unwrap()).await.unwrap();
    assert_eq!(status.state, RunState::Complete);
    assert!(h.cache.get(&article_cache_key("https://x/a")).await.unwrap().is_some());
    assert_eq!(h.notifier.delivered()[0].link, "https://x/a");

    let result = h.relay.discover_now(DiscoveryParams::default()).await.unwrap();
    assert_eq!(result.new_articles, 0);

    let again = h
        .relay
        .deliver_now(DeliveryUnit {
            article: article("https://x/a?utm_medium=social"),
            reprocess: false,
        })
        .await
        .unwrap();
    assert!(again.skipped);
    assert_eq!(again.url, "https://x/a");
    assert_eq!(h.notifier.delivered().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_runs_do_not_accumulate_state() {
    init_tracing();
    let sources = Arc::new(FakeSources::new(
        Some(vec!["https://x/a"]),
        Some(vec![("https://x/a", entry_meta("A"))]),
    ));
    let journal = Arc::new(MemoryJournal::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let config = RelayConfig {
        run_retention: Duration::from_secs(45 * 60),
        ..RelayConfig::default()
    };
    let relay = NewsRelay::builder(config)
        .sources(sources.clone())
        .journal(journal.clone())
        .summarizer(Arc::new(FakeSummarizer::replying("Summary.")))
        .notifier(notifier.clone())
        .build()
        .unwrap();

    relay
        .run_periodic(Duration::from_secs(30 * 60), tokio::time::sleep(Duration::from_secs(305 * 60)))
        .await;

    assert_eq!(sources.link_calls(), 11);
    assert_eq!(notifier.delivered().len(), 1);
    // Discoveries from the 270 and 300 minute ticks
    assert_eq!(relay.tracked_runs().await, 2);
    assert!(journal.is_empty().await);
}

#[test]
fn invalid_listing_selector_fails_build() {
    let config = RelayConfig {
        listing_selector: Some("a[[".to_string()),
        ..RelayConfig::default()
    };

    assert!(matches!(NewsRelay::builder(config).build(), Err(RelayError::Parse(_))));
}
