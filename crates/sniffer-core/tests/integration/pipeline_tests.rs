use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use sniffer_core::{
    CircuitBreakerConfig, CircuitState, ConcurrentFetchClient, FetchClient, NullSink,
    RequestOptions, ScrapeOrchestrator, Severity,
};

use crate::common::{
    BASE, CatalogAdapter, FakeStore, MemorySink, category_url, fast_config, init_tracing,
};

fn units(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn cycle_isolates_failing_unit() {
    init_tracing();
    let store = FakeStore::new()
        .with_category(
            "tvs",
            json!([
                {"sku": "tv-1", "title": "TV 50", "price": 400.0, "list_price": 20000.0},
                {"sku": "tv-2", "title": "TV 65", "price": 90000.0, "list_price": 100000.0},
            ]),
        )
        .with_page("celulares", 403, "blocked".into())
        .with_category(
            "notebooks",
            json!([{"sku": "nb-1", "title": "Notebook", "price": 50.0, "list_price": 100.0}]),
        );
    let adapter = CatalogAdapter::new(FetchClient::new(store.clone(), fast_config()));
    let sink = MemorySink::default();
    let orchestrator = ScrapeOrchestrator::new(adapter, sink.clone());

    let results = orchestrator
        .run_cycle(&units(&["tvs", "celulares", "notebooks"]))
        .await;

    assert_eq!(results.len(), 3);

    assert!(results[0].success());
    assert_eq!(results[0].products_found, 2);
    assert_eq!(results[0].glitches_found, 1);
    assert_eq!(results[0].glitches[0].severity, Severity::Critical);

    assert!(!results[1].success());
    assert_eq!(results[1].products_found, 0);
    assert!(results[1].errors[0].contains("Access denied"), "{:?}", results[1].errors);

    assert!(results[2].success());
    assert_eq!(results[2].glitches[0].severity, Severity::Medium);

    assert_eq!(sink.calls(), 2);
    assert_eq!(sink.saved().len(), 3);
    assert!(sink.saved().iter().all(|p| p.source == "tienda"));

    // One warm-up for the host, then one request per unit.
    let hits = store.hits();
    assert_eq!(hits[0], format!("{BASE}/"));
    assert_eq!(hits.len(), 4);
}

#[tokio::test]
async fn malformed_items_are_skipped() {
    let store = FakeStore::new().with_category(
        "tvs",
        json!([
            {"sku": "ok-1", "price": 1500.0, "list_price": 1600.0},
            {"title": "no sku", "price": 10.0},
            {"sku": "no-price"},
            {"sku": "ok-2", "price": 2500.0},
        ]),
    );
    let adapter = CatalogAdapter::new(FetchClient::new(store, fast_config()));
    let orchestrator = ScrapeOrchestrator::new(adapter, NullSink);

    let result = orchestrator.run_unit("tvs").await;

    assert_eq!(result.products_found, 2);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.products[0].id, "ok-1");
    assert_eq!(result.products[1].id, "ok-2");
    assert_eq!(result.products[0].category, "tvs");
}

#[tokio::test]
async fn price_drop_between_cycles_is_flagged() -> anyhow::Result<()> {
    init_tracing();
    let store = FakeStore::new().with_category(
        "heladeras",
        json!([{"sku": "h-1", "title": "Heladera", "price": 100000.0}]),
    );
    let adapter = CatalogAdapter::new(FetchClient::new(store.clone(), fast_config()));
    let sink = MemorySink::default();
    let orchestrator = ScrapeOrchestrator::new(adapter, sink.clone());
    let unit_list = units(&["heladeras"]);

    let first = orchestrator.run_cycle(&unit_list).await;
    assert_eq!(first[0].glitches_found, 0);

    store.set_category(
        "heladeras",
        json!([{"sku": "h-1", "title": "Heladera", "price": 40000.0}]),
    );
    let second = orchestrator.run_cycle(&unit_list).await;

    assert_eq!(second[0].glitches_found, 1);
    let glitch = &second[0].glitches[0];
    assert_eq!(glitch.severity, Severity::High);
    assert_eq!(glitch.previous_price, 100000.0);
    assert_eq!(glitch.drop_pct, 60.0);
    Ok(())
}

#[tokio::test]
async fn fetch_options_reach_the_adapter() {
    let store = FakeStore::new().with_category("tvs", json!([]));
    let client = FetchClient::new(store, fast_config().with_warm_up(false));
    let adapter = CatalogAdapter::new(client.clone());
    let orchestrator =
        ScrapeOrchestrator::new(adapter, NullSink).with_fetch_options(json!({"limit": 24}));

    let result = orchestrator.run_unit("tvs").await;
    assert!(result.errors.is_empty());
    assert!(!result.success());
    assert_eq!(client.transport().hits(), vec![category_url("tvs")]);
}

#[tokio::test]
async fn server_errors_open_the_breaker_for_later_units() {
    let store = FakeStore::new()
        .with_page("a", 503, String::new())
        .with_page("b", 503, String::new())
        .with_category("c", json!([{"sku": "c-1", "price": 10.0}]));
    let config = fast_config().with_warm_up(false).with_breaker(CircuitBreakerConfig {
        failure_threshold: 3,
        ..Default::default()
    });
    let client = FetchClient::new(store.clone(), config);
    let adapter = CatalogAdapter::new(client.clone());
    let orchestrator = ScrapeOrchestrator::new(adapter, NullSink);

    let results = orchestrator.run_cycle(&units(&["a", "b", "c"])).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.success()));
    assert_eq!(client.breaker().state(), CircuitState::Open);
    assert!(results[2].errors[0].contains("Circuit breaker 'tienda' is open"));
    // Three 503s on "a" trip the breaker; nothing else is sent.
    assert_eq!(store.hits().len(), 3);
}

#[tokio::test]
async fn concurrent_client_gathers_in_order() -> anyhow::Result<()> {
    let store = FakeStore::new()
        .with_category("a", json!([{"sku": "a"}]))
        .with_category("b", json!([{"sku": "b"}]));
    let client = ConcurrentFetchClient::new(
        FetchClient::new(store, fast_config().with_warm_up(false)),
        2,
    );

    let urls = vec![category_url("b"), category_url("missing"), category_url("a")];
    let results = client.gather_get(&urls, &RequestOptions::default()).await;

    let first: serde_json::Value = results[0].as_ref().unwrap().json()?;
    assert_eq!(first["items"][0]["sku"], "b");
    assert!(results[1].is_err());
    let third: serde_json::Value = results[2].as_ref().unwrap().json()?;
    assert_eq!(third["items"][0]["sku"], "a");
    Ok(())
}

#[tokio::test]
async fn scheduler_stops_on_cancellation() {
    let store = FakeStore::new().with_category("tvs", json!([]));
    let adapter = CatalogAdapter::new(FetchClient::new(store, fast_config()));
    let orchestrator = ScrapeOrchestrator::new(adapter, NullSink);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let cycles = orchestrator
        .run_until_cancelled(&units(&["tvs"]), Duration::from_secs(60), token)
        .await;
    assert_eq!(cycles, 1);
}
