mod common;

use common::{closed_port, init_test_logger, CollectingSink, FakeServer};
use proxy_fetch::{
    Connection, ConnectionConfig, ProxyAddress, ProxyPool, UrlValidator, Validation, ValidatorConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// A site answering HEAD by path: `/ok` 200, `/moved` 301, `/found` 302,
/// `/denied` 403, anything else 404.
async fn site() -> FakeServer {
    FakeServer::start(|_, target| {
        let status = match target {
            t if t.ends_with("/ok") => 200,
            t if t.ends_with("/moved") => 301,
            t if t.ends_with("/found") => 302,
            t if t.ends_with("/denied") => 403,
            _ => 404,
        };
        (status, String::new())
    })
    .await
}

fn pool_of(servers: &[&FakeServer]) -> ProxyPool {
    ProxyPool::from_addresses(
        servers.iter().map(|s| ProxyAddress::parse(&s.host_port()).unwrap()),
        5,
    )
}

fn validator(pool: ProxyPool, sink: Arc<CollectingSink>) -> UrlValidator {
    let connection = Connection::new(ConnectionConfig::default())
        .unwrap()
        .with_sink(sink.clone());
    let config = ValidatorConfig {
        head_timeout: Duration::from_secs(2),
        sweep_timeout: Duration::from_secs(2),
        ..ValidatorConfig::default()
    };
    UrlValidator::new(Arc::new(connection), pool, config).with_sink(sink)
}

#[tokio::test]
async fn denied_url_without_proxies_is_dropped_but_batch_continues() {
    init_test_logger();
    let site = site().await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(ProxyPool::with_capacity(5), sink.clone());

    let ok = site.url("/ok");
    let denied = site.url("/denied");
    let valid = validator.validate_urls(vec![ok.clone(), denied, site.url("/ok")]).await;

    assert_eq!(valid, vec![ok.clone(), ok]);
    assert!(sink
        .messages()
        .iter()
        .any(|m| m.starts_with("No proxies available")));
}

#[tokio::test]
async fn redirects_count_as_reachable_and_others_do_not() {
    init_test_logger();
    let site = site().await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(ProxyPool::with_capacity(5), sink.clone());

    let valid = validator
        .validate_urls(vec![site.url("/moved"), site.url("/missing"), site.url("/found")])
        .await;

    assert_eq!(valid, vec![site.url("/moved"), site.url("/found")]);
    assert!(sink
        .messages()
        .iter()
        .any(|m| m.contains("/missing") && m.contains("Status code 404")));
}

#[tokio::test]
async fn proxy_sweep_tries_pool_in_order_until_success() {
    init_test_logger();
    let site = site().await;
    let refusing = FakeServer::fixed(403, "").await;
    let failing = FakeServer::fixed(500, "").await;
    let working = FakeServer::fixed(200, "<html>ok</html>").await;
    let unused = FakeServer::fixed(200, "").await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(pool_of(&[&refusing, &failing, &working, &unused]), sink);

    let denied = site.url("/denied");
    let valid = validator.validate_urls(vec![site.url("/missing"), denied.clone()]).await;

    assert_eq!(valid, vec![denied.clone()]);
    for proxy in [&refusing, &failing, &working] {
        assert_eq!(proxy.hits(), vec![("GET".to_string(), denied.clone())]);
    }
    assert!(unused.hits().is_empty(), "sweep stops at the first 200");
}

#[tokio::test]
async fn exhausted_sweep_drops_the_url() {
    init_test_logger();
    let site = site().await;
    let refusing = FakeServer::fixed(403, "").await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(pool_of(&[&refusing]), sink.clone());

    let denied = site.url("/denied");
    let valid = validator.validate_urls(vec![denied.clone()]).await;

    assert!(valid.is_empty());
    assert!(sink
        .messages()
        .contains(&format!("All proxies failed to access {}", denied)));
}

#[tokio::test]
async fn working_set_is_replaced_by_survivors() {
    init_test_logger();
    let site = site().await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(ProxyPool::with_capacity(5), sink);

    validator.add_url(site.url("/missing"));
    validator.add_url(site.url("/ok"));
    validator.add_url("http://127.0.0.1:1/unreachable");
    let first = validator.validate().await;
    assert_eq!(first, vec![site.url("/ok")]);
    assert!(validator
        .records()
        .iter()
        .all(|r| r.validation == Validation::Valid));
    let rejected: Vec<String> = validator.rejected().iter().map(|r| r.url.clone()).collect();
    assert_eq!(
        rejected,
        vec![site.url("/missing"), "http://127.0.0.1:1/unreachable".to_string()]
    );
    assert!(validator
        .rejected()
        .iter()
        .all(|r| r.validation == Validation::Invalid));

    let second = validator.validate().await;
    assert_eq!(second, first);
    assert_eq!(validator.urls().collect::<Vec<_>>(), vec![site.url("/ok")]);
}

#[tokio::test]
async fn output_is_an_ordered_subset_of_input() {
    init_test_logger();
    let site = site().await;
    let working = FakeServer::fixed(200, "").await;
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(pool_of(&[&working]), sink);

    let input = vec![
        site.url("/denied"),
        site.url("/missing"),
        site.url("/ok"),
        "notaurl".to_string(),
        site.url("/found"),
    ];
    let valid = validator.validate_urls(input.clone()).await;

    let mut remaining = input.iter();
    for url in &valid {
        assert!(remaining.any(|candidate| candidate == url), "{} out of order or foreign", url);
    }
    assert_eq!(valid, vec![site.url("/denied"), site.url("/ok"), site.url("/found")]);
}

#[tokio::test]
async fn sweep_moves_past_unreachable_proxy() {
    init_test_logger();
    let site = site().await;
    let working = FakeServer::fixed(200, "").await;
    let pool = ProxyPool::from_addresses(
        vec![
            ProxyAddress::parse(&closed_port().await).unwrap(),
            ProxyAddress::parse(&working.host_port()).unwrap(),
        ],
        5,
    );
    let sink = Arc::new(CollectingSink::default());
    let mut validator = validator(pool, sink.clone());

    let denied = site.url("/denied");
    let valid = validator.validate_urls(vec![denied.clone()]).await;

    assert_eq!(valid, vec![denied.clone()]);
    assert_eq!(working.hits(), vec![("GET".to_string(), denied)]);
    assert!(sink.messages().is_empty());
}
