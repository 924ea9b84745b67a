//! Discover working HTTP proxies and save them to proxy.json.

use proxy_fetch::{init_logging, LoggingConfig, PoolBuilder, PoolBuilderConfig, RetryPolicy};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(&LoggingConfig::default())?;

    let config = PoolBuilderConfig::builder()
        .sources(vec![
            "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt",
            "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
        ])
        .test_url("http://httpbin.org/ip")
        .target_count(5)
        .probe_timeout(Duration::from_millis(500))
        .probe_retry(RetryPolicy::fixed(5, Duration::from_millis(100)))
        .concurrency(10)
        .output_path("proxy.json")
        .build();

    let pool = PoolBuilder::new(config).build_pool().await;

    println!("Found {} working proxies:", pool.len());
    for proxy in &pool {
        println!("  {}", proxy);
    }

    Ok(())
}
