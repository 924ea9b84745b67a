//! Configuration for the pool builder, connection layer, validator and task runner.

use crate::proxy::ProxyAddress;
use crate::retry::RetryPolicy;

use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;

/// Default proxy feeds.
pub const DEFAULT_SOURCES: &[&str] = &[
    "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt",
    "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
];

/// Browser-like user agent sent with validation and page requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// Configuration for building the working proxy pool.
#[derive(Debug, Clone)]
pub struct PoolBuilderConfig {
    /// Source URLs (or local files) to fetch proxy lists from.
    pub sources: Vec<String>,
    /// Endpoint every candidate must return 200 for.
    pub test_url: String,
    /// Number of live proxies to collect; also the pool cap.
    pub target_count: usize,
    /// Timeout of a single liveness attempt.
    pub probe_timeout: Duration,
    /// Attempts and delay for the liveness probe.
    pub probe_retry: RetryPolicy,
    /// Number of candidates probed at the same time.
    pub concurrency: usize,
    /// Timeout for downloading a proxy source.
    pub source_timeout: Duration,
    /// Upper bound on probe requests per second across all workers.
    pub max_probes_per_second: u32,
    /// Where the pool document is written, if anywhere.
    pub output_path: Option<PathBuf>,
}

impl PoolBuilderConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolBuilderConfigBuilder {
        PoolBuilderConfigBuilder::new()
    }
}

impl Default for PoolBuilderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `PoolBuilderConfig`.
pub struct PoolBuilderConfigBuilder {
    sources: Option<Vec<String>>,
    test_url: Option<String>,
    target_count: Option<usize>,
    probe_timeout: Option<Duration>,
    probe_retry: Option<RetryPolicy>,
    concurrency: Option<usize>,
    source_timeout: Option<Duration>,
    max_probes_per_second: Option<u32>,
    output_path: Option<PathBuf>,
}

impl PoolBuilderConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: None,
            test_url: None,
            target_count: None,
            probe_timeout: None,
            probe_retry: None,
            concurrency: None,
            source_timeout: None,
            max_probes_per_second: None,
            output_path: None,
        }
    }

    /// Set the source URLs to fetch proxy lists from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Set the endpoint used by the liveness probe.
    pub fn test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = Some(url.into());
        self
    }

    /// Set how many live proxies to collect.
    pub fn target_count(mut self, count: usize) -> Self {
        self.target_count = Some(count);
        self
    }

    /// Set the timeout of one liveness attempt.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the retry policy of the liveness probe.
    pub fn probe_retry(mut self, policy: RetryPolicy) -> Self {
        self.probe_retry = Some(policy);
        self
    }

    /// Set the number of concurrent probes.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }

    /// Set the timeout for downloading a proxy source.
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    /// Set the global probe rate limit.
    pub fn max_probes_per_second(mut self, rps: u32) -> Self {
        self.max_probes_per_second = Some(rps);
        self
    }

    /// Persist the finished pool to this path.
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolBuilderConfig {
        PoolBuilderConfig {
            sources: self
                .sources
                .unwrap_or_else(|| DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()),
            test_url: self.test_url.unwrap_or_else(|| "http://httpbin.org/ip".to_string()),
            target_count: self.target_count.unwrap_or(5),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_millis(500)),
            probe_retry: self
                .probe_retry
                .unwrap_or_else(|| RetryPolicy::fixed(5, Duration::from_millis(100))),
            concurrency: self.concurrency.unwrap_or(10).max(1),
            source_timeout: self.source_timeout.unwrap_or(Duration::from_secs(10)),
            max_probes_per_second: self.max_probes_per_second.unwrap_or(50),
            output_path: self.output_path,
        }
    }
}

impl Default for PoolBuilderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the connection layer.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout used by `fetch_with_fallback`.
    pub timeout: Duration,
    /// Static proxy used for the second tier. `None` disables the proxy tier.
    pub fallback_proxy: Option<ProxyAddress>,
    /// User agent header.
    pub user_agent: String,
    /// Accept header.
    pub accept: String,
    /// Retry policy applied within each tier.
    pub retry: RetryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            fallback_proxy: ProxyAddress::parse("127.0.0.1:8080").ok(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8".to_string(),
            retry: RetryPolicy::once(),
        }
    }
}

/// Configuration for URL validation.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout of the initial HEAD probe.
    pub head_timeout: Duration,
    /// Timeout of each GET during the proxy sweep.
    pub sweep_timeout: Duration,
    /// HEAD statuses that make a URL valid without a proxy.
    pub accepted_statuses: Vec<StatusCode>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            head_timeout: Duration::from_secs(10),
            sweep_timeout: Duration::from_secs(10),
            accepted_statuses: vec![StatusCode::OK, StatusCode::MOVED_PERMANENTLY, StatusCode::FOUND],
        }
    }
}

/// Default wall-clock limit for one remote API round trip.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);
