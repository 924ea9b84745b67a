//! Working proxy pool and the builder that discovers it.

use crate::config::PoolBuilderConfig;
use crate::error::NoProxyAvailable;
use crate::proxy::ProxyAddress;
use crate::report::{default_sink, FailureSink};
use crate::retry::RetryPolicy;
use crate::store;
use crate::utils;

use futures::stream::{self, StreamExt};
use governor::{clock::DefaultClock, middleware::NoOpMiddleware, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type ProbeLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// An ordered, capped, duplicate-free set of verified proxies.
///
/// Two pools are equal when they hold the same proxies in the same order; the
/// cap is not part of the persisted document and is ignored.
#[derive(Debug, Clone)]
pub struct ProxyPool {
    proxies: Vec<ProxyAddress>,
    cap: usize,
}

impl ProxyPool {
    /// Create an empty pool holding at most `cap` proxies.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            proxies: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Create a pool from `addresses`, dropping duplicates and anything past `cap`.
    pub fn from_addresses(addresses: impl IntoIterator<Item = ProxyAddress>, cap: usize) -> Self {
        let mut pool = Self::with_capacity(cap);
        for address in addresses {
            pool.push(address);
        }
        pool
    }

    /// Append a proxy. Returns false if the pool is full or already holds it.
    pub fn push(&mut self, proxy: ProxyAddress) -> bool {
        if self.is_full() || self.proxies.contains(&proxy) {
            return false;
        }
        self.proxies.push(proxy);
        true
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.proxies.len() >= self.cap
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Proxies in pool order.
    pub fn iter(&self) -> std::slice::Iter<'_, ProxyAddress> {
        self.proxies.iter()
    }

    /// The first proxy in pool order.
    pub fn first(&self) -> Result<&ProxyAddress, NoProxyAvailable> {
        self.proxies.first().ok_or(NoProxyAvailable)
    }
}

impl PartialEq for ProxyPool {
    fn eq(&self, other: &Self) -> bool {
        self.proxies == other.proxies
    }
}

impl Eq for ProxyPool {}

impl<'a> IntoIterator for &'a ProxyPool {
    type Item = &'a ProxyAddress;
    type IntoIter = std::slice::Iter<'a, ProxyAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.proxies.iter()
    }
}

/// Discovers live proxies from the configured feeds.
pub struct PoolBuilder {
    config: PoolBuilderConfig,
    limiter: Arc<ProbeLimiter>,
    sink: Arc<dyn FailureSink>,
}

impl PoolBuilder {
    /// Create a builder that reports failures to the log.
    pub fn new(config: PoolBuilderConfig) -> Self {
        let rps = NonZeroU32::new(config.max_probes_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self {
            config,
            limiter,
            sink: default_sink(),
        }
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PoolBuilderConfig {
        &self.config
    }

    /// Fetch every source in turn, probe its candidates and collect up to
    /// `target_count` live proxies.
    ///
    /// Sources that fail to download contribute nothing. When an output path is
    /// configured and at least one proxy survived, the pool is persisted there.
    pub async fn build_pool(&self) -> ProxyPool {
        let mut pool = ProxyPool::with_capacity(self.config.target_count);

        let client = match Client::builder().no_proxy().build() {
            Ok(client) => client,
            Err(e) => {
                self.sink.report(&format!("Failed to build http client for proxy sources: {}", e));
                return pool;
            }
        };

        let mut seen = HashSet::new();
        for source in &self.config.sources {
            if pool.is_full() {
                break;
            }

            info!("Fetching proxies from: {}", source);
            let candidates =
                match utils::fetch_proxies_from_source(&client, source, self.config.source_timeout).await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        self.sink.report(&format!("Error fetching proxies from {}: {}", source, e));
                        continue;
                    }
                };

            let fresh: Vec<ProxyAddress> = candidates
                .into_iter()
                .filter(|candidate| seen.insert(candidate.clone()))
                .collect();
            if fresh.is_empty() {
                warn!("No proxies found in {}", source);
                continue;
            }

            info!("Testing {} candidates from {}", fresh.len(), source);
            self.probe_candidates(fresh, &mut pool).await;
        }

        info!("Found {}/{} working proxies", pool.len(), self.config.target_count);

        if let Some(path) = &self.config.output_path {
            if pool.is_empty() {
                warn!("No working proxies found, leaving '{}' untouched", path.display());
            } else if let Err(e) = store::save_pool(path, &pool) {
                self.sink.report(&format!("Error saving proxy file '{}': {}", path.display(), e));
            }
        }

        pool
    }

    /// Probe `candidates` with bounded concurrency until the pool is full.
    ///
    /// Probes already in flight when the pool fills up keep running in the
    /// background; their results are dropped.
    async fn probe_candidates(&self, candidates: Vec<ProxyAddress>, pool: &mut ProxyPool) {
        let test_url = self.config.test_url.clone();
        let timeout = self.config.probe_timeout;
        let retry = self.config.probe_retry;

        let mut probes = stream::iter(candidates)
            .map(|candidate| {
                tokio::spawn(probe_proxy(
                    candidate,
                    test_url.clone(),
                    timeout,
                    retry,
                    Arc::clone(&self.limiter),
                ))
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some(joined) = probes.next().await {
            match joined {
                Ok(Some(proxy)) => {
                    info!("Proxy {} is working", proxy);
                    pool.push(proxy);
                    if pool.is_full() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Proxy probe task failed: {}", e),
            }
        }
    }
}

/// Liveness probe: GET `test_url` through `proxy` until it answers 200 or the
/// retry policy runs out.
async fn probe_proxy(
    proxy: ProxyAddress,
    test_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    limiter: Arc<ProbeLimiter>,
) -> Option<ProxyAddress> {
    let reqwest_proxy = match proxy.to_reqwest_proxy() {
        Ok(p) => p,
        Err(e) => {
            debug!("Cannot use proxy {}: {}", proxy, e);
            return None;
        }
    };
    let client = match Client::builder()
        .proxy(reqwest_proxy)
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            debug!("Cannot build client for proxy {}: {}", proxy, e);
            return None;
        }
    };

    let client = &client;
    let test_url = test_url.as_str();
    let limiter = &limiter;
    let proxy_ref = &proxy;
    let outcome = retry
        .run(|attempt| async move {
            limiter.until_ready().await;
            match client.get(test_url).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => Ok(()),
                Ok(resp) => {
                    debug!(
                        "Proxy {} failed with status code {} (attempt {})",
                        proxy_ref,
                        resp.status(),
                        attempt
                    );
                    Err(())
                }
                Err(e) if e.is_timeout() => {
                    debug!("Proxy {} timed out (attempt {})", proxy_ref, attempt);
                    Err(())
                }
                Err(e) => {
                    debug!("Proxy {} failed with error: {} (attempt {})", proxy_ref, e, attempt);
                    Err(())
                }
            }
        })
        .await;

    match outcome {
        Ok(()) => Some(proxy),
        Err(()) => {
            debug!("Proxy {} failed after {} attempts", proxy, retry.max_attempts);
            None
        }
    }
}
