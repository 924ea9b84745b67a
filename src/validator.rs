//! URL validation with proxy escalation on access denial.
//!
//! Each URL starts unchecked and is probed with a direct HEAD request. Accepted
//! statuses make it valid; a 403 moves it to a proxy sweep, where a full GET is
//! tried through every pool proxy in order until one answers 200. Anything else
//! makes it invalid. URLs are handled one at a time and proxies are never raced.

use crate::config::ValidatorConfig;
use crate::connection::Connection;
use crate::pool::ProxyPool;
use crate::report::{default_sink, FailureSink};

use log::{debug, info};
use reqwest::StatusCode;
use std::sync::Arc;
use url::Url;

/// Validation outcome of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Unvalidated,
    Valid,
    Invalid,
}

/// A target URL and what validation made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub url: String,
    pub validation: Validation,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            validation: Validation::Unvalidated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlState {
    Unchecked,
    NeedsProxy,
    Valid,
    Invalid,
}

/// Filters a working set of URLs down to the reachable ones.
pub struct UrlValidator {
    connection: Arc<Connection>,
    pool: ProxyPool,
    config: ValidatorConfig,
    records: Vec<UrlRecord>,
    rejected: Vec<UrlRecord>,
    sink: Arc<dyn FailureSink>,
}

impl UrlValidator {
    /// Create a validator over a snapshot of the proxy pool.
    pub fn new(connection: Arc<Connection>, pool: ProxyPool, config: ValidatorConfig) -> Self {
        Self {
            connection,
            pool,
            config,
            records: Vec::new(),
            rejected: Vec::new(),
            sink: default_sink(),
        }
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Add a URL to the working set.
    pub fn add_url(&mut self, url: impl Into<String>) {
        self.records.push(UrlRecord::new(url));
    }

    /// Drop every URL from the working set.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[UrlRecord] {
        &self.records
    }

    /// URLs the last validation dropped, marked invalid.
    pub fn rejected(&self) -> &[UrlRecord] {
        &self.rejected
    }

    /// URLs currently in the working set, in insertion order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.url.as_str())
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    /// Replace the working set with `urls` and validate it.
    pub async fn validate_urls<I, S>(&mut self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear();
        for url in urls {
            self.add_url(url);
        }
        self.validate().await
    }

    /// Validate the working set and keep only the URLs that passed.
    ///
    /// Returns the surviving URLs in their original order. A URL denied with 403
    /// while the pool is empty is dropped; the rest of the batch still runs.
    pub async fn validate(&mut self) -> Vec<String> {
        self.rejected.clear();
        if self.records.is_empty() {
            self.sink.report("No URLs provided");
            return Vec::new();
        }

        let records = std::mem::take(&mut self.records);
        let mut starved = 0;
        let mut survivors = Vec::with_capacity(records.len());

        for mut record in records {
            let mut state = UrlState::Unchecked;
            loop {
                state = match state {
                    UrlState::Unchecked => self.probe_direct(&record.url).await,
                    UrlState::NeedsProxy if self.pool.is_empty() => {
                        starved += 1;
                        UrlState::Invalid
                    }
                    UrlState::NeedsProxy => self.sweep(&record.url).await,
                    UrlState::Valid | UrlState::Invalid => break,
                };
            }

            if state == UrlState::Valid {
                record.validation = Validation::Valid;
                survivors.push(record);
            } else {
                debug!("Dropping {} after validation", record.url);
                record.validation = Validation::Invalid;
                self.rejected.push(record);
            }
        }

        if starved > 0 {
            self.sink.report(&format!(
                "No proxies available to try for {} access-denied URL(s)",
                starved
            ));
        }

        info!("{} URL(s) passed validation", survivors.len());
        let urls = survivors.iter().map(|r| r.url.clone()).collect();
        self.records = survivors;
        urls
    }

    async fn probe_direct(&self, url: &str) -> UrlState {
        if let Err(e) = Url::parse(url) {
            self.sink.report(&format!("URL validation failed for {}: {}", url, e));
            return UrlState::Invalid;
        }

        match self.connection.head(url, self.config.head_timeout).await {
            Ok(status) if self.config.accepted_statuses.contains(&status) => UrlState::Valid,
            Ok(StatusCode::FORBIDDEN) => {
                info!("{} returned 403, escalating to proxies", url);
                UrlState::NeedsProxy
            }
            Ok(status) => {
                self.sink.report(&format!(
                    "URL validation failed for {}: Status code {}",
                    url,
                    status.as_u16()
                ));
                UrlState::Invalid
            }
            Err(e) => {
                self.sink.report(&format!("URL validation failed for {}: {}", url, e));
                UrlState::Invalid
            }
        }
    }

    async fn sweep(&self, url: &str) -> UrlState {
        for proxy in &self.pool {
            info!("Trying proxy: {}", proxy);
            match self.connection.get_via(url, proxy, self.config.sweep_timeout).await {
                Ok(StatusCode::OK) => {
                    info!("Proxy {} succeeded", proxy);
                    return UrlState::Valid;
                }
                Ok(StatusCode::FORBIDDEN) => info!("Proxy {} received 403", proxy),
                Ok(status) => info!("Proxy {} received status {}", proxy, status.as_u16()),
                Err(e) => info!("Proxy {} failed with error: {}", proxy, e),
            }
        }
        self.sink.report(&format!("All proxies failed to access {}", url));
        UrlState::Invalid
    }
}
