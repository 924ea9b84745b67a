//! Connection layer: direct requests with a static fallback proxy.

use crate::config::ConnectionConfig;
use crate::error::FetchError;
use crate::proxy::ProxyAddress;
use crate::report::{default_sink, FailureSink};

use http::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use log::debug;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Issues GET and HEAD requests either directly or through a proxy.
///
/// Request failures never escape as panics: network errors, timeouts and
/// non-2xx statuses all come back as a [`FetchError`] that has already been
/// reported to the failure sink.
pub struct Connection {
    config: ConnectionConfig,
    headers: HeaderMap,
    direct: Client,
    probe: Client,
    proxied: Option<Client>,
    sink: Arc<dyn FailureSink>,
}

impl Connection {
    /// Build the direct client and, if a fallback proxy is configured, the proxied one.
    pub fn new(config: ConnectionConfig) -> Result<Self, FetchError> {
        let headers = default_headers(&config);

        let direct = Client::builder()
            .no_proxy()
            .default_headers(headers.clone())
            .build()
            .map_err(FetchError::Build)?;

        // Status probes must see 301/302 themselves rather than their targets.
        let probe = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .default_headers(headers.clone())
            .build()
            .map_err(FetchError::Build)?;

        let proxied = match &config.fallback_proxy {
            Some(proxy) => Some(proxied_client(proxy, &headers)?),
            None => None,
        };

        Ok(Self {
            config,
            headers,
            direct,
            probe,
            proxied,
            sink: default_sink(),
        })
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Issue a single GET. With `use_proxy` the request goes through the
    /// configured fallback proxy rather than a pool proxy.
    pub async fn fetch(&self, url: &str, use_proxy: bool, timeout: Duration) -> Result<Response, FetchError> {
        let client = if use_proxy {
            match &self.proxied {
                Some(client) => client,
                None => {
                    let err = FetchError::NoProxy { url: url.to_string() };
                    self.sink.report(&format!("Request failed: {}", err));
                    return Err(err);
                }
            }
        } else {
            &self.direct
        };

        let result = match client.get(url).timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => Ok(resp),
            Ok(resp) => Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status(),
            }),
            Err(e) => Err(FetchError::from_reqwest(url, e)),
        };

        if let Err(e) = &result {
            self.sink.report(&format!("Request failed: {}", e));
        }
        result
    }

    /// Tiered fetch: direct first, then through the fallback proxy. Each tier is
    /// retried according to the configured policy.
    pub async fn fetch_with_fallback(&self, url: &str) -> Result<Response, FetchError> {
        let timeout = self.config.timeout;
        let retry = self.config.retry;

        match retry.run(|_| self.fetch(url, false, timeout)).await {
            Ok(resp) => Ok(resp),
            Err(_) if self.proxied.is_some() => {
                self.sink.report(&format!(
                    "Direct connection failed for {}, attempting with proxy...",
                    url
                ));
                retry.run(|_| self.fetch(url, true, timeout)).await
            }
            Err(e) => Err(e),
        }
    }

    /// HEAD `url` directly, without following redirects, and return the status
    /// without judging it.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<StatusCode, FetchError> {
        self.probe
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map(|resp| resp.status())
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// GET `url` through `proxy` and return the status without judging it.
    pub async fn get_via(
        &self,
        url: &str,
        proxy: &ProxyAddress,
        timeout: Duration,
    ) -> Result<StatusCode, FetchError> {
        let client = proxied_client(proxy, &self.headers)?;
        debug!("GET {} via {}", url, proxy);
        client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map(|resp| resp.status())
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

/// Browser-like headers sent with every request. Accept-Encoding is added by
/// reqwest itself, which then also decompresses the body.
fn default_headers(config: &ConnectionConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
        headers.insert(USER_AGENT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&config.accept) {
        headers.insert(ACCEPT, value);
    }
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers
}

fn proxied_client(proxy: &ProxyAddress, headers: &HeaderMap) -> Result<Client, FetchError> {
    let reqwest_proxy = proxy.to_reqwest_proxy().map_err(FetchError::Build)?;
    Client::builder()
        .proxy(reqwest_proxy)
        .default_headers(headers.clone())
        .build()
        .map_err(FetchError::Build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_user_agent() {
        let config = ConnectionConfig::default();
        let headers = default_headers(&config);
        assert_eq!(
            headers.get(USER_AGENT).and_then(|v| v.to_str().ok()),
            Some(config.user_agent.as_str())
        );
        assert!(headers.contains_key("dnt"));
    }

    #[tokio::test]
    async fn proxy_tier_without_fallback_proxy_fails() {
        let config = ConnectionConfig {
            fallback_proxy: None,
            ..ConnectionConfig::default()
        };
        let connection = Connection::new(config).unwrap();
        let result = connection
            .fetch("http://127.0.0.1:9/", true, Duration::from_millis(100))
            .await;
        assert!(result.is_err());
    }
}
