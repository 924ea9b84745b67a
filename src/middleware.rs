//! Middleware implementation for reqwest.

use crate::proxy::ProxyAddress;
use crate::report::{default_sink, FailureSink};

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that retries a failed or non-2xx request once through a static
/// fallback proxy.
///
/// The wrapped client should be built with `no_proxy()` so the first tier is
/// a genuine direct connection.
#[derive(Clone)]
pub struct ProxyFallbackMiddleware {
    /// The fallback proxy.
    proxy: ProxyAddress,
    /// Client routed through the fallback proxy.
    proxied: reqwest::Client,
    sink: Arc<dyn FailureSink>,
}

impl ProxyFallbackMiddleware {
    /// Create a middleware falling back to `proxy`.
    pub fn new(proxy: ProxyAddress) -> std::result::Result<Self, reqwest::Error> {
        let proxied = reqwest::Client::builder()
            .proxy(proxy.to_reqwest_proxy()?)
            .build()?;
        Ok(Self {
            proxy,
            proxied,
            sink: default_sink(),
        })
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }
}

#[async_trait]
impl Middleware for ProxyFallbackMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let fallback_request = req.try_clone().ok_or_else(|| {
            Error::Middleware(anyhow!(
                "Request object is not cloneable. Are you passing a streaming body?".to_string()
            ))
        })?;
        let url = req.url().clone();

        match next.run(req, extensions).await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => warn!(
                "Direct request to {} returned {}, retrying through proxy {}",
                url,
                response.status(),
                self.proxy
            ),
            Err(err) => warn!(
                "Direct request to {} failed: {}, retrying through proxy {}",
                url, err, self.proxy
            ),
        }

        match self.proxied.execute(fallback_request).await {
            Ok(response) => {
                info!("Proxy {} answered {} for {}", self.proxy, response.status(), url);
                Ok(response)
            }
            Err(err) => {
                self.sink.report(&format!(
                    "Failed to fetch {} with both direct and proxy connections: {}",
                    url, err
                ));
                Err(Error::Reqwest(err))
            }
        }
    }
}
