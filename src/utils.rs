//! Utility functions for fetching proxy feeds.

use crate::error::FetchError;
use crate::proxy::ProxyAddress;

use log::debug;
use reqwest::Client;
use std::time::Duration;

/// Fetch and parse a list of proxies from a URL or file path.
pub(crate) async fn fetch_proxies_from_source(
    client: &Client,
    source: &str,
    timeout: Duration,
) -> Result<Vec<ProxyAddress>, FetchError> {
    if source.starts_with("http") {
        let response = client
            .get(source)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(source, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: source.to_string(),
                status,
            });
        }
        let content = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(source, e))?;
        Ok(parse_proxy_list(&content))
    } else {
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| FetchError::File {
                path: source.to_string(),
                source: e,
            })?;
        Ok(parse_proxy_list(&content))
    }
}

/// Parse newline-delimited proxy addresses, skipping blanks, comments and junk.
pub(crate) fn parse_proxy_list(content: &str) -> Vec<ProxyAddress> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && line.contains(':'))
        .filter_map(|line| match ProxyAddress::parse(line) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                debug!("Ignoring proxy list line {:?}: {}", line, e);
                None
            }
        })
        .collect()
}
