//! Proxy address representation.

use crate::error::ProxyParseError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// A verified-or-candidate proxy, always stored as `scheme://host:port`.
///
/// Bare `host:port` input is treated as an HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAddress(String);

impl ProxyAddress {
    /// Parse a proxy list entry such as `1.2.3.4:8080` or `socks5://1.2.3.4:1080`.
    pub fn parse(input: &str) -> Result<Self, ProxyParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ProxyParseError::Empty);
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&candidate)
            .map_err(|e| ProxyParseError::Invalid(trimmed.to_string(), e.to_string()))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(ProxyParseError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ProxyParseError::Invalid(trimmed.to_string(), "missing host".into()))?;
        // `Url` hides the port when it equals the scheme default, so look at the raw text.
        let port = url
            .port_or_known_default()
            .filter(|_| has_explicit_port(&candidate))
            .ok_or_else(|| ProxyParseError::MissingPort(trimmed.to_string()))?;

        let credentials = match (url.username(), url.password()) {
            ("", _) => String::new(),
            (user, Some(password)) => format!("{}:{}@", user, password),
            (user, None) => format!("{}@", user),
        };

        Ok(Self(format!("{}://{}{}:{}", url.scheme(), credentials, host, port)))
    }

    /// The normalised `scheme://host:port` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to a `reqwest::Proxy` that intercepts both http and https traffic.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(&self.0)
    }
}

fn has_explicit_port(candidate: &str) -> bool {
    let authority = candidate
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(candidate);
    let authority = authority.split(['/', '?', '#']).next().unwrap_or("");
    match authority.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProxyAddress {
    type Err = ProxyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProxyAddress {
    type Error = ProxyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProxyAddress> for String {
    fn from(value: ProxyAddress) -> Self {
        value.0
    }
}
