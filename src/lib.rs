//! # proxy-fetch
//!
//! Proxy-aware fetching for scraping pipelines.
//!
//! This library discovers a small pool of working HTTP proxies, validates target
//! URLs with a direct HEAD probe and a proxy sweep on access denial, fetches
//! pages with a direct-then-proxy fallback, and runs remote API calls under a
//! hard timeout with advisory cancellation.

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod pool;
pub mod proxy;
pub mod report;
pub mod retry;
pub mod store;
pub mod task;
pub mod validator;
mod utils;

pub use config::{ConnectionConfig, PoolBuilderConfig, PoolBuilderConfigBuilder, ValidatorConfig};
pub use connection::Connection;
pub use error::{FetchError, NoProxyAvailable, PersistError, PipelineError, ProxyParseError, TaskError};
pub use logging::{init_logging, LoggingConfig};
pub use middleware::ProxyFallbackMiddleware;
pub use pipeline::{Completion, Pipeline, PipelineConfig};
pub use pool::{PoolBuilder, ProxyPool};
pub use proxy::ProxyAddress;
pub use report::{ChannelSink, FailureSink, LogSink};
pub use retry::{Backoff, RetryPolicy};
pub use store::{load_pool, save_pool};
pub use task::BoundedTaskRunner;
pub use tokio_util::sync::CancellationToken;
pub use validator::{UrlRecord, UrlValidator, Validation};
