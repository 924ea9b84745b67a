//! Validate URLs given on the command line, then fetch the survivors.

use proxy_fetch::store::DEFAULT_POOL_FILE;
use proxy_fetch::{
    init_logging, load_pool, ChannelSink, Connection, ConnectionConfig, LoggingConfig, UrlValidator,
    ValidatorConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_file = init_logging(&LoggingConfig {
        log_dir: Some(PathBuf::from("logs")),
        ..LoggingConfig::default()
    })?;
    if let Some(path) = log_file {
        println!("Logging to {}", path.display());
    }

    let urls: Vec<String> = std::env::args()
        .skip(1)
        .flat_map(|arg| arg.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
        .collect();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink::new(tx));
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("Error: {}", message);
        }
    });

    let pool = load_pool(Path::new(DEFAULT_POOL_FILE), 5, sink.as_ref());
    let connection = Arc::new(Connection::new(ConnectionConfig::default())?.with_sink(sink.clone()));
    let mut validator = UrlValidator::new(Arc::clone(&connection), pool, ValidatorConfig::default())
        .with_sink(sink.clone());

    let valid = validator.validate_urls(urls).await;
    println!("Valid URLs: {:?}", valid);

    for url in &valid {
        if let Ok(response) = connection.fetch_with_fallback(url).await {
            let body = response.text().await.unwrap_or_default();
            println!("{}: {} bytes", url, body.len());
        }
    }

    drop(validator);
    drop(connection);
    drop(sink);
    printer.await?;
    Ok(())
}
