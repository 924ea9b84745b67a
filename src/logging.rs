//! Logger setup for binaries built on this crate.

use chrono::Local;
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set.
    pub level: LevelFilter,
    /// Directory for a persistent `scraper_<timestamp>.log`; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            log_dir: None,
        }
    }
}

/// Writes every record to stderr and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Install the global logger. Returns the path of the log file, if one was opened.
///
/// Fails if the log file cannot be created or a logger is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<PathBuf>> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level).parse_default_env();

    let log_path = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("scraper_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
            Some(path)
        }
        None => None,
    };

    builder.try_init()?;
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        assert!(init_logging(&LoggingConfig::default()).is_err());
    }
}
