//! Persisted proxy document.
//!
//! The working pool is stored as `{"proxies": ["http://host:port", ...]}` and
//! rewritten as a whole on every save.

use crate::error::PersistError;
use crate::pool::ProxyPool;
use crate::proxy::ProxyAddress;
use crate::report::FailureSink;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Default location of the proxy document.
pub const DEFAULT_POOL_FILE: &str = "proxy.json";

/// On-disk shape of the pool.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProxyDocument {
    #[serde(default)]
    pub proxies: Vec<String>,
}

/// Write the pool to `path`, replacing any previous document atomically.
pub fn save_pool(path: &Path, pool: &ProxyPool) -> Result<(), PersistError> {
    let document = ProxyDocument {
        proxies: pool.iter().map(|p| p.to_string()).collect(),
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut tmp, PrettyFormatter::with_indent(b"    "));
        document.serialize(&mut serializer)?;
    }
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    info!("Proxies saved to '{}' successfully", path.display());
    Ok(())
}

/// Read the pool from `path`, keeping at most `cap` valid entries.
pub fn try_load_pool(path: &Path, cap: usize) -> Result<ProxyPool, PersistError> {
    let content = std::fs::read_to_string(path)?;
    let document: ProxyDocument = serde_json::from_str(&content)?;

    let mut pool = ProxyPool::with_capacity(cap);
    for entry in &document.proxies {
        match ProxyAddress::parse(entry) {
            Ok(proxy) => {
                if !pool.push(proxy) && pool.is_full() {
                    warn!("Proxy document holds more than {} proxies, ignoring the rest", cap);
                    break;
                }
            }
            Err(e) => warn!("Skipping proxy entry {:?}: {}", entry, e),
        }
    }
    Ok(pool)
}

/// Read the pool from `path`; an unreadable or corrupt document yields an empty pool.
pub fn load_pool(path: &Path, cap: usize, sink: &dyn FailureSink) -> ProxyPool {
    match try_load_pool(path, cap) {
        Ok(pool) => {
            info!("Loaded {} proxies from '{}'", pool.len(), path.display());
            pool
        }
        Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            sink.report(&format!("Proxy file '{}' not found", path.display()));
            ProxyPool::with_capacity(cap)
        }
        Err(e) => {
            sink.report(&format!("Error reading proxy file '{}': {}", path.display(), e));
            ProxyPool::with_capacity(cap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogSink;
    use tempfile::tempdir;

    fn pool_of(entries: &[&str], cap: usize) -> ProxyPool {
        ProxyPool::from_addresses(entries.iter().map(|e| ProxyAddress::parse(e).unwrap()), cap)
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        let pool = pool_of(&["1.2.3.4:8080", "socks5://5.6.7.8:1080"], 5);

        save_pool(&path, &pool).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"proxies\""));
        assert!(raw.contains("    \"http://1.2.3.4:8080\""));

        let loaded = load_pool(&path, 5, &LogSink);
        assert_eq!(loaded, pool);
    }

    #[test]
    fn save_overwrites_previous_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        save_pool(&path, &pool_of(&["1.1.1.1:1", "2.2.2.2:2"], 5)).unwrap();
        save_pool(&path, &pool_of(&["3.3.3.3:3"], 5)).unwrap();

        let loaded = try_load_pool(&path, 5).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.iter().next().unwrap().as_str(), "http://3.3.3.3:3");
    }

    #[test]
    fn missing_or_corrupt_document_is_empty_pool() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(load_pool(&missing, 5, &LogSink).is_empty());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ proxies: [").unwrap();
        assert!(matches!(try_load_pool(&corrupt, 5), Err(PersistError::Json(_))));
        assert!(load_pool(&corrupt, 5, &LogSink).is_empty());
    }

    #[test]
    fn load_skips_bad_entries_and_respects_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        std::fs::write(
            &path,
            r#"{"proxies": ["nonsense", "1.1.1.1:1", "1.1.1.1:1", "2.2.2.2:2", "3.3.3.3:3"]}"#,
        )
        .unwrap();

        let pool = try_load_pool(&path, 2).unwrap();
        let loaded: Vec<&str> = pool.iter().map(|p| p.as_str()).collect();
        assert_eq!(loaded, vec!["http://1.1.1.1:1", "http://2.2.2.2:2"]);
    }

    #[test]
    fn document_without_proxies_key_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(try_load_pool(&path, 5).unwrap().is_empty());
    }
}
