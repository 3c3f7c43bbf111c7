//! Physical layout of the cache root
//!
//! ```text
//! <root>/
//!   domestic_quote_series/      international_quote_series/
//!   domestic_news/              international_news/
//!   domestic_fundamentals/      international_fundamentals/
//!   metadata/                   {key}_meta.json
//! ```
//!
//! Custom kinds are written directly under the root. Directories are
//! created on first write, never on construction.

use crate::cache::types::{DataKind, FileFormat, MarketClass};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the side directory holding metadata records
pub const METADATA_DIR: &str = "metadata";

/// Maps (kind, market class) to a directory under the cache root
#[derive(Debug, Clone)]
pub struct PartitionRouter {
    root: PathBuf,
}

impl PartitionRouter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for entries of `kind` in `market`
    pub fn route(&self, kind: &DataKind, market: MarketClass) -> PathBuf {
        match partition_name(kind, market) {
            Some(name) => self.root.join(name),
            None => self.root.clone(),
        }
    }

    /// Directory for `subject`, classifying it first
    pub fn route_subject(&self, kind: &DataKind, subject: &str) -> PathBuf {
        self.route(kind, MarketClass::classify(subject))
    }

    /// Full payload path for a key
    pub fn payload_path(
        &self,
        kind: &DataKind,
        market: MarketClass,
        key: &str,
        format: FileFormat,
    ) -> PathBuf {
        self.route(kind, market)
            .join(format!("{}.{}", key, format.extension()))
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Every leaf directory the router can hand out for built-in kinds
    pub fn partitions(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for kind in DataKind::BUILTIN {
            for market in MarketClass::ALL {
                dirs.push(self.route(&kind, market));
            }
        }
        dirs
    }
}

/// Leaf directory name, or `None` for kinds stored at the root
pub fn partition_name(kind: &DataKind, market: MarketClass) -> Option<String> {
    if kind.is_builtin() {
        Some(format!("{}_{}", market.label(), kind.label()))
    } else {
        None
    }
}

/// Create `dir` and its parents if missing
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Replace `path` with `contents` via a uniquely named sibling temp file and a rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_route_is_stable() {
        let router = PartitionRouter::new("/cache");

        for kind in DataKind::BUILTIN {
            for market in MarketClass::ALL {
                assert_eq!(router.route(&kind, market), router.route(&kind, market));
            }
        }

        assert_eq!(
            router.route(&DataKind::News, MarketClass::Domestic),
            PathBuf::from("/cache/domestic_news")
        );
        assert_eq!(
            router.route_subject(&DataKind::QuoteSeries, "AAPL"),
            PathBuf::from("/cache/international_quote_series")
        );
    }

    #[test]
    fn test_markets_never_share_a_partition() {
        let router = PartitionRouter::new("/cache");

        for kind in DataKind::BUILTIN {
            assert_ne!(
                router.route_subject(&kind, "600519"),
                router.route_subject(&kind, "AAPL")
            );
        }

        let unique: HashSet<PathBuf> = router.partitions().into_iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(!unique.contains(&router.metadata_dir()));
    }

    #[test]
    fn test_custom_kind_routes_to_root() {
        let router = PartitionRouter::new("/cache");
        let kind = DataKind::Custom("options_chain".to_string());

        assert_eq!(router.route(&kind, MarketClass::Domestic), PathBuf::from("/cache"));
        assert_eq!(
            router.payload_path(&kind, MarketClass::International, "k", FileFormat::Txt),
            PathBuf::from("/cache/k.txt")
        );
    }

    #[test]
    fn test_routing_does_not_create_directories() {
        let tmp = TempDir::new().unwrap();
        let router = PartitionRouter::new(tmp.path().join("cache"));

        let dir = router.route(&DataKind::News, MarketClass::Domestic);
        assert!(!dir.exists());

        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        // idempotent
        ensure_dir(&dir).unwrap();
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("entry.txt");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_from_many_threads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.txt");

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let body = vec![b'a' + i; 64 * 1024];
                    for _ in 0..10 {
                        write_atomic(&path, &body)?;
                    }
                    Ok::<_, io::Error>(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let content = fs::read(&path).unwrap();
        assert_eq!(content.len(), 64 * 1024);
        assert!(content.iter().all(|b| *b == content[0]));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
