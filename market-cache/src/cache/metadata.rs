//! Side-car metadata records
//!
//! Every entry owns one JSON record at `metadata/{key}_meta.json`. The
//! record is the source of truth for freshness and for locating the
//! payload; a record may exist without a payload (skipped entries) but a
//! payload is never written without one.

use crate::cache::key::QueryParams;
use crate::cache::partition::write_atomic;
use crate::cache::types::{CacheKey, DataKind, FileFormat, MarketClass};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name suffix of metadata records
pub const METADATA_SUFFIX: &str = "_meta.json";

/// Provenance of one cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub subject: String,

    pub kind: DataKind,

    #[serde(rename = "market_type")]
    pub market: MarketClass,

    pub source: String,

    /// Payload location; `None` for skipped entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format: Option<FileFormat>,

    /// Characters in the serialized payload at write time
    pub content_length: usize,

    pub cached_at: DateTime<Utc>,

    /// Size gate vetoed the payload write
    #[serde(default)]
    pub skipped: bool,

    /// Disambiguating query parameters (date range etc.)
    #[serde(default, skip_serializing_if = "QueryParams::is_empty")]
    pub params: QueryParams,
}

impl MetadataRecord {
    /// New record for `subject`; market class is derived, `cached_at` is now
    pub fn new(subject: impl Into<String>, kind: DataKind, source: impl Into<String>) -> Self {
        let subject = subject.into();
        let market = MarketClass::classify(&subject);
        Self {
            subject,
            kind,
            market,
            source: source.into(),
            file_path: None,
            file_format: None,
            content_length: 0,
            cached_at: Utc::now(),
            skipped: false,
            params: QueryParams::new(),
        }
    }

    pub fn with_location(mut self, path: PathBuf, format: FileFormat) -> Self {
        self.file_path = Some(path);
        self.file_format = Some(format);
        self
    }

    pub fn with_content_length(mut self, length: usize) -> Self {
        self.content_length = length;
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn mark_skipped(mut self) -> Self {
        self.skipped = true;
        self.file_path = None;
        self.file_format = None;
        self
    }

    /// Age of the entry relative to `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.cached_at
    }
}

/// Outcome of reading one record
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataRead {
    Found(MetadataRecord),
    NotFound,
    /// Present but unreadable or unparsable
    Corrupt(String),
}

impl MetadataRead {
    /// Collapse to an option; corrupt records count as absent
    pub fn found(self) -> Option<MetadataRecord> {
        match self {
            MetadataRead::Found(record) => Some(record),
            MetadataRead::NotFound | MetadataRead::Corrupt(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, MetadataRead::Found(_))
    }
}

/// Directory of metadata records, one file per key
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", key, METADATA_SUFFIX))
    }

    /// Stamp `cached_at` with the current time and persist, replacing any prior record
    pub fn write(&self, key: &str, mut record: MetadataRecord) -> Result<MetadataRecord> {
        record.cached_at = Utc::now();
        self.put(key, &record)?;
        Ok(record)
    }

    /// Persist `record` exactly as given, `cached_at` included
    pub fn put(&self, key: &str, record: &MetadataRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path(key), &json)?;
        debug!("Wrote metadata for {}", key);
        Ok(())
    }

    pub fn read(&self, key: &str) -> MetadataRead {
        read_record(&self.path(key))
    }

    /// Delete the record for `key`; `Ok(false)` if there was none
    pub fn remove(&self, key: &str) -> io::Result<bool> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lazily iterate every readable record. Each call re-reads the directory.
    pub fn scan_all(&self) -> MetadataScan {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => Some(entries),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Cannot list metadata directory {:?}: {}", self.dir, e);
                }
                None
            }
        };
        MetadataScan { entries }
    }
}

/// Iterator over `(key, record)` pairs; unreadable files are skipped
pub struct MetadataScan {
    entries: Option<fs::ReadDir>,
}

impl Iterator for MetadataScan {
    type Item = (CacheKey, MetadataRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            let Some(key) = key_from_path(&path) else { continue };

            match read_record(&path) {
                MetadataRead::Found(record) => return Some((key, record)),
                MetadataRead::Corrupt(reason) => {
                    debug!("Skipping unreadable metadata {:?}: {}", path, reason);
                }
                MetadataRead::NotFound => {}
            }
        }
        None
    }
}

/// Recover the cache key from a record's file name
pub fn key_from_path(path: &Path) -> Option<CacheKey> {
    let name = path.file_name()?.to_str()?;
    let key = name.strip_suffix(METADATA_SUFFIX)?;
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn read_record(path: &Path) -> MetadataRead {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return MetadataRead::NotFound,
        Err(e) => return MetadataRead::Corrupt(e.to_string()),
    };

    match serde_json::from_str(&content) {
        Ok(record) => MetadataRead::Found(record),
        Err(e) => MetadataRead::Corrupt(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MetadataStore) {
        let tmp = TempDir::new().unwrap();
        let store = MetadataStore::new(tmp.path().join("metadata"));
        (tmp, store)
    }

    #[test]
    fn test_write_and_read() {
        let (_tmp, store) = store();
        let record = MetadataRecord::new("AAPL", DataKind::News, "provider-A")
            .with_location(PathBuf::from("/cache/international_news/k.txt"), FileFormat::Txt)
            .with_content_length(42);

        let written = store.write("k", record).unwrap();
        assert!(store.path("k").exists());

        match store.read("k") {
            MetadataRead::Found(loaded) => {
                assert_eq!(loaded, written);
                assert_eq!(loaded.market, MarketClass::International);
                assert_eq!(loaded.content_length, 42);
                assert!(!loaded.skipped);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_write_stamps_cached_at() {
        let (_tmp, store) = store();
        let mut record = MetadataRecord::new("600519", DataKind::Fundamentals, "feed-A");
        record.cached_at = Utc::now() - chrono::Duration::days(3);

        let written = store.write("k", record).unwrap();
        assert!(Utc::now() - written.cached_at < chrono::Duration::seconds(5));
    }

    #[test]
    fn test_put_preserves_cached_at() {
        let (_tmp, store) = store();
        let mut record = MetadataRecord::new("600519", DataKind::Fundamentals, "feed-A");
        record.cached_at = Utc::now() - chrono::Duration::days(3);

        store.put("k", &record).unwrap();
        assert_eq!(store.read("k").found().unwrap().cached_at, record.cached_at);
    }

    #[test]
    fn test_missing_and_corrupt_records() {
        let (_tmp, store) = store();
        assert_eq!(store.read("absent"), MetadataRead::NotFound);

        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path("broken"), "{ not json").unwrap();
        assert!(matches!(store.read("broken"), MetadataRead::Corrupt(_)));
        assert!(store.read("broken").found().is_none());
    }

    #[test]
    fn test_record_file_layout() {
        let (_tmp, store) = store();
        let record = MetadataRecord::new("600519", DataKind::QuoteSeries, "feed-A")
            .with_params(QueryParams::from([("start_date".to_string(), "2024-01-01".to_string())]));
        store.write("k", record).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path("k")).unwrap()).unwrap();
        assert_eq!(raw["subject"], "600519");
        assert_eq!(raw["kind"], "quote_series");
        assert_eq!(raw["market_type"], "domestic");
        assert_eq!(raw["source"], "feed-A");
        assert_eq!(raw["params"]["start_date"], "2024-01-01");
        assert!(raw.get("file_path").is_none());
    }

    #[test]
    fn test_scan_skips_unreadable_files() {
        let (_tmp, store) = store();
        store
            .write("a", MetadataRecord::new("AAPL", DataKind::News, "X"))
            .unwrap();
        store
            .write("b", MetadataRecord::new("MSFT", DataKind::News, "X"))
            .unwrap();
        fs::write(store.path("c"), "garbage").unwrap();
        fs::write(store.dir().join("notes.txt"), "unrelated").unwrap();

        let mut keys: Vec<String> = store.scan_all().map(|(key, _)| key).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        // restartable
        assert_eq!(store.scan_all().count(), 2);
    }

    #[test]
    fn test_scan_missing_directory() {
        let (_tmp, store) = store();
        assert_eq!(store.scan_all().count(), 0);
    }

    #[test]
    fn test_remove() {
        let (_tmp, store) = store();
        store
            .write("k", MetadataRecord::new("AAPL", DataKind::News, "X"))
            .unwrap();

        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert_eq!(store.read("k"), MetadataRead::NotFound);
    }

    #[test]
    fn test_key_from_path() {
        assert_eq!(
            key_from_path(Path::new("/m/AAPL_news_0123456789ab_meta.json")),
            Some("AAPL_news_0123456789ab".to_string())
        );
        assert_eq!(key_from_path(Path::new("/m/_meta.json")), None);
        assert_eq!(key_from_path(Path::new("/m/AAPL.txt")), None);
    }
}
