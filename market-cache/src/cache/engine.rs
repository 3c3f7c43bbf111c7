//! Cache engine: the façade composing keys, partitions, metadata, freshness
//! policy and the size gate.
//!
//! All operations are synchronous, bounded sequences of local file
//! operations. Read-side storage problems degrade to cache misses; write
//! failures are returned to the caller, who can continue with the uncached
//! payload.

use crate::cache::{
    config::CacheConfig,
    gate::{ProviderRegistry, SizeGate, SizeGateStatus},
    invalidation::{InvalidationEvent, InvalidationReason},
    key::{CacheKeyBuilder, QueryParams},
    metadata::{MetadataRead, MetadataRecord, MetadataStore},
    partition::{partition_name, write_atomic, PartitionRouter},
    policy::{policy_key, PolicyTable},
    types::{CacheKey, CacheStats, DataKind, FileFormat, MarketClass, Payload, Table},
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Market-aware file cache for upstream data
///
/// Construct once at startup and share by reference (or `Arc`); the engine
/// holds no mutable state of its own.
#[derive(Debug, Clone)]
pub struct MarketDataCache {
    config: CacheConfig,
    router: PartitionRouter,
    metadata: MetadataStore,
    gate: SizeGate,
}

impl MarketDataCache {
    /// Create a cache whose size gate reads provider keys from the environment
    pub fn new(config: CacheConfig) -> Result<Self> {
        let gate = SizeGate::from_env(config.size_gate.clone());
        Self::build(config, gate)
    }

    /// Create a cache with a custom provider registry for the size gate
    pub fn with_providers(config: CacheConfig, providers: Arc<dyn ProviderRegistry>) -> Result<Self> {
        let gate = SizeGate::new(config.size_gate.clone(), providers);
        Self::build(config, gate)
    }

    fn build(config: CacheConfig, gate: SizeGate) -> Result<Self> {
        config.validate()?;

        let router = PartitionRouter::new(&config.root_dir);
        let metadata = MetadataStore::new(router.metadata_dir());

        info!(
            "Market data cache at {:?} (size gate: {})",
            config.root_dir,
            if config.size_gate.enabled { "on" } else { "off" }
        );

        Ok(Self {
            config,
            router,
            metadata,
            gate,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.router
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.config.policies
    }

    pub fn size_gate(&self) -> &SizeGate {
        &self.gate
    }

    /// Store `payload` and return its key.
    ///
    /// When the size gate vetoes the write only a `skipped` metadata record
    /// is stored, under a key distinct from the regular one.
    pub fn save(
        &self,
        kind: &DataKind,
        subject: &str,
        payload: &Payload,
        source: &str,
        params: &QueryParams,
    ) -> Result<CacheKey> {
        let text = payload.to_text()?;
        let content_length = text.chars().count();
        let market = MarketClass::classify(subject);
        let builder = CacheKeyBuilder::new(kind.clone(), subject)
            .source(source)
            .params(params);
        let record = MetadataRecord::new(subject, kind.clone(), source)
            .with_params(params.clone())
            .with_content_length(content_length);

        if self.gate.should_skip(&text, kind.label()) {
            let key = builder.skipped().build();
            self.metadata.write(&key, record.mark_skipped())?;
            warn!(
                "Skipped caching {} for {} ({} chars) -> {}",
                kind, subject, content_length, key
            );
            return Ok(key);
        }

        let key = builder.build();
        let format = payload.format();
        let path = self.router.payload_path(kind, market, &key, format);

        // Payload first: a crash in between leaves an orphan file, never a
        // record pointing at nothing.
        write_atomic(&path, text.as_bytes())?;
        self.metadata
            .write(&key, record.with_location(path, format))?;

        info!(
            "Cached {}: {} ({}) -> {}",
            self.config.policies.describe(market, kind),
            subject,
            source,
            key
        );
        Ok(key)
    }

    /// Read a payload back. Missing, skipped or unreadable entries are `None`.
    pub fn load(&self, key: &str) -> Option<Payload> {
        let record = match self.metadata.read(key) {
            MetadataRead::Found(record) => record,
            MetadataRead::NotFound => return None,
            MetadataRead::Corrupt(reason) => {
                debug!("Ignoring corrupt metadata for {}: {}", key, reason);
                return None;
            }
        };

        if record.skipped {
            debug!("Entry {} was skipped by the size gate", key);
            return None;
        }

        let (path, format) = match (record.file_path.as_deref(), record.file_format) {
            (Some(path), Some(format)) => (path, format),
            _ => return None,
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Cannot read payload for {} at {:?}: {}", key, path, e);
                return None;
            }
        };

        match format {
            FileFormat::Txt => Some(Payload::Text(content)),
            FileFormat::Csv => match Table::from_csv(&content) {
                Ok(table) => Some(Payload::Tabular(table)),
                Err(e) => {
                    debug!("Cannot decode CSV payload for {}: {}", key, e);
                    None
                }
            },
        }
    }

    /// Raw metadata lookup for `key`
    pub fn metadata(&self, key: &str) -> MetadataRead {
        self.metadata.read(key)
    }

    /// Whether `key` is still within its TTL
    pub fn is_fresh(&self, key: &str, explicit_ttl: Option<Duration>) -> bool {
        self.is_fresh_at(key, explicit_ttl, Utc::now())
    }

    fn is_fresh_at(&self, key: &str, explicit_ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(record) = self.metadata.read(key).found() else {
            return false;
        };
        self.record_is_fresh(&record, explicit_ttl, now)
    }

    fn record_is_fresh(
        &self,
        record: &MetadataRecord,
        explicit_ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> bool {
        let ttl = self.config.policies.resolve_ttl(record, explicit_ttl);
        PolicyTable::is_fresh_at(record, ttl, now)
    }

    /// Find a fresh entry for `subject` and `kind`.
    ///
    /// The exact key for the given source and parameters is tried first.
    /// Otherwise every record for the same subject, kind and market class
    /// (and source, when given) is considered, and the most recently cached
    /// fresh one wins. A skipped entry is returned only when no fresh entry
    /// with a payload matches.
    pub fn find(
        &self,
        kind: &DataKind,
        subject: &str,
        source: Option<&str>,
        params: &QueryParams,
        explicit_ttl: Option<Duration>,
    ) -> Option<CacheKey> {
        let now = Utc::now();
        let market = MarketClass::classify(subject);

        let exact = CacheKeyBuilder::new(kind.clone(), subject)
            .source(source.unwrap_or_default())
            .params(params)
            .build();
        if self.is_fresh_at(&exact, explicit_ttl, now) {
            debug!("Exact cache hit: {} -> {}", subject, exact);
            return Some(exact);
        }

        let best = self
            .metadata
            .scan_all()
            .filter(|(_, record)| {
                record.subject == subject
                    && &record.kind == kind
                    && record.market == market
                    && source.map_or(true, |s| record.source == s)
            })
            .filter(|(_, record)| self.record_is_fresh(record, explicit_ttl, now))
            // Entries with a payload outrank metadata-only ones
            .max_by(|(ka, a), (kb, b)| {
                (!a.skipped, a.cached_at, ka).cmp(&(!b.skipped, b.cached_at, kb))
            });

        match best {
            Some((key, _)) => {
                debug!("Fallback cache hit: {} -> {}", subject, key);
                Some(key)
            }
            None => {
                debug!(
                    "No fresh {} cache for {}",
                    self.config.policies.describe(market, kind),
                    subject
                );
                None
            }
        }
    }

    /// Delete one entry, payload first. `Ok(None)` if nothing was stored.
    pub fn invalidate(&self, key: &str) -> Result<Option<InvalidationEvent>> {
        let payload_removed = match self.metadata.read(key) {
            MetadataRead::Found(record) => remove_payload(record.file_path.as_deref())?,
            MetadataRead::NotFound | MetadataRead::Corrupt(_) => false,
        };
        let metadata_removed = self.metadata.remove(key)?;

        if !payload_removed && !metadata_removed {
            return Ok(None);
        }

        info!("Invalidated cache entry {}", key);
        Ok(Some(InvalidationEvent::new(
            InvalidationReason::Manual,
            vec![key.to_string()],
        )))
    }

    /// Remove every entry cached more than `max_age_days` ago.
    ///
    /// Entries that fail to delete are logged and counted, never fatal.
    pub fn evict_older_than(&self, max_age_days: u64) -> InvalidationEvent {
        let reason = InvalidationReason::Expired { max_age_days };
        let cutoff = i64::try_from(max_age_days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            debug!("Eviction cutoff of {} days predates any timestamp", max_age_days);
            return InvalidationEvent::new(reason, Vec::new());
        };

        let expired: Vec<(CacheKey, MetadataRecord)> = self
            .metadata
            .scan_all()
            .filter(|(_, record)| record.cached_at < cutoff)
            .collect();

        let (removed, failures) = self.remove_all(expired);

        info!(
            "Evicted {} cache entries older than {} days",
            removed.len(),
            max_age_days
        );
        InvalidationEvent::new(reason, removed).with_failures(failures)
    }

    /// Bring every partition back under its policy's `max_files`, oldest first
    pub fn trim_to_policy_limits(&self) -> Vec<InvalidationEvent> {
        let mut partitions: BTreeMap<(MarketClass, DataKind), Vec<(CacheKey, MetadataRecord)>> =
            BTreeMap::new();
        for (key, record) in self.metadata.scan_all() {
            partitions
                .entry((record.market, record.kind.clone()))
                .or_default()
                .push((key, record));
        }

        let mut events = Vec::new();
        for ((market, kind), mut entries) in partitions {
            let Some(policy) = self.config.policies.get(market, &kind) else {
                continue;
            };
            if entries.len() <= policy.max_files {
                continue;
            }

            entries.sort_by(|(_, a), (_, b)| a.cached_at.cmp(&b.cached_at));
            let excess = entries.len() - policy.max_files;
            let oldest: Vec<_> = entries.into_iter().take(excess).collect();

            let (removed, failures) = self.remove_all(oldest);
            let partition = policy_key(market, &kind);
            info!(
                "Trimmed {} entries from {} (limit {})",
                removed.len(),
                partition,
                policy.max_files
            );

            events.push(
                InvalidationEvent::new(
                    InvalidationReason::SizeLimit {
                        partition,
                        max_files: policy.max_files,
                    },
                    removed,
                )
                .with_failures(failures),
            );
        }

        events
    }

    /// Counts by kind, skipped entries and on-disk payload size
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for (_, record) in self.metadata.scan_all() {
            stats.total_entries += 1;
            stats.record_kind(&record.kind);

            let partition = partition_name(&record.kind, record.market)
                .unwrap_or_else(|| policy_key(record.market, &record.kind));
            *stats.partitions.entry(partition).or_insert(0) += 1;

            let size = if record.skipped {
                None
            } else {
                record
                    .file_path
                    .as_deref()
                    .and_then(|p| fs::metadata(p).ok())
                    .map(|m| m.len())
            };

            match size {
                Some(bytes) => stats.total_size_bytes += bytes,
                None => stats.skipped_count += 1,
            }
        }

        stats
    }

    pub fn gate_status(&self) -> SizeGateStatus {
        self.gate.status()
    }

    fn remove_all(&self, entries: Vec<(CacheKey, MetadataRecord)>) -> (Vec<CacheKey>, usize) {
        let mut removed = Vec::new();
        let mut failures = 0;

        for (key, record) in entries {
            match self.remove_entry(&key, &record) {
                Ok(()) => removed.push(key),
                Err(e) => {
                    warn!("Failed to remove cache entry {}: {}", key, e);
                    failures += 1;
                }
            }
        }

        (removed, failures)
    }

    fn remove_entry(&self, key: &str, record: &MetadataRecord) -> io::Result<()> {
        remove_payload(record.file_path.as_deref())?;
        self.metadata.remove(key)?;
        Ok(())
    }
}

/// Delete a payload file; a file that is already gone is not an error
fn remove_payload(path: Option<&Path>) -> io::Result<bool> {
    let Some(path) = path else {
        return Ok(false);
    };
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::gate::StaticProviders;
    use tempfile::TempDir;

    fn cache_with(tmp: &TempDir, config: CacheConfig, providers: &[&str]) -> MarketDataCache {
        let config = CacheConfig {
            root_dir: tmp.path().join("cache"),
            ..config
        };
        MarketDataCache::with_providers(
            config,
            Arc::new(StaticProviders::new(providers.iter().copied())),
        )
        .unwrap()
    }

    fn cache(tmp: &TempDir) -> MarketDataCache {
        cache_with(tmp, CacheConfig::default(), &[])
    }

    fn rewind(cache: &MarketDataCache, key: &str, by: chrono::Duration) {
        let mut record = cache.metadata(key).found().unwrap();
        record.cached_at = record.cached_at - by;
        cache.metadata_store().put(key, &record).unwrap();
    }

    fn no_params() -> QueryParams {
        QueryParams::new()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MarketDataCache>();
    }

    #[test]
    fn test_construction_does_no_io() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        assert!(!cache.config().root_dir.exists());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_save_and_load_text() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::News, "AAPL", &Payload::from("headline"), "X", &no_params())
            .unwrap();

        assert_eq!(cache.load(&key), Some(Payload::from("headline")));

        let record = cache.metadata(&key).found().unwrap();
        assert_eq!(record.content_length, 8);
        assert_eq!(record.file_format, Some(FileFormat::Txt));
        let path = record.file_path.unwrap();
        assert!(path.starts_with(tmp.path().join("cache").join("international_news")));
    }

    #[test]
    fn test_resave_overwrites() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let first = cache
            .save(&DataKind::News, "AAPL", &Payload::from("v1"), "X", &no_params())
            .unwrap();
        let second = cache
            .save(&DataKind::News, "AAPL", &Payload::from("v2"), "X", &no_params())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.load(&first), Some(Payload::from("v2")));
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[test]
    fn test_load_missing_payload_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::News, "AAPL", &Payload::from("x"), "X", &no_params())
            .unwrap();
        let path = cache.metadata(&key).found().unwrap().file_path.unwrap();
        fs::remove_file(path).unwrap();

        assert_eq!(cache.load(&key), None);
        assert_eq!(cache.load("never-saved"), None);
    }

    #[test]
    fn test_is_fresh_uses_policy_and_override() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::QuoteSeries, "600519", &Payload::from("x"), "X", &no_params())
            .unwrap();
        assert!(cache.is_fresh(&key, None));

        // domestic quotes: 1h
        rewind(&cache, &key, chrono::Duration::minutes(61));
        assert!(!cache.is_fresh(&key, None));
        assert!(cache.is_fresh(&key, Some(Duration::from_secs(2 * 3600))));

        assert!(!cache.is_fresh("never-saved", None));
    }

    #[test]
    fn test_corrupt_metadata_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::News, "AAPL", &Payload::from("x"), "X", &no_params())
            .unwrap();
        fs::write(cache.metadata_store().path(&key), "{").unwrap();

        assert!(!cache.is_fresh(&key, None));
        assert_eq!(cache.load(&key), None);
        assert_eq!(cache.find(&DataKind::News, "AAPL", Some("X"), &no_params(), None), None);

        // self-heals on next save
        cache
            .save(&DataKind::News, "AAPL", &Payload::from("y"), "X", &no_params())
            .unwrap();
        assert_eq!(cache.load(&key), Some(Payload::from("y")));
    }

    #[test]
    fn test_find_prefers_most_recent_fallback() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let older = cache
            .save(&DataKind::News, "AAPL", &Payload::from("a"), "A", &no_params())
            .unwrap();
        let newer = cache
            .save(&DataKind::News, "AAPL", &Payload::from("b"), "B", &no_params())
            .unwrap();
        rewind(&cache, &older, chrono::Duration::minutes(30));

        let found = cache.find(&DataKind::News, "AAPL", None, &no_params(), None);
        assert_eq!(found, Some(newer));

        let found = cache.find(&DataKind::News, "AAPL", Some("A"), &no_params(), None);
        assert_eq!(found, Some(older));
    }

    #[test]
    fn test_find_prefers_payload_over_newer_skipped_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_with(
            &tmp,
            CacheConfig::builder()
                .enable_size_gate(true)
                .max_content_length(100)
                .build(),
            &[],
        );

        let cached = cache
            .save(&DataKind::News, "AAPL", &Payload::from("ok"), "A", &no_params())
            .unwrap();
        let skipped = cache
            .save(&DataKind::News, "AAPL", &Payload::from("x".repeat(200)), "B", &no_params())
            .unwrap();
        rewind(&cache, &cached, chrono::Duration::minutes(5));
        assert!(cache.metadata(&skipped).found().unwrap().skipped);

        let found = cache.find(&DataKind::News, "AAPL", None, &no_params(), None);
        assert_eq!(found, Some(cached.clone()));
        assert_eq!(cache.load(&cached), Some(Payload::from("ok")));

        // Only the skipped entry left: still reported as known
        cache.invalidate(&cached).unwrap();
        let found = cache.find(&DataKind::News, "AAPL", None, &no_params(), None);
        assert_eq!(found, Some(skipped));
    }

    #[test]
    fn test_evict_with_out_of_range_age() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::News, "AAPL", &Payload::from("a"), "A", &no_params())
            .unwrap();

        for days in [100_000_000, u64::MAX] {
            let event = cache.evict_older_than(days);
            assert!(event.is_empty());
            assert_eq!(event.reason, InvalidationReason::Expired { max_age_days: days });
        }
        assert_eq!(cache.load(&key), Some(Payload::from("a")));
    }

    #[test]
    fn test_concurrent_saves_to_same_key() {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(cache(&tmp));
        let first = "a".repeat(256 * 1024);
        let second = "b".repeat(256 * 1024);

        for _ in 0..20 {
            let handles: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|text| {
                    let cache = Arc::clone(&cache);
                    std::thread::spawn(move || {
                        cache.save(&DataKind::News, "AAPL", &Payload::from(text), "X", &QueryParams::new())
                    })
                })
                .collect();

            let keys: Vec<CacheKey> = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect();
            assert_eq!(keys[0], keys[1]);

            let loaded = cache.load(&keys[0]).unwrap();
            let text = loaded.as_text().unwrap();
            assert!(text == first || text == second);
        }

        let dir = tmp.path().join("cache").join("international_news");
        assert_eq!(fs::read_dir(dir).unwrap().count(), 1);
    }

    #[test]
    fn test_find_ignores_other_subjects_and_kinds() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        cache
            .save(&DataKind::News, "AAPL", &Payload::from("a"), "A", &no_params())
            .unwrap();

        assert_eq!(cache.find(&DataKind::News, "MSFT", None, &no_params(), None), None);
        assert_eq!(cache.find(&DataKind::Fundamentals, "AAPL", None, &no_params(), None), None);
        assert_eq!(cache.find(&DataKind::News, "AAPL", Some("B"), &no_params(), None), None);
    }

    #[test]
    fn test_invalidate() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        let key = cache
            .save(&DataKind::News, "AAPL", &Payload::from("a"), "A", &no_params())
            .unwrap();
        let path = cache.metadata(&key).found().unwrap().file_path.unwrap();

        let event = cache.invalidate(&key).unwrap().unwrap();
        assert_eq!(event.keys, vec![key.clone()]);
        assert_eq!(event.reason, InvalidationReason::Manual);
        assert!(!path.exists());
        assert_eq!(cache.metadata(&key), MetadataRead::NotFound);

        assert!(cache.invalidate(&key).unwrap().is_none());
    }

    #[test]
    fn test_trim_to_policy_limits() {
        let tmp = TempDir::new().unwrap();
        let policies = PolicyTable::empty().with_policy(
            MarketClass::International,
            DataKind::News,
            crate::cache::policy::FreshnessPolicy::new(6, 2, "International news"),
        );
        let cache = cache_with(
            &tmp,
            CacheConfig::builder().policies(policies).build(),
            &[],
        );

        let mut keys = Vec::new();
        for (i, subject) in ["AAPL", "MSFT", "NVDA"].iter().enumerate() {
            let key = cache
                .save(&DataKind::News, subject, &Payload::from("n"), "X", &no_params())
                .unwrap();
            rewind(&cache, &key, chrono::Duration::minutes(10 * (3 - i as i64)));
            keys.push(key);
        }

        let events = cache.trim_to_policy_limits();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].keys, vec![keys[0].clone()]);
        assert_eq!(cache.stats().news_count, 2);

        assert!(cache.trim_to_policy_limits().is_empty());
    }

    #[test]
    fn test_custom_kind() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let kind = DataKind::Custom("options_chain".to_string());

        let key = cache
            .save(&kind, "AAPL", &Payload::from("calls"), "X", &no_params())
            .unwrap();
        let path = cache.metadata(&key).found().unwrap().file_path.unwrap();
        assert_eq!(path.parent().unwrap(), tmp.path().join("cache"));

        assert_eq!(cache.find(&kind, "AAPL", None, &no_params(), None), Some(key));
        assert_eq!(cache.stats().custom_count, 1);
    }
}
