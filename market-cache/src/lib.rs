//! # Market Cache (market-cache)
//!
//! A file-backed cache for market data fetched from rate-limited providers.
//!
//! ## Features
//!
//! - Deterministic keys derived from kind, subject, query parameters and source
//! - Separate partitions per market class and data kind
//! - Freshness from per-partition TTLs recorded in side-car metadata
//! - Optional size gate suppressing payloads too long for downstream LLMs
//! - Synchronous, local-filesystem only; no background tasks
//!
//! ## Saving and Finding
//!
//! ```no_run
//! use market_cache::{CacheConfig, DataKind, MarketDataCache, Payload, QueryParams, Table};
//!
//! fn main() -> market_cache::Result<()> {
//!     let cache = MarketDataCache::new(CacheConfig::from_env()?)?;
//!
//!     let quotes = Table::new(["date", "close"]).with_row(["2024-01-02", "185.64"]);
//!     let mut params = QueryParams::new();
//!     params.insert("start_date".to_string(), "2024-01-01".to_string());
//!
//!     cache.save(&DataKind::QuoteSeries, "AAPL", &Payload::from(quotes), "provider-A", &params)?;
//!
//!     if let Some(key) = cache.find(&DataKind::QuoteSeries, "AAPL", None, &params, None) {
//!         println!("fresh entry: {}", key);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Maintenance
//!
//! ```no_run
//! use market_cache::{CacheConfig, MarketDataCache};
//!
//! fn main() -> market_cache::Result<()> {
//!     let cache = MarketDataCache::new(CacheConfig::default())?;
//!
//!     let evicted = cache.evict_older_than(7);
//!     println!("evicted {} entries", evicted.count());
//!
//!     for event in cache.trim_to_policy_limits() {
//!         println!("{}: {} removed", event.reason, event.count());
//!     }
//!
//!     println!("{}", cache.stats());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheKey, CacheKeyBuilder, CacheStats, DataKind,
    FileFormat, FreshnessPolicy, InvalidationEvent, InvalidationReason, MarketClass,
    MarketDataCache, MetadataRead, MetadataRecord, Payload, PolicyTable, QueryParams,
    SizeGateStatus, Table,
};
pub use error::{CacheError, Result};
