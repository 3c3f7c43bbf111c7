//! # Market-Aware File Cache
//!
//! Persists upstream market data (quote history, news, fundamentals) on the
//! local filesystem so repeated requests for the same subject and query do
//! not hit rate-limited providers again.
//!
//! ## Features
//!
//! - **Deterministic Keys**: Same request, same key, across processes
//! - **Market Partitioning**: Domestic and international data never share a directory
//! - **Per-Partition TTLs**: Freshness decided from side-car metadata records
//! - **Size Gate**: Optionally skip payloads too long for configured LLM providers
//! - **Maintenance**: Age-based eviction, policy-limit trimming and statistics
//!
//! ## Layout
//!
//! - [`key`]: Key derivation from kind, subject, parameters, source and market
//! - [`partition`]: Directory routing and atomic file writes
//! - [`metadata`]: One JSON record per entry
//! - [`policy`]: TTL and soft-limit table
//! - [`gate`]: Oversize payload suppression
//! - [`engine`]: The façade tying it together
//!
//! ## Example
//!
//! ```no_run
//! use market_cache::cache::{CacheConfig, DataKind, MarketDataCache, Payload, QueryParams};
//!
//! # fn example() -> market_cache::Result<()> {
//! let cache = MarketDataCache::new(CacheConfig::at("data_cache"))?;
//!
//! let key = cache.save(
//!     &DataKind::Fundamentals,
//!     "600519",
//!     &Payload::from("EPS: 1.23"),
//!     "feed-A",
//!     &QueryParams::new(),
//! )?;
//!
//! if let Some(payload) = cache.load(&key) {
//!     println!("Cache hit: {:?}", payload.as_text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod gate;
pub mod invalidation;
pub mod key;
pub mod metadata;
pub mod partition;
pub mod policy;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use engine::MarketDataCache;
pub use gate::{EnvProviders, ProviderRegistry, SizeGate, SizeGateConfig, SizeGateStatus, StaticProviders};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use key::{derive_key, CacheKeyBuilder, QueryParams};
pub use metadata::{MetadataRead, MetadataRecord, MetadataStore};
pub use partition::PartitionRouter;
pub use policy::{FreshnessPolicy, PolicyTable};
pub use types::{CacheKey, CacheStats, DataKind, FileFormat, MarketClass, Payload, Table};
