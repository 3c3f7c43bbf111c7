//! Deterministic cache key derivation
//!
//! A key has the form `{subject}_{kind}_{hash}`. The readable prefix is only
//! there for directory listings; uniqueness rests on the hash, which covers
//! kind, subject, every query parameter (sorted by name), source and market
//! class.

use crate::cache::types::{CacheKey, DataKind, MarketClass};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex characters kept from the digest
pub const HASH_LEN: usize = 12;

/// Parameter name folded into keys of entries vetoed by the size gate
pub const SKIPPED_PARAM: &str = "skipped";

/// Query parameters that disambiguate entries for the same subject and kind.
///
/// Stored sorted by name, so insertion order never reaches the key.
pub type QueryParams = BTreeMap<String, String>;

/// Builder for cache keys
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    kind: DataKind,
    subject: String,
    source: String,
    market: MarketClass,
    params: QueryParams,
}

impl CacheKeyBuilder {
    /// Start a key for `subject`; the market class is derived from it
    pub fn new(kind: DataKind, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        let market = MarketClass::classify(&subject);
        Self {
            kind,
            subject,
            source: String::new(),
            market,
            params: QueryParams::new(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add a parameter; a later value for the same name replaces the earlier one
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: &QueryParams) -> Self {
        self.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Mark the key as belonging to a metadata-only entry
    pub fn skipped(self) -> Self {
        self.param(SKIPPED_PARAM, "true")
    }

    pub fn build(self) -> CacheKey {
        derive_key(&self.kind, &self.subject, &self.source, self.market, &self.params)
    }
}

/// Derive the key for one logical cache identity
pub fn derive_key(
    kind: &DataKind,
    subject: &str,
    source: &str,
    market: MarketClass,
    params: &QueryParams,
) -> CacheKey {
    let mut canonical = format!("{}_{}", kind.label(), subject);
    for (name, value) in params {
        canonical.push_str(&format!("_{}_{}", name, value));
    }
    canonical.push_str(&format!("_source_{}_market_{}", source, market.label()));

    let digest = Sha256::digest(canonical.as_bytes());
    let hash = hex::encode(digest);

    format!(
        "{}_{}_{}",
        file_safe(subject),
        file_safe(kind.label()),
        &hash[..HASH_LEN]
    )
}

/// Replace characters that are unsafe in file names
fn file_safe(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
