//! Freshness policy table
//!
//! Per-(market class, kind) time-to-live and soft size limits. Domestic
//! quotes go stale fastest; international data tolerates longer TTLs
//! because it is queried less often and providers rate-limit harder.

use crate::cache::metadata::MetadataRecord;
use crate::cache::types::{DataKind, MarketClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// TTL used when no policy matches
pub const DEFAULT_TTL_HOURS: u64 = 24;

/// Freshness rules for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    pub ttl_hours: u64,

    /// Soft cap on records in the partition, enforced only by explicit trimming
    pub max_files: usize,

    pub description: String,
}

impl FreshnessPolicy {
    pub fn new(ttl_hours: u64, max_files: usize, description: impl Into<String>) -> Self {
        Self {
            ttl_hours,
            max_files,
            description: description.into(),
        }
    }

    pub fn ttl(&self) -> Duration {
        hours(self.ttl_hours)
    }
}

/// Lookup from `{market}_{kind}` to a [`FreshnessPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    policies: BTreeMap<String, FreshnessPolicy>,
    default_ttl_hours: u64,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::empty()
            .with_policy(
                MarketClass::International,
                DataKind::QuoteSeries,
                FreshnessPolicy::new(2, 1000, "International quote history"),
            )
            .with_policy(
                MarketClass::Domestic,
                DataKind::QuoteSeries,
                FreshnessPolicy::new(1, 1000, "Domestic quote history"),
            )
            .with_policy(
                MarketClass::International,
                DataKind::News,
                FreshnessPolicy::new(6, 500, "International news"),
            )
            .with_policy(
                MarketClass::Domestic,
                DataKind::News,
                FreshnessPolicy::new(4, 500, "Domestic news"),
            )
            .with_policy(
                MarketClass::International,
                DataKind::Fundamentals,
                FreshnessPolicy::new(24, 200, "International fundamentals"),
            )
            .with_policy(
                MarketClass::Domestic,
                DataKind::Fundamentals,
                FreshnessPolicy::new(12, 200, "Domestic fundamentals"),
            )
    }
}

impl PolicyTable {
    /// A table with no policies; everything falls back to the default TTL
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
            default_ttl_hours: DEFAULT_TTL_HOURS,
        }
    }

    pub fn with_policy(mut self, market: MarketClass, kind: DataKind, policy: FreshnessPolicy) -> Self {
        self.policies.insert(policy_key(market, &kind), policy);
        self
    }

    pub fn with_default_ttl_hours(mut self, ttl_hours: u64) -> Self {
        self.default_ttl_hours = ttl_hours;
        self
    }

    pub fn get(&self, market: MarketClass, kind: &DataKind) -> Option<&FreshnessPolicy> {
        self.policies.get(&policy_key(market, kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FreshnessPolicy)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn default_ttl(&self) -> Duration {
        hours(self.default_ttl_hours)
    }

    /// Table TTL for a partition, or the default
    pub fn ttl(&self, market: MarketClass, kind: &DataKind) -> Duration {
        self.get(market, kind)
            .map(FreshnessPolicy::ttl)
            .unwrap_or_else(|| self.default_ttl())
    }

    /// Human-readable name of a partition, falling back to the kind label
    pub fn describe(&self, market: MarketClass, kind: &DataKind) -> String {
        self.get(market, kind)
            .map(|p| p.description.clone())
            .unwrap_or_else(|| format!("{} {}", market, kind))
    }

    /// Explicit override first, then the record's own partition policy
    pub fn resolve_ttl(&self, record: &MetadataRecord, explicit: Option<Duration>) -> Duration {
        explicit.unwrap_or_else(|| self.ttl(record.market, &record.kind))
    }

    /// Fresh iff `now - cached_at < ttl`
    pub fn is_fresh_at(record: &MetadataRecord, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            // Larger than chrono can represent: never expires
            Err(_) => return true,
        };
        record.age_at(now) < ttl
    }

    /// Time left before `record` goes stale, if any
    pub fn remaining_at(record: &MetadataRecord, ttl: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        (ttl - record.age_at(now)).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Table key for a partition
pub fn policy_key(market: MarketClass, kind: &DataKind) -> String {
    format!("{}_{}", market.label(), kind.label())
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}
