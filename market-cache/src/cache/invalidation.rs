//! Cache invalidation events
//!
//! Entries leave the cache in three ways:
//! - Age-based eviction (`evict_older_than`)
//! - Policy-limit trimming when a partition exceeds its `max_files`
//! - Explicit deletion by key

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Older than the eviction cutoff
    Expired { max_age_days: u64 },

    /// Manual invalidation by key
    Manual,

    /// Partition held more records than its policy allows
    SizeLimit { partition: String, max_files: usize },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired { max_age_days } => {
                write!(f, "older than {} days", max_age_days)
            }
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::SizeLimit {
                partition,
                max_files,
            } => write!(f, "partition {} over limit of {} files", partition, max_files),
        }
    }
}

/// Event for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were invalidated
    pub keys: Vec<CacheKey>,

    /// Entries that could not be removed
    pub failures: usize,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, keys: Vec<CacheKey>) -> Self {
        Self {
            reason,
            timestamp: Utc::now(),
            keys,
            failures: 0,
        }
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    /// Number of entries removed
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
