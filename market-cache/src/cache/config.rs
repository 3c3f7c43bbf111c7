//! Configuration for the cache system

use crate::cache::gate::SizeGateConfig;
use crate::cache::policy::PolicyTable;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the cache root
pub const ENV_CACHE_DIR: &str = "MARKET_CACHE_DIR";

/// Environment variable enabling the size gate (`true`/`false`)
pub const ENV_ENABLE_LENGTH_CHECK: &str = "ENABLE_CACHE_LENGTH_CHECK";

/// Environment variable holding the size gate threshold in characters
pub const ENV_MAX_CONTENT_LENGTH: &str = "MAX_CACHE_CONTENT_LENGTH";

/// Default cache root, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "data_cache";

/// Configuration for the market data cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding partitions and the metadata directory
    pub root_dir: PathBuf,

    /// Oversize payload suppression
    pub size_gate: SizeGateConfig,

    /// Per-partition TTLs and soft limits
    pub policies: PolicyTable,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            size_gate: SizeGateConfig::default(),
            policies: PolicyTable::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Default configuration rooted at `root`
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root.into(),
            ..Default::default()
        }
    }

    /// Read `MARKET_CACHE_DIR`, `ENABLE_CACHE_LENGTH_CHECK` and `MAX_CACHE_CONTENT_LENGTH`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`CacheConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.trim().is_empty()) {
            config.root_dir = PathBuf::from(dir.trim());
        }

        if let Some(flag) = lookup(ENV_ENABLE_LENGTH_CHECK) {
            config.size_gate.enabled = flag.trim().eq_ignore_ascii_case("true");
        }

        if let Some(max) = lookup(ENV_MAX_CONTENT_LENGTH) {
            config.size_gate.max_content_length = max.trim().parse().map_err(|_| {
                CacheError::Config(format!(
                    "{} must be a non-negative integer, got {:?}",
                    ENV_MAX_CONTENT_LENGTH, max
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(CacheError::Config("root_dir must not be empty".to_string()));
        }

        if self.size_gate.enabled && self.size_gate.max_content_length == 0 {
            return Err(CacheError::Config(
                "max_content_length must be greater than 0 when the size gate is enabled"
                    .to_string(),
            ));
        }

        if let Some((key, _)) = self.policies.iter().find(|(_, p)| p.ttl_hours == 0) {
            return Err(CacheError::Config(format!(
                "ttl_hours for {} must be greater than 0",
                key
            )));
        }

        Ok(())
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    root_dir: Option<PathBuf>,
    enable_size_gate: Option<bool>,
    max_content_length: Option<usize>,
    long_context_providers: Option<Vec<String>>,
    policies: Option<PolicyTable>,
}

impl CacheConfigBuilder {
    /// Set the cache root directory
    pub fn root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root.into());
        self
    }

    /// Enable or disable the size gate
    pub fn enable_size_gate(mut self, enable: bool) -> Self {
        self.enable_size_gate = Some(enable);
        self
    }

    /// Set the size gate threshold in characters
    pub fn max_content_length(mut self, max: usize) -> Self {
        self.max_content_length = Some(max);
        self
    }

    /// Replace the set of long-context capable provider names
    pub fn long_context_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.long_context_providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the freshness policy table
    pub fn policies(mut self, policies: PolicyTable) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            root_dir: self.root_dir.unwrap_or(defaults.root_dir),
            size_gate: SizeGateConfig {
                enabled: self.enable_size_gate.unwrap_or(defaults.size_gate.enabled),
                max_content_length: self
                    .max_content_length
                    .unwrap_or(defaults.size_gate.max_content_length),
                long_context_providers: self
                    .long_context_providers
                    .unwrap_or(defaults.size_gate.long_context_providers),
            },
            policies: self.policies.unwrap_or(defaults.policies),
        }
    }
}
