//! Size gate for oversize payloads
//!
//! Caching a payload no downstream consumer can digest wastes disk and
//! invites truncation later. When at least one long-context provider is
//! configured the payload is cached anyway, since skipping would only force
//! another upstream fetch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default threshold in characters
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 50_000;

/// Providers that can consume long content out of the box
pub const DEFAULT_LONG_CONTEXT_PROVIDERS: [&str; 3] = ["dashscope", "openai", "google"];

/// Size gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeGateConfig {
    /// Off by default: most consumers handle arbitrarily large content
    pub enabled: bool,

    /// Largest payload, in characters, cached unconditionally
    pub max_content_length: usize,

    /// Provider names considered long-context capable
    pub long_context_providers: Vec<String>,
}

impl Default for SizeGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            long_context_providers: DEFAULT_LONG_CONTEXT_PROVIDERS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Answers which upstream LLM providers are currently configured
pub trait ProviderRegistry: Send + Sync {
    fn configured_providers(&self) -> Vec<String>;
}

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Detects providers from API keys in the process environment. No network calls.
pub struct EnvProviders {
    lookup: Box<EnvLookup>,
}

impl EnvProviders {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Use a custom variable source instead of the process environment
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn present(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Default for EnvProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProviders").finish_non_exhaustive()
    }
}

impl ProviderRegistry for EnvProviders {
    fn configured_providers(&self) -> Vec<String> {
        let mut providers = Vec::new();

        if self.present("DASHSCOPE_API_KEY").is_some() {
            providers.push("dashscope".to_string());
        }

        // OpenAI keys are only trusted when they look like real keys
        if let Some(key) = self.present("OPENAI_API_KEY") {
            if key.starts_with("sk-") && key.len() >= 40 {
                providers.push("openai".to_string());
            }
        }

        if self.present("GOOGLE_API_KEY").is_some() {
            providers.push("google".to_string());
        }

        if self.present("ANTHROPIC_API_KEY").is_some() {
            providers.push("anthropic".to_string());
        }

        providers
    }
}

/// Fixed provider list
#[derive(Debug, Clone, Default)]
pub struct StaticProviders(pub Vec<String>);

impl StaticProviders {
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(providers.into_iter().map(Into::into).collect())
    }
}

impl ProviderRegistry for StaticProviders {
    fn configured_providers(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Snapshot of the gate's configuration and provider situation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeGateStatus {
    pub enabled: bool,
    pub max_content_length: usize,
    pub long_context_providers: Vec<String>,
    pub available_providers: Vec<String>,
    pub available_long_context_providers: Vec<String>,
    pub has_long_context_support: bool,
    pub will_skip_long_content: bool,
}

/// Decides whether a payload is too large to cache
#[derive(Clone)]
pub struct SizeGate {
    config: SizeGateConfig,
    providers: Arc<dyn ProviderRegistry>,
}

impl SizeGate {
    pub fn new(config: SizeGateConfig, providers: Arc<dyn ProviderRegistry>) -> Self {
        Self { config, providers }
    }

    /// Gate reading providers from the process environment
    pub fn from_env(config: SizeGateConfig) -> Self {
        Self::new(config, Arc::new(EnvProviders::new()))
    }

    pub fn config(&self) -> &SizeGateConfig {
        &self.config
    }

    /// Configured providers that are long-context capable
    pub fn available_long_context_providers(&self) -> Vec<String> {
        self.providers
            .configured_providers()
            .into_iter()
            .filter(|p| self.config.long_context_providers.contains(p))
            .collect()
    }

    /// `true` when `content` should not be persisted
    pub fn should_skip(&self, content: &str, kind_label: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let length = content.chars().count();
        let max = self.config.max_content_length;
        if length <= max {
            return false;
        }

        let capable = self.available_long_context_providers();
        if capable.is_empty() {
            warn!(
                "Content too long ({} > {} chars) and no long-context provider configured, skipping {} cache",
                length, max, kind_label
            );
            debug!(
                "Long-context providers: {:?}",
                self.config.long_context_providers
            );
            true
        } else {
            info!(
                "Content is long ({} chars) but long-context providers {:?} are available, caching {}",
                length, capable, kind_label
            );
            false
        }
    }

    pub fn status(&self) -> SizeGateStatus {
        let available = self.providers.configured_providers();
        let capable: Vec<String> = available
            .iter()
            .filter(|p| self.config.long_context_providers.contains(p))
            .cloned()
            .collect();
        let has_support = !capable.is_empty();

        SizeGateStatus {
            enabled: self.config.enabled,
            max_content_length: self.config.max_content_length,
            long_context_providers: self.config.long_context_providers.clone(),
            available_providers: available,
            available_long_context_providers: capable,
            has_long_context_support: has_support,
            will_skip_long_content: self.config.enabled && !has_support,
        }
    }
}

impl fmt::Debug for SizeGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
