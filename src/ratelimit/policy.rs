//! Rate limit policies: per-window ceilings and the named preset table.
//!
//! Policies are plain immutable values. The [`PolicyTable`] is built once
//! (presets plus any configured overrides) and handed to whichever call sites
//! need it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// A fixed-window policy: at most `max_requests` admissions per `window_ms`.
///
/// Both values are validated at construction; a zero ceiling or a zero-length
/// window cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

/// Unvalidated wire form of [`RateLimitConfig`].
#[derive(Deserialize)]
struct RawRateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = TurnstileError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self> {
        Self::new(raw.max_requests, raw.window_ms)
    }
}

impl RateLimitConfig {
    /// Create a policy, rejecting zero-valued limits.
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(TurnstileError::InvalidPolicy(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(TurnstileError::InvalidPolicy(
                "window_ms must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    /// Const constructor for the built-in presets. Callers guarantee non-zero values.
    const fn preset(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// Maximum admissions per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// The named policies the application ships with.
///
/// The numbers are a contract: call sites and client-side copies depend on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Sign-in and password reset attempts: 5 per 15 minutes
    Auth,
    /// Client-side AI note actions: 10 per minute
    AiAction,
    /// Server-side AI generation calls: 20 per minute
    Ai,
    /// Checkout session creation: 10 per minute
    Checkout,
    /// Transactional email sends: 50 per minute
    Email,
    /// Generic API requests: 100 per minute
    Api,
    /// Data exports: 3 per minute
    Export,
}

impl Preset {
    /// Every preset, in table order.
    pub const ALL: [Preset; 7] = [
        Preset::Auth,
        Preset::AiAction,
        Preset::Ai,
        Preset::Checkout,
        Preset::Email,
        Preset::Api,
        Preset::Export,
    ];

    /// The policy name used in configuration and identifiers.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Auth => "auth",
            Preset::AiAction => "ai_action",
            Preset::Ai => "ai",
            Preset::Checkout => "checkout",
            Preset::Email => "email",
            Preset::Api => "api",
            Preset::Export => "export",
        }
    }

    /// The preset's policy.
    pub fn config(&self) -> RateLimitConfig {
        match self {
            Preset::Auth => RateLimitConfig::preset(5, 15 * 60 * 1000),
            Preset::AiAction => RateLimitConfig::preset(10, 60 * 1000),
            Preset::Ai => RateLimitConfig::preset(20, 60 * 1000),
            Preset::Checkout => RateLimitConfig::preset(10, 60 * 1000),
            Preset::Email => RateLimitConfig::preset(50, 60 * 1000),
            Preset::Api => RateLimitConfig::preset(100, 60 * 1000),
            Preset::Export => RateLimitConfig::preset(3, 60 * 1000),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TurnstileError::UnknownPolicy(s.to_string()))
    }
}

/// Named policies available to call sites.
///
/// Names are case-insensitive: they are stored and looked up in ASCII
/// lowercase, whichever loader produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, RateLimitConfig>",
    into = "BTreeMap<String, RateLimitConfig>"
)]
pub struct PolicyTable {
    policies: BTreeMap<String, RateLimitConfig>,
}

impl From<BTreeMap<String, RateLimitConfig>> for PolicyTable {
    fn from(policies: BTreeMap<String, RateLimitConfig>) -> Self {
        let mut table = Self::new();
        for (name, config) in policies {
            table.insert(name, config);
        }
        table
    }
}

impl From<PolicyTable> for BTreeMap<String, RateLimitConfig> {
    fn from(table: PolicyTable) -> Self {
        table.policies
    }
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding every built-in preset.
    pub fn with_presets() -> Self {
        let mut table = Self::new();
        for preset in Preset::ALL {
            table.insert(preset.name(), preset.config());
        }
        table
    }

    /// The canonical form of a policy name.
    pub fn normalize(name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, name: impl AsRef<str>, config: RateLimitConfig) {
        self.policies.insert(Self::normalize(name.as_ref()), config);
    }

    /// Apply every entry of `other` on top of this table.
    pub fn extend(&mut self, other: PolicyTable) {
        self.policies.extend(other.policies);
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&RateLimitConfig> {
        self.policies.get(&Self::normalize(name))
    }

    /// Look up a policy by name, failing with [`TurnstileError::UnknownPolicy`].
    pub fn require(&self, name: &str) -> Result<&RateLimitConfig> {
        self.get(name)
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// Policy names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Iterate over `(name, policy)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitConfig)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Parse a policy table from YAML.
    ///
    /// Accepts either a bare `name: {max_requests, window_ms}` map or the same
    /// map nested under a top-level `policies:` key.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy table: {}", e)))?;

        let policies = match value.get("policies") {
            Some(inner) => inner.clone(),
            None => value,
        };

        serde_yaml::from_value(policies)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy table: {}", e)))
    }

    /// Load a policy table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}
