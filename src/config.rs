//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{PolicyTable, DEFAULT_CLEANUP_INTERVAL, DEFAULT_EVICTION_THRESHOLD};

/// Prefix for environment variable overrides, e.g. `TURNSTILE_LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Policies added to, or replacing, the built-in presets
    #[serde(default)]
    pub policies: PolicyTable,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds between background cleanup sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Store size above which checks sweep expired entries inline (`null` disables)
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: Option<usize>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            eviction_threshold: default_eviction_threshold(),
        }
    }
}

impl LimiterConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_secs()
}

fn default_eviction_threshold() -> Option<usize> {
    Some(DEFAULT_EVICTION_THRESHOLD)
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, overridden by
    /// `TURNSTILE_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `TURNSTILE_LIMITER__EVICTION_THRESHOLD=500`.
    /// A policy set through the environment must supply both `MAX_REQUESTS`
    /// and `WINDOW_MS`; policies are replaced whole, never merged field by field.
    ///
    /// Runs before logging is installed, so it does not log.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;

        let config: TurnstileConfig = settings
            .try_deserialize()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.cleanup_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "limiter.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The built-in presets with this configuration's policies applied on top.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::with_presets();
        table.extend(self.policies.clone());
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Preset;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.limiter.cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.limiter.eviction_threshold, Some(10_000));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.policies.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TurnstileConfig::from_yaml("{}").unwrap();
        assert_eq!(config, TurnstileConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limiter:
  cleanup_interval_secs: 60
  eviction_threshold: ~
policies:
  auth:
    max_requests: 3
    window_ms: 600000
  sms:
    max_requests: 20
    window_ms: 60000
logging:
  level: debug
  json: true
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.cleanup_interval_secs, 60);
        assert_eq!(config.limiter.eviction_threshold, None);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let table = config.policy_table();
        assert_eq!(table.len(), Preset::ALL.len() + 1);
        assert_eq!(table.require("auth").unwrap().max_requests(), 3);
        assert_eq!(table.require("sms").unwrap().window_ms(), 60_000);
        assert_eq!(table.require("export").unwrap().max_requests(), 3);
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let yaml = "limiter:\n  cleanup_interval_secs: 0\n";
        assert!(matches!(
            TurnstileConfig::from_yaml(yaml),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let yaml = "policies:\n  auth:\n    max_requests: 5\n    window_ms: 0\n";
        assert!(TurnstileConfig::from_yaml(yaml).is_err());
    }

    /// `load` reads the process environment; tests that call it take this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "turnstile-{}-{}.yaml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_layered_file() {
        let _env = env_guard();
        let path = std::env::temp_dir().join(format!(
            "turnstile-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "limiter:\n  cleanup_interval_secs: 30\npolicies:\n  export:\n    max_requests: 1\n    window_ms: 1000\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.cleanup_interval_secs, 30);
        assert_eq!(config.limiter.eviction_threshold, Some(10_000));
        assert_eq!(config.policy_table().require("export").unwrap().max_requests(), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _env = env_guard();
        let path = std::env::temp_dir().join("turnstile-does-not-exist.yaml");
        assert!(matches!(
            TurnstileConfig::load(Some(&path)),
            Err(TurnstileError::Config(_))
        ));
    }

    #[test]
    fn test_loaders_agree_on_policy_names() {
        let _env = env_guard();
        let path = temp_config(
            "loaders",
            "limiter: {eviction_threshold: ~}\npolicies: {Sms: {max_requests: 2, window_ms: 1000}}\n",
        );

        let loaded = TurnstileConfig::load(Some(&path)).unwrap();
        let parsed = TurnstileConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, parsed);
        assert_eq!(loaded.limiter.eviction_threshold, None);
        assert_eq!(loaded.policies.names().collect::<Vec<_>>(), vec!["sms"]);
        assert_eq!(loaded.policy_table().require("Sms").unwrap().max_requests(), 2);
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = env_guard();
        let path = temp_config("env", "limiter:\n  cleanup_interval_secs: 30\n");

        std::env::set_var("TURNSTILE_LIMITER__CLEANUP_INTERVAL_SECS", "42");
        std::env::set_var("TURNSTILE_LIMITER__EVICTION_THRESHOLD", "500");
        std::env::set_var("TURNSTILE_LOGGING__JSON", "true");
        let from_file = TurnstileConfig::load(Some(&path));
        let without_file = TurnstileConfig::load(None);
        std::env::remove_var("TURNSTILE_LIMITER__CLEANUP_INTERVAL_SECS");
        std::env::remove_var("TURNSTILE_LIMITER__EVICTION_THRESHOLD");
        std::env::remove_var("TURNSTILE_LOGGING__JSON");
        std::fs::remove_file(&path).unwrap();

        for config in [from_file.unwrap(), without_file.unwrap()] {
            assert_eq!(config.limiter.cleanup_interval_secs, 42);
            assert_eq!(config.limiter.eviction_threshold, Some(500));
            assert!(config.logging.json);
        }
    }

    #[test]
    fn test_environment_policy_requires_both_fields() {
        let _env = env_guard();

        std::env::set_var("TURNSTILE_POLICIES__AUTH__MAX_REQUESTS", "3");
        let partial = TurnstileConfig::load(None);
        std::env::set_var("TURNSTILE_POLICIES__AUTH__WINDOW_MS", "1000");
        let complete = TurnstileConfig::load(None);
        std::env::remove_var("TURNSTILE_POLICIES__AUTH__MAX_REQUESTS");
        std::env::remove_var("TURNSTILE_POLICIES__AUTH__WINDOW_MS");

        assert!(matches!(partial, Err(TurnstileError::Config(_))));
        let auth = *complete.unwrap().policy_table().require("auth").unwrap();
        assert_eq!(auth.max_requests(), 3);
        assert_eq!(auth.window_ms(), 1000);
    }
}
