//! Configuration file parser for ~/.config/feedscope/config.toml.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`, which reproduces the built-in limits (100 cached
//! feeds, five minute TTL, 1000 items, 10 MiB). Unknown keys are accepted
//! but logged as likely typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::size::{FeedLimits, MAX_FEED_BYTES, MAX_ITEMS};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is unusable (zero capacity, zero timeout, ...).
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Every section and field uses `#[serde(default)]` so any subset of keys can
/// be specified.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached results before LRU eviction.
    pub capacity: usize,
    /// Lifetime of a successful result.
    pub ttl_secs: u64,
    /// Lifetime of a failed result.
    pub failure_ttl_secs: u64,
    /// Period of the background sweep that drops expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 300,
            failure_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Deadline for the RSS/Atom attempt.
    pub timeout_secs: u64,
    /// Deadline for the JSON Feed fallback attempt.
    pub json_timeout_secs: u64,
    /// Download cap applied while streaming the body.
    pub max_response_bytes: usize,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Skip the public-host check on feed URLs (local development servers).
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            json_timeout_secs: 10,
            max_response_bytes: 20 * 1024 * 1024,
            max_redirects: 3,
            user_agent: concat!("feedscope/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn json_timeout(&self) -> Duration {
        Duration::from_secs(self.json_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_items: usize,
    pub max_feed_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            max_feed_bytes: MAX_FEED_BYTES,
        }
    }
}

impl From<&LimitsConfig> for FeedLimits {
    fn from(limits: &LimitsConfig) -> Self {
        FeedLimits {
            max_items: limits.max_items,
            max_feed_bytes: limits.max_feed_bytes,
        }
    }
}

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    (
        "cache",
        &["capacity", "ttl_secs", "failure_ttl_secs", "sweep_interval_secs"],
    ),
    (
        "fetch",
        &[
            "timeout_secs",
            "json_timeout_secs",
            "max_response_bytes",
            "max_redirects",
            "user_agent",
            "allow_private_hosts",
        ],
    ),
    ("limits", &["max_items", "max_feed_bytes"]),
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Zero capacity, TTL, interval, timeout or limit → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            cache_capacity = config.cache.capacity,
            cache_ttl_secs = config.cache.ttl_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("cache.capacity", self.cache.capacity as u64),
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("cache.failure_ttl_secs", self.cache.failure_ttl_secs),
            ("cache.sweep_interval_secs", self.cache.sweep_interval_secs),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
            ("fetch.json_timeout_secs", self.fetch.json_timeout_secs),
            ("fetch.max_response_bytes", self.fetch.max_response_bytes as u64),
            ("limits.max_items", self.limits.max_items as u64),
            ("limits.max_feed_bytes", self.limits.max_feed_bytes as u64),
        ];

        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
            }
        }
        Ok(())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let Some((_, fields)) = KNOWN_KEYS.iter().find(|(section, _)| *section == key.as_str()) else {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        };
        if let Some(table) = value.as_table() {
            for field in table.keys() {
                if !fields.contains(&field.as_str()) {
                    tracing::warn!(key = %format!("{key}.{field}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.failure_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.fetch.timeout(), Duration::from_secs(30));
        assert_eq!(config.fetch.json_timeout(), Duration::from_secs(10));
        assert_eq!(config.fetch.max_redirects, 3);
        assert!(config.fetch.user_agent.starts_with("feedscope/"));
        assert!(!config.fetch.allow_private_hosts);
        assert_eq!(FeedLimits::from(&config.limits), FeedLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedscope_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("feedscope_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::from_toml("[cache]\nttl_secs = 60\n").unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.limits.max_items, MAX_ITEMS);
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feedscope_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
[cache]
capacity = 10
ttl_secs = 120
failure_ttl_secs = 15
sweep_interval_secs = 5

[fetch]
timeout_secs = 20
json_timeout_secs = 5
max_response_bytes = 1048576
max_redirects = 1
user_agent = "my-validator/1.0"
allow_private_hosts = true

[limits]
max_items = 50
max_feed_bytes = 65536
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.failure_ttl(), Duration::from_secs(15));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.fetch.timeout(), Duration::from_secs(20));
        assert_eq!(config.fetch.max_response_bytes, 1_048_576);
        assert_eq!(config.fetch.max_redirects, 1);
        assert_eq!(config.fetch.user_agent, "my-validator/1.0");
        assert!(config.fetch.allow_private_hosts);
        assert_eq!(
            FeedLimits::from(&config.limits),
            FeedLimits {
                max_items: 50,
                max_feed_bytes: 65536
            }
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
totally_fake_key = "should not fail"

[cache]
capacity = 5
ttl = 10
"#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let result = Config::from_toml("[cache]\ncapacity = \"lots\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_values_rejected() {
        for content in [
            "[cache]\ncapacity = 0\n",
            "[cache]\nttl_secs = 0\n",
            "[fetch]\ntimeout_secs = 0\n",
            "[limits]\nmax_items = 0\n",
        ] {
            let err = Config::from_toml(content).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{content}");
            assert!(err.to_string().contains("must be greater than 0"));
        }
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedscope_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_at_size_limit_accepted() {
        let dir = std::env::temp_dir().join("feedscope_config_test_at_limit");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut content = "[cache]\ncapacity = 7\n".to_string();
        while content.len() < 1_048_576 - 20 {
            content.push_str("# padding comment\n");
        }
        content.truncate(1_048_576);
        std::fs::write(&path, &content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache.capacity, 7);

        std::fs::remove_dir_all(&dir).ok();
    }
}
