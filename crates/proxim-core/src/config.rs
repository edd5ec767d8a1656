//! Configuration system for Proxim.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PROXIM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/proxim/config.toml
//!   3. ~/.config/proxim/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a cached high-visibility endpoint id.
pub const HIGH_VISIBILITY_CACHE_TTL: Duration = Duration::from_secs(30);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximConfig {
    pub features: FeatureConfig,
    pub identity: IdentityConfig,
    pub loopback: LoopbackConfig,
}

/// Process-wide feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Gate for per-endpoint cancellation flags.
    pub enable_cancellation_flag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// How long a high-visibility endpoint id stays reusable after
    /// advertising stops.
    pub high_visibility_cache_ttl_secs: u64,
}

/// Settings for the in-process loopback demo run by `proximd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub service_id: String,
    pub advertiser_name: String,
    pub discoverer_name: String,
    pub message: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_cancellation_flag: true,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            high_visibility_cache_ttl_secs: HIGH_VISIBILITY_CACHE_TTL.as_secs(),
        }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            service_id: "com.proxim.loopback".to_string(),
            advertiser_name: "alpha".to_string(),
            discoverer_name: "bravo".to_string(),
            message: "hello from bravo".to_string(),
        }
    }
}

impl IdentityConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.high_visibility_cache_ttl_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("proxim")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ProximConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ProximConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PROXIM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ProximConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PROXIM_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROXIM_FEATURES__ENABLE_CANCELLATION_FLAG") {
            self.features.enable_cancellation_flag = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("PROXIM_IDENTITY__HIGH_VISIBILITY_CACHE_TTL_SECS") {
            if let Ok(secs) = v.parse() {
                self.identity.high_visibility_cache_ttl_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("PROXIM_LOOPBACK__SERVICE_ID") {
            self.loopback.service_id = v;
        }
    }
}
