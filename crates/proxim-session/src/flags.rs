//! Feature toggles consumed by the session manager.
//!
//! Sessions are handed a [`FeatureFlagSource`] at construction and read it on
//! every decision, so a toggle flipped at runtime takes effect immediately.

use std::sync::atomic::{AtomicBool, Ordering};

use proxim_core::config::FeatureConfig;

pub trait FeatureFlagSource: Send + Sync {
    /// Whether per-endpoint cancellation flags may be set.
    fn enable_cancellation_flag(&self) -> bool;
}

impl FeatureFlagSource for FeatureConfig {
    fn enable_cancellation_flag(&self) -> bool {
        self.enable_cancellation_flag
    }
}

/// Runtime-mutable flags, shared by every session that holds them.
#[derive(Debug)]
pub struct SharedFeatureFlags {
    enable_cancellation_flag: AtomicBool,
}

impl SharedFeatureFlags {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            enable_cancellation_flag: AtomicBool::new(config.enable_cancellation_flag),
        }
    }

    pub fn set_enable_cancellation_flag(&self, enabled: bool) {
        self.enable_cancellation_flag.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "cancellation flag feature toggled");
    }
}

impl Default for SharedFeatureFlags {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}

impl FeatureFlagSource for SharedFeatureFlags {
    fn enable_cancellation_flag(&self) -> bool {
        self.enable_cancellation_flag.load(Ordering::Relaxed)
    }
}
