//! Per-endpoint cancellation flags.
//!
//! A flag is advisory: setting it tears nothing down. Transport code holds a
//! clone of the flag and polls it between steps of a long operation.
//!
//! Setting a flag is gated by the `enable_cancellation_flag` feature. While
//! the feature is off, no flag ever changes state through this registry.
//!
//! Lookup is total:
//! - an endpoint never seen before gets a fresh, not-cancelled flag;
//! - an endpoint whose flag was dropped by [`CancellationRegistry::cancel_all`]
//!   gets a cancelled one, so callers can tell "cancelled and cleaned up"
//!   apart from "never touched".

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::flags::FeatureFlagSource;

/// Observable cancellation bit for one endpoint. Clones share the bit.
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    endpoint_id: Arc<str>,
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    fn new(endpoint_id: &str, cancelled: bool) -> Self {
        Self {
            endpoint_id: Arc::from(endpoint_id),
            cancelled: Arc::new(AtomicBool::new(cancelled)),
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn uncancel(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

pub struct CancellationRegistry {
    flags: HashMap<String, CancellationFlag>,
    /// Endpoints whose flags were cancelled and dropped by `cancel_all`.
    retired: HashSet<String>,
    features: Arc<dyn FeatureFlagSource>,
}

impl CancellationRegistry {
    pub fn new(features: Arc<dyn FeatureFlagSource>) -> Self {
        Self {
            flags: HashMap::new(),
            retired: HashSet::new(),
            features,
        }
    }

    pub fn enabled(&self) -> bool {
        self.features.enable_cancellation_flag()
    }

    /// The flag for `endpoint_id`, synthesizing one if absent.
    pub fn get(&mut self, endpoint_id: &str) -> CancellationFlag {
        if let Some(flag) = self.flags.get(endpoint_id) {
            return flag.clone();
        }
        let cancelled = self.retired.remove(endpoint_id);
        let flag = CancellationFlag::new(endpoint_id, cancelled);
        self.flags.insert(endpoint_id.to_string(), flag.clone());
        flag
    }

    /// Arm a flag for a new attempt with `endpoint_id`. An existing flag is
    /// un-cancelled rather than replaced, so clones already handed out see
    /// the reset.
    pub fn add(&mut self, endpoint_id: &str) {
        if !self.enabled() {
            return;
        }
        self.retired.remove(endpoint_id);
        match self.flags.get(endpoint_id) {
            Some(flag) => {
                if flag.cancelled() {
                    flag.uncancel();
                    tracing::debug!(endpoint_id, "re-armed cancelled flag for reused endpoint");
                }
            }
            None => {
                self.flags
                    .insert(endpoint_id.to_string(), CancellationFlag::new(endpoint_id, false));
            }
        }
    }

    /// Cancel `endpoint_id`. Returns whether the cancellation was applied.
    pub fn cancel(&mut self, endpoint_id: &str) -> bool {
        if !self.enabled() {
            tracing::debug!(endpoint_id, "cancellation feature disabled, ignoring cancel");
            return false;
        }
        self.get(endpoint_id).cancel();
        true
    }

    /// Cancel `endpoint_id` only if a flag is already tracked for it. Never
    /// inserts. Returns whether a flag was cancelled.
    pub fn cancel_tracked(&mut self, endpoint_id: &str) -> bool {
        if !self.enabled() {
            tracing::debug!(endpoint_id, "cancellation feature disabled, ignoring cancel");
            return false;
        }
        match self.flags.get(endpoint_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and drop every tracked flag. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        if !self.enabled() {
            tracing::debug!("cancellation feature disabled, ignoring cancel-all");
            return 0;
        }
        let count = self.flags.len();
        for (endpoint_id, flag) in self.flags.drain() {
            flag.cancel();
            self.retired.insert(endpoint_id);
        }
        count
    }

    pub fn is_tracked(&self, endpoint_id: &str) -> bool {
        self.flags.contains_key(endpoint_id)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Forget every flag, including retired endpoints.
    pub fn clear(&mut self) {
        self.flags.clear();
        self.retired.clear();
    }
}
