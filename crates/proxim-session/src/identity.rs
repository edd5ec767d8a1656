//! Local endpoint id policy.
//!
//! Ids rotate by default. The one exception is high-visibility advertising
//! (full power, Bluetooth allowed): its id is cached so that a brief
//! stop/start cycle exposes the same id again.
//!
//! Rules:
//! - High-visibility start reuses the cached id if it is younger than the TTL,
//!   otherwise issues and caches a fresh one.
//! - Low-visibility start always issues a fresh id and leaves the cache alone.
//! - Stopping a high-visibility advertisement restarts the TTL clock.
//! - Starting discovery drops the cache.
//!
//! The TTL is checked when advertising starts. No timer runs in between.

use std::sync::Arc;
use std::time::{Duration, Instant};

use proxim_core::{AdvertisingOptions, ENDPOINT_ID_ALPHABET, ENDPOINT_ID_LENGTH};
use rand::Rng;

use crate::clock::Clock;

/// Attempts made to draw an id that differs from the previous one.
const MAX_REDRAWS: usize = 8;

/// Source of candidate endpoint ids.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws ids uniformly from the endpoint id alphabet.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..ENDPOINT_ID_LENGTH)
            .map(|_| ENDPOINT_ID_ALPHABET[rng.gen_range(0..ENDPOINT_ID_ALPHABET.len())] as char)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    High,
    Low,
}

impl Visibility {
    /// High iff not low-power and Bluetooth is allowed.
    pub fn of(options: &AdvertisingOptions) -> Self {
        if !options.low_power && options.allowed.bluetooth {
            Visibility::High
        } else {
            Visibility::Low
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    id: String,
    created_at: Instant,
}

pub struct IdentityCache {
    generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: Option<CacheEntry>,
    /// Visibility of the advertisement currently running, if any.
    active: Option<Visibility>,
    last_issued: Option<String>,
}

impl IdentityCache {
    pub fn new(generator: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            generator,
            clock,
            ttl,
            entry: None,
            active: None,
            last_issued: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cached_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.id.as_str())
    }

    pub fn active_visibility(&self) -> Option<Visibility> {
        self.active
    }

    /// Pick the id for an advertisement that is starting now.
    pub fn on_start_advertising(&mut self, options: &AdvertisingOptions) -> String {
        let visibility = Visibility::of(options);
        self.active = Some(visibility);

        if visibility == Visibility::Low {
            let id = self.fresh_id();
            tracing::debug!(endpoint_id = %id, "low-visibility advertising, rotated endpoint id");
            return id;
        }

        let now = self.clock.now();
        if let Some(entry) = &self.entry {
            if now.saturating_duration_since(entry.created_at) < self.ttl {
                tracing::debug!(
                    endpoint_id = %entry.id,
                    "reusing cached high-visibility endpoint id"
                );
                let id = entry.id.clone();
                self.last_issued = Some(id.clone());
                return id;
            }
            tracing::debug!(endpoint_id = %entry.id, "cached high-visibility endpoint id expired");
        }

        let id = self.fresh_id();
        self.entry = Some(CacheEntry {
            id: id.clone(),
            created_at: now,
        });
        tracing::debug!(endpoint_id = %id, "cached new high-visibility endpoint id");
        id
    }

    pub fn on_stop_advertising(&mut self) {
        match self.active.take() {
            Some(Visibility::High) => {
                if let Some(entry) = &mut self.entry {
                    entry.created_at = self.clock.now();
                    tracing::debug!(
                        endpoint_id = %entry.id,
                        ttl_secs = self.ttl.as_secs(),
                        "retaining high-visibility endpoint id"
                    );
                }
            }
            Some(Visibility::Low) | None => {}
        }
    }

    pub fn on_start_discovery(&mut self) {
        if let Some(entry) = self.entry.take() {
            tracing::debug!(
                endpoint_id = %entry.id,
                "discovery started, dropped cached endpoint id"
            );
        }
    }

    /// Issue an id that is not cached, differing from the last one issued
    /// and from whatever sits in the cache.
    pub fn fresh_id(&mut self) -> String {
        let mut id = self.generator.generate();
        for _ in 1..MAX_REDRAWS {
            let repeats_last = self.last_issued.as_deref() == Some(id.as_str());
            let repeats_cached = self.cached_id() == Some(id.as_str());
            if !repeats_last && !repeats_cached {
                break;
            }
            id = self.generator.generate();
        }
        self.last_issued = Some(id.clone());
        id
    }
}
