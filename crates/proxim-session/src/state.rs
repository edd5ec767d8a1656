//! Advertising and discovery state for one session.
//!
//! Owns the [`IdentityCache`] and the local endpoint id. Listener slots are
//! stored as ids; the caller unregisters whatever an operation hands back.

use std::collections::HashSet;

use proxim_core::{AdvertisingOptions, DiscoveryOptions, Medium, Strategy};

use crate::dispatch::ListenerId;
use crate::identity::{IdentityCache, Visibility};

#[derive(Debug, Clone)]
struct AdvertisingInfo {
    service_id: String,
    strategy: Strategy,
    mediums: Vec<Medium>,
    listener: ListenerId,
}

#[derive(Debug, Clone)]
struct DiscoveryInfo {
    service_id: String,
    strategy: Strategy,
    mediums: Vec<Medium>,
    listener: ListenerId,
    /// Endpoints already reported found. Mediums rescan and repeat themselves.
    reported: HashSet<String>,
}

/// What to do with a discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Forward to the discovery listener.
    Report(ListenerId),
    /// Not discovering this service.
    NotDiscovering,
    /// Found twice without being lost in between.
    Repeated,
    /// Lost without having been found.
    Unreported,
}

impl Sighting {
    pub fn listener(self) -> Option<ListenerId> {
        match self {
            Sighting::Report(id) => Some(id),
            _ => None,
        }
    }
}

pub struct SessionState {
    identity: IdentityCache,
    local_endpoint_id: Option<String>,
    advertising: Option<AdvertisingInfo>,
    discovery: Option<DiscoveryInfo>,
    // Options outlive the advertisement/discovery they came with; connection
    // setup and bandwidth upgrades still consult them afterwards.
    advertising_options: AdvertisingOptions,
    discovery_options: DiscoveryOptions,
}

impl SessionState {
    pub fn new(identity: IdentityCache) -> Self {
        Self {
            identity,
            local_endpoint_id: None,
            advertising: None,
            discovery: None,
            advertising_options: AdvertisingOptions::default(),
            discovery_options: DiscoveryOptions::default(),
        }
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.identity
    }

    // ── Local endpoint id ─────────────────────────────────────────────────────

    /// The current local endpoint id, issuing a fresh one if none is live.
    pub fn local_endpoint_id(&mut self) -> String {
        if let Some(id) = &self.local_endpoint_id {
            return id.clone();
        }
        let id = self.identity.fresh_id();
        self.local_endpoint_id = Some(id.clone());
        id
    }

    pub fn current_local_endpoint_id(&self) -> Option<&str> {
        self.local_endpoint_id.as_deref()
    }

    /// Drop the local endpoint id so the next one rotates.
    pub fn forget_local_endpoint_id(&mut self) {
        self.local_endpoint_id = None;
    }

    // ── Advertising ───────────────────────────────────────────────────────────

    /// Start advertising. A running advertisement is stopped first so the
    /// latest parameters win. Returns the exposed endpoint id and the
    /// listener it replaced, if any.
    pub fn start_advertising(
        &mut self,
        service_id: &str,
        strategy: Strategy,
        listener: ListenerId,
        mediums: &[Medium],
        options: AdvertisingOptions,
    ) -> (String, Option<ListenerId>) {
        let replaced = self.stop_advertising();
        let id = self.identity.on_start_advertising(&options);
        self.local_endpoint_id = Some(id.clone());
        self.advertising = Some(AdvertisingInfo {
            service_id: service_id.to_string(),
            strategy,
            mediums: mediums.to_vec(),
            listener,
        });
        self.advertising_options = options;
        (id, replaced)
    }

    /// Returns the listener that was bound, if advertising.
    pub fn stop_advertising(&mut self) -> Option<ListenerId> {
        let info = self.advertising.take()?;
        self.identity.on_stop_advertising();
        Some(info.listener)
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising.is_some()
    }

    pub fn advertising_service_id(&self) -> String {
        self.advertising
            .as_ref()
            .map(|a| a.service_id.clone())
            .unwrap_or_default()
    }

    pub fn advertising_strategy(&self) -> Option<Strategy> {
        self.advertising.as_ref().map(|a| a.strategy)
    }

    pub fn advertised_mediums(&self) -> Vec<Medium> {
        self.advertising
            .as_ref()
            .map(|a| a.mediums.clone())
            .unwrap_or_default()
    }

    pub fn advertising_listener(&self) -> Option<ListenerId> {
        self.advertising.as_ref().map(|a| a.listener)
    }

    pub fn advertising_options(&self) -> &AdvertisingOptions {
        &self.advertising_options
    }

    pub fn advertising_visibility(&self) -> Option<Visibility> {
        self.identity.active_visibility()
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Start discovery, replacing any running discovery. Forfeits a cached
    /// high-visibility id.
    pub fn start_discovery(
        &mut self,
        service_id: &str,
        strategy: Strategy,
        listener: ListenerId,
        mediums: &[Medium],
        options: DiscoveryOptions,
    ) -> Option<ListenerId> {
        let replaced = self.stop_discovery();
        self.identity.on_start_discovery();
        self.discovery = Some(DiscoveryInfo {
            service_id: service_id.to_string(),
            strategy,
            mediums: mediums.to_vec(),
            listener,
            reported: HashSet::new(),
        });
        self.discovery_options = options;
        replaced
    }

    pub fn stop_discovery(&mut self) -> Option<ListenerId> {
        self.discovery.take().map(|d| d.listener)
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    pub fn is_discovering_service_id(&self, service_id: &str) -> bool {
        self.discovery
            .as_ref()
            .is_some_and(|d| d.service_id == service_id)
    }

    pub fn discovery_service_id(&self) -> String {
        self.discovery
            .as_ref()
            .map(|d| d.service_id.clone())
            .unwrap_or_default()
    }

    pub fn discovery_strategy(&self) -> Option<Strategy> {
        self.discovery.as_ref().map(|d| d.strategy)
    }

    pub fn discovered_mediums(&self) -> Vec<Medium> {
        self.discovery
            .as_ref()
            .map(|d| d.mediums.clone())
            .unwrap_or_default()
    }

    pub fn discovery_options(&self) -> &DiscoveryOptions {
        &self.discovery_options
    }

    pub fn endpoint_found(&mut self, service_id: &str, endpoint_id: &str) -> Sighting {
        let discovery = match self.discovery.as_mut() {
            Some(d) if d.service_id == service_id => d,
            _ => return Sighting::NotDiscovering,
        };
        if !discovery.reported.insert(endpoint_id.to_string()) {
            return Sighting::Repeated;
        }
        Sighting::Report(discovery.listener)
    }

    pub fn endpoint_lost(&mut self, service_id: &str, endpoint_id: &str) -> Sighting {
        let discovery = match self.discovery.as_mut() {
            Some(d) if d.service_id == service_id => d,
            _ => return Sighting::NotDiscovering,
        };
        if !discovery.reported.remove(endpoint_id) {
            return Sighting::Unreported;
        }
        Sighting::Report(discovery.listener)
    }

    pub fn discovered_endpoint_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .discovery
            .as_ref()
            .map(|d| d.reported.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    // ── Reset ─────────────────────────────────────────────────────────────────

    /// Stop advertising and discovery and forget the local endpoint id.
    /// Returns the advertising and discovery listeners that were bound.
    pub fn reset(&mut self) -> (Option<ListenerId>, Option<ListenerId>) {
        let released = (self.stop_advertising(), self.stop_discovery());
        self.local_endpoint_id = None;
        released
    }
}
