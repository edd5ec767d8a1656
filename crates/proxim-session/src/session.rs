//! `ClientSession` — one local participant's view of the proximity network.
//!
//! All mutable state sits behind a single `parking_lot` mutex. Every public
//! method takes the lock for one read or mutation, releases it, and only then
//! dispatches to listeners. A listener may therefore call straight back into
//! the session (accept, cancel, query) from inside its callback.
//!
//! The listener for a transition is resolved inside the same critical section
//! that applies it. A teardown racing on another thread can unregister the
//! listener afterwards without swallowing the callback.
//!
//! Transports report events through the `on_*` methods; the application
//! drives the session through the rest.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use proxim_core::config::{FeatureConfig, ProximConfig, HIGH_VISIBILITY_CACHE_TTL};
use proxim_core::{
    AdvertisingOptions, ConnectionOptions, ConnectionResponseInfo, DiscoveryOptions, Medium,
    Payload, PayloadProgressInfo, SessionError, Status, Strategy,
};
use serde::Serialize;

use crate::cancellation::{CancellationFlag, CancellationRegistry};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{
    ConnectionListener, DiscoveryListener, NotificationDispatcher, PayloadListener,
};
use crate::flags::FeatureFlagSource;
use crate::handshake::{HandshakeRegistry, HandshakeState, PendingConnection, Response};
use crate::identity::{IdGenerator, IdentityCache, RandomIdGenerator};
use crate::state::{SessionState, Sighting};

static NEXT_CLIENT_ID: AtomicI64 = AtomicI64::new(1);

// ── Snapshots ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub endpoint_id: String,
    pub connection_token: String,
    pub incoming: bool,
    pub state: HandshakeState,
    pub local_response: Response,
    pub remote_response: Response,
}

impl From<&PendingConnection> for ConnectionSnapshot {
    fn from(c: &PendingConnection) -> Self {
        Self {
            endpoint_id: c.endpoint_id().to_string(),
            connection_token: c.connection_token().to_string(),
            incoming: c.is_incoming_connection(),
            state: c.state(),
            local_response: c.local_response(),
            remote_response: c.remote_response(),
        }
    }
}

/// Point-in-time view of a session, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub client_id: i64,
    pub local_endpoint_id: Option<String>,
    pub advertising: bool,
    pub advertising_service_id: String,
    pub discovering: bool,
    pub discovery_service_id: String,
    pub discovered_endpoints: Vec<String>,
    /// Sorted by endpoint id.
    pub connections: Vec<ConnectionSnapshot>,
    pub cancellation_flags: usize,
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct ClientSessionBuilder {
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    feature_flags: Arc<dyn FeatureFlagSource>,
    cache_ttl: Duration,
}

impl Default for ClientSessionBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(RandomIdGenerator),
            feature_flags: Arc::new(FeatureConfig::default()),
            cache_ttl: HIGH_VISIBILITY_CACHE_TTL,
        }
    }
}

impl ClientSessionBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn feature_flags(mut self, flags: Arc<dyn FeatureFlagSource>) -> Self {
        self.feature_flags = flags;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Take the feature toggle and cache TTL from a loaded config.
    pub fn config(self, config: &ProximConfig) -> Self {
        self.feature_flags(Arc::new(config.features.clone()))
            .cache_ttl(config.identity.cache_ttl())
    }

    pub fn build(self) -> ClientSession {
        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let identity = IdentityCache::new(self.id_generator, self.clock, self.cache_ttl);
        tracing::debug!(
            client_id,
            cache_ttl_secs = self.cache_ttl.as_secs(),
            "client session created"
        );
        ClientSession {
            client_id,
            inner: Mutex::new(Inner {
                state: SessionState::new(identity),
                handshakes: HandshakeRegistry::new(),
                cancellation: CancellationRegistry::new(self.feature_flags),
            }),
            dispatcher: NotificationDispatcher::new(),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct Inner {
    state: SessionState,
    handshakes: HandshakeRegistry,
    cancellation: CancellationRegistry,
}

impl Inner {
    /// With no connections left and nothing advertised, the local endpoint id
    /// is released so the next one goes through the identity policy again.
    fn settle(&mut self, client_id: i64) {
        if self.handshakes.is_empty()
            && !self.state.is_advertising()
            && self.state.current_local_endpoint_id().is_some()
        {
            self.state.forget_local_endpoint_id();
            tracing::debug!(client_id, "session idle, released local endpoint id");
        }
    }
}

pub struct ClientSession {
    client_id: i64,
    inner: Mutex<Inner>,
    dispatcher: NotificationDispatcher,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientSessionBuilder {
        ClientSessionBuilder::default()
    }

    pub fn from_config(config: &ProximConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// The endpoint id this session presents, issuing one if none is live.
    pub fn local_endpoint_id(&self) -> String {
        self.inner.lock().state.local_endpoint_id()
    }

    /// Return to idle: advertising and discovery stopped, every handshake and
    /// cancellation flag dropped. No callbacks fire. `client_id` is kept.
    pub fn reset(&self) {
        let ((advertising, discovery), dropped) = {
            let mut inner = self.inner.lock();
            let released = inner.state.reset();
            let dropped = inner.handshakes.drain();
            inner.cancellation.clear();
            (released, dropped)
        };
        if let Some(id) = advertising {
            self.dispatcher.unregister_connection(id);
        }
        if let Some(id) = discovery {
            self.dispatcher.unregister_discovery(id);
        }
        for connection in &dropped {
            self.release(connection);
        }
        tracing::info!(
            client_id = self.client_id,
            dropped_connections = dropped.len(),
            "session reset"
        );
    }

    // ── Advertising ───────────────────────────────────────────────────────────

    /// Start advertising `service_id`. Returns the endpoint id advertised.
    pub fn start_advertising(
        &self,
        service_id: &str,
        strategy: Strategy,
        listener: Arc<dyn ConnectionListener>,
        mediums: &[Medium],
        options: AdvertisingOptions,
    ) -> String {
        let listener_id = self.dispatcher.register_connection(listener);
        let (endpoint_id, replaced) = self.inner.lock().state.start_advertising(
            service_id,
            strategy,
            listener_id,
            mediums,
            options,
        );
        if let Some(old) = replaced {
            self.dispatcher.unregister_connection(old);
        }
        tracing::info!(
            client_id = self.client_id,
            service_id,
            endpoint_id = %endpoint_id,
            mediums = mediums.len(),
            "advertising started"
        );
        endpoint_id
    }

    pub fn stop_advertising(&self) {
        let released = {
            let mut inner = self.inner.lock();
            let released = inner.state.stop_advertising();
            inner.settle(self.client_id);
            released
        };
        if let Some(id) = released {
            self.dispatcher.unregister_connection(id);
            tracing::info!(client_id = self.client_id, "advertising stopped");
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.inner.lock().state.is_advertising()
    }

    /// Empty when not advertising.
    pub fn advertising_service_id(&self) -> String {
        self.inner.lock().state.advertising_service_id()
    }

    pub fn advertised_mediums(&self) -> Vec<Medium> {
        self.inner.lock().state.advertised_mediums()
    }

    /// Options of the most recent advertisement, kept after it stops.
    pub fn advertising_options(&self) -> AdvertisingOptions {
        self.inner.lock().state.advertising_options().clone()
    }

    pub fn auto_upgrade_bandwidth(&self) -> bool {
        self.inner.lock().state.advertising_options().auto_upgrade_bandwidth
    }

    pub fn should_enforce_topology_constraints(&self) -> bool {
        self.inner
            .lock()
            .state
            .advertising_options()
            .enforce_topology_constraints
    }

    /// The listener passed to `start_advertising`, for binding to an
    /// incoming connection.
    pub fn advertising_connection_listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        let id = self.inner.lock().state.advertising_listener()?;
        self.dispatcher.connection_listener(id)
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    pub fn start_discovery(
        &self,
        service_id: &str,
        strategy: Strategy,
        listener: Arc<dyn DiscoveryListener>,
        mediums: &[Medium],
        options: DiscoveryOptions,
    ) {
        let listener_id = self.dispatcher.register_discovery(listener);
        let replaced = self.inner.lock().state.start_discovery(
            service_id,
            strategy,
            listener_id,
            mediums,
            options,
        );
        if let Some(old) = replaced {
            self.dispatcher.unregister_discovery(old);
        }
        tracing::info!(client_id = self.client_id, service_id, "discovery started");
    }

    pub fn stop_discovery(&self) {
        let released = {
            let mut inner = self.inner.lock();
            let released = inner.state.stop_discovery();
            inner.settle(self.client_id);
            released
        };
        if let Some(id) = released {
            self.dispatcher.unregister_discovery(id);
            tracing::info!(client_id = self.client_id, "discovery stopped");
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.inner.lock().state.is_discovering()
    }

    pub fn is_discovering_service_id(&self, service_id: &str) -> bool {
        self.inner.lock().state.is_discovering_service_id(service_id)
    }

    /// Empty when not discovering.
    pub fn discovery_service_id(&self) -> String {
        self.inner.lock().state.discovery_service_id()
    }

    pub fn discovered_mediums(&self) -> Vec<Medium> {
        self.inner.lock().state.discovered_mediums()
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        self.inner.lock().state.discovery_options().clone()
    }

    /// Returns whether the discovery listener was notified.
    pub fn on_endpoint_found(
        &self,
        service_id: &str,
        endpoint_id: &str,
        endpoint_info: &Bytes,
        medium: Medium,
    ) -> bool {
        let (sighting, listener) = {
            let mut inner = self.inner.lock();
            let sighting = inner.state.endpoint_found(service_id, endpoint_id);
            let listener = sighting
                .listener()
                .and_then(|id| self.dispatcher.discovery_listener(id));
            (sighting, listener)
        };
        match sighting {
            Sighting::Report(_) => {
                tracing::info!(
                    client_id = self.client_id,
                    service_id,
                    endpoint_id,
                    %medium,
                    "endpoint found"
                );
                self.dispatcher
                    .endpoint_found(listener, endpoint_id, endpoint_info, service_id)
            }
            Sighting::NotDiscovering => {
                tracing::warn!(
                    client_id = self.client_id,
                    service_id,
                    endpoint_id,
                    "endpoint found for a service not being discovered, ignoring"
                );
                false
            }
            Sighting::Repeated | Sighting::Unreported => {
                tracing::warn!(
                    client_id = self.client_id,
                    endpoint_id,
                    %medium,
                    "endpoint already reported, ignoring"
                );
                false
            }
        }
    }

    /// Returns whether the discovery listener was notified.
    pub fn on_endpoint_lost(&self, service_id: &str, endpoint_id: &str) -> bool {
        let (sighting, listener) = {
            let mut inner = self.inner.lock();
            let sighting = inner.state.endpoint_lost(service_id, endpoint_id);
            let listener = sighting
                .listener()
                .and_then(|id| self.dispatcher.discovery_listener(id));
            (sighting, listener)
        };
        match sighting {
            Sighting::Report(_) => {
                tracing::info!(
                    client_id = self.client_id,
                    service_id,
                    endpoint_id,
                    "endpoint lost"
                );
                self.dispatcher.endpoint_lost(listener, endpoint_id)
            }
            _ => {
                tracing::warn!(
                    client_id = self.client_id,
                    service_id,
                    endpoint_id,
                    "endpoint lost without being found, ignoring"
                );
                false
            }
        }
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    /// A transport established an encrypted channel with `endpoint_id`.
    /// Incoming connections get a fresh cancellation flag.
    pub fn on_connection_initiated(
        &self,
        endpoint_id: &str,
        info: &ConnectionResponseInfo,
        options: ConnectionOptions,
        listener: Arc<dyn ConnectionListener>,
        connection_token: &str,
    ) -> Result<(), SessionError> {
        let listener_id = self.dispatcher.register_connection(listener.clone());
        let connection =
            PendingConnection::new(endpoint_id, info, options, connection_token, listener_id);
        let inserted = {
            let mut inner = self.inner.lock();
            let inserted = inner.handshakes.insert(connection);
            if inserted.is_ok() && info.is_incoming_connection {
                inner.cancellation.add(endpoint_id);
            }
            inserted
        };
        if inserted.is_err() {
            self.dispatcher.unregister_connection(listener_id);
        }
        self.report(inserted)?;

        tracing::info!(
            client_id = self.client_id,
            endpoint_id,
            incoming = info.is_incoming_connection,
            auth = %hex::encode(&info.raw_authentication_token),
            "connection initiated"
        );
        // Dispatch on the caller's `Arc`: a racing disconnect may already have
        // unregistered `listener_id`.
        self.dispatcher
            .connection_initiated(Some(listener), endpoint_id, info);
        Ok(())
    }

    /// The local application accepted. Binds `listener` for payloads.
    pub fn local_endpoint_accepted_connection(
        &self,
        endpoint_id: &str,
        listener: Arc<dyn PayloadListener>,
    ) -> Result<(), SessionError> {
        let listener_id = self.dispatcher.register_payload(listener);
        let accepted = self
            .inner
            .lock()
            .handshakes
            .local_accepted(endpoint_id, listener_id);
        if accepted.is_err() {
            self.dispatcher.unregister_payload(listener_id);
        }
        self.report(accepted)?;
        tracing::info!(client_id = self.client_id, endpoint_id, "local endpoint accepted");
        Ok(())
    }

    pub fn local_endpoint_rejected_connection(
        &self,
        endpoint_id: &str,
    ) -> Result<(), SessionError> {
        let rejected = self.inner.lock().handshakes.local_rejected(endpoint_id);
        self.report(rejected)?;
        tracing::info!(client_id = self.client_id, endpoint_id, "local endpoint rejected");
        Ok(())
    }

    pub fn remote_endpoint_accepted_connection(
        &self,
        endpoint_id: &str,
    ) -> Result<(), SessionError> {
        let accepted = self.inner.lock().handshakes.remote_accepted(endpoint_id);
        self.report(accepted)?;
        tracing::info!(client_id = self.client_id, endpoint_id, "remote endpoint accepted");
        Ok(())
    }

    pub fn remote_endpoint_rejected_connection(
        &self,
        endpoint_id: &str,
    ) -> Result<(), SessionError> {
        let rejected = self.inner.lock().handshakes.remote_rejected(endpoint_id);
        self.report(rejected)?;
        tracing::info!(client_id = self.client_id, endpoint_id, "remote endpoint rejected");
        Ok(())
    }

    /// Both sides accepted; fire the accepted callback once.
    pub fn on_connection_accepted(&self, endpoint_id: &str) -> Result<(), SessionError> {
        let connected = {
            let mut inner = self.inner.lock();
            inner
                .handshakes
                .mark_connected(endpoint_id)
                .map(|id| self.dispatcher.connection_listener(id))
        };
        let listener = self.report(connected)?;
        tracing::info!(client_id = self.client_id, endpoint_id, "connection accepted");
        self.dispatcher.connection_accepted(listener, endpoint_id);
        Ok(())
    }

    /// A side rejected; drop the record and fire the rejected callback once.
    pub fn on_connection_rejected(
        &self,
        endpoint_id: &str,
        status: Status,
    ) -> Result<(), SessionError> {
        let taken = {
            let mut inner = self.inner.lock();
            let taken = inner
                .handshakes
                .take_rejected(endpoint_id)
                .map(|connection| self.with_listener(connection));
            if taken.is_ok() {
                inner.cancellation.cancel(endpoint_id);
                inner.settle(self.client_id);
            }
            taken
        };
        let (connection, listener) = self.report(taken)?;
        tracing::info!(client_id = self.client_id, endpoint_id, ?status, "connection rejected");
        self.dispatcher
            .connection_rejected(listener, endpoint_id, status);
        self.release(&connection);
        Ok(())
    }

    /// Informational; connection state is unchanged.
    pub fn on_bandwidth_changed(
        &self,
        endpoint_id: &str,
        medium: Medium,
    ) -> Result<(), SessionError> {
        let listener = {
            let inner = self.inner.lock();
            inner
                .handshakes
                .lookup(endpoint_id)
                .map(|c| self.dispatcher.connection_listener(c.connection_listener()))
        };
        let listener = self.report(listener)?;
        tracing::info!(client_id = self.client_id, endpoint_id, %medium, "bandwidth changed");
        self.dispatcher
            .bandwidth_changed(listener, endpoint_id, medium);
        Ok(())
    }

    /// The channel to `endpoint_id` is gone. A tracked cancellation flag is
    /// set even when no record exists, so in-flight work still observes it.
    /// An endpoint with neither leaves no flag behind.
    pub fn on_disconnected(&self, endpoint_id: &str, notify: bool) -> Result<(), SessionError> {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.handshakes.remove(endpoint_id);
            if removed.is_some() {
                inner.cancellation.cancel(endpoint_id);
            } else {
                inner.cancellation.cancel_tracked(endpoint_id);
            }
            inner.settle(self.client_id);
            removed
                .map(|connection| self.with_listener(connection))
                .ok_or_else(|| SessionError::UnknownEndpoint(endpoint_id.to_string()))
        };
        let (connection, listener) = self.report(removed)?;
        tracing::info!(client_id = self.client_id, endpoint_id, notify, "disconnected");
        if notify {
            self.dispatcher.disconnected(listener, endpoint_id);
        }
        self.release(&connection);
        Ok(())
    }

    pub fn on_payload(&self, endpoint_id: &str, payload: Payload) -> Result<(), SessionError> {
        let listener = self.payload_listener(endpoint_id);
        let listener = self.report(listener)?;
        tracing::debug!(
            client_id = self.client_id,
            endpoint_id,
            payload_id = payload.id,
            size = payload.size(),
            "payload received"
        );
        self.dispatcher.payload(listener, endpoint_id, payload);
        Ok(())
    }

    pub fn on_payload_progress(
        &self,
        endpoint_id: &str,
        info: &PayloadProgressInfo,
    ) -> Result<(), SessionError> {
        let listener = self.payload_listener(endpoint_id);
        let listener = self.report(listener)?;
        if info.status.is_terminal() {
            tracing::info!(
                client_id = self.client_id,
                endpoint_id,
                payload_id = info.payload_id,
                status = ?info.status,
                bytes = info.bytes_transferred,
                "payload transfer finished"
            );
        } else {
            tracing::trace!(
                endpoint_id,
                payload_id = info.payload_id,
                bytes = info.bytes_transferred,
                total = info.total_bytes,
                "payload progress"
            );
        }
        self.dispatcher.payload_progress(listener, endpoint_id, info);
        Ok(())
    }

    /// Resolved under the session lock, so a racing disconnect cannot
    /// unregister it between the lookup and the dispatch.
    fn payload_listener(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<Arc<dyn PayloadListener>>, SessionError> {
        let inner = self.inner.lock();
        let id = inner
            .handshakes
            .lookup(endpoint_id)?
            .payload_listener()
            .ok_or_else(|| SessionError::NotLocallyAccepted(endpoint_id.to_string()))?;
        Ok(self.dispatcher.payload_listener(id))
    }

    // ── Handshake queries ─────────────────────────────────────────────────────

    /// True while a record exists for `endpoint_id`, connected or not.
    pub fn has_pending_connection_to_endpoint(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.contains(endpoint_id)
    }

    pub fn has_local_endpoint_responded(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.has_local_responded(endpoint_id)
    }

    pub fn has_remote_endpoint_responded(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.has_remote_responded(endpoint_id)
    }

    pub fn local_connection_is_accepted(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.local_is_accepted(endpoint_id)
    }

    pub fn remote_connection_is_accepted(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.remote_is_accepted(endpoint_id)
    }

    pub fn is_connection_accepted(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.is_accepted(endpoint_id)
    }

    pub fn is_connection_rejected(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.is_rejected(endpoint_id)
    }

    pub fn is_connected_to_endpoint(&self, endpoint_id: &str) -> bool {
        self.inner.lock().handshakes.is_connected(endpoint_id)
    }

    pub fn handshake_state(&self, endpoint_id: &str) -> Option<HandshakeState> {
        self.inner.lock().handshakes.state(endpoint_id)
    }

    pub fn connected_endpoints(&self) -> Vec<String> {
        self.inner.lock().handshakes.connected_endpoints()
    }

    /// Endpoints still in the handshake.
    pub fn pending_connected_endpoints(&self) -> Vec<String> {
        self.inner.lock().handshakes.pending_endpoints()
    }

    pub fn num_incoming_connections(&self) -> usize {
        self.inner.lock().handshakes.count_connected(true)
    }

    pub fn num_outgoing_connections(&self) -> usize {
        self.inner.lock().handshakes.count_connected(false)
    }

    pub fn connection_token(&self, endpoint_id: &str) -> Option<String> {
        self.inner
            .lock()
            .handshakes
            .get(endpoint_id)
            .map(|c| c.connection_token().to_string())
    }

    /// Mediums the connection may be upgraded to.
    pub fn upgrade_mediums(&self, endpoint_id: &str) -> Vec<Medium> {
        self.inner
            .lock()
            .handshakes
            .get(endpoint_id)
            .map(|c| c.connection_options().allowed.mediums())
            .unwrap_or_default()
    }

    pub fn is_incoming_connection(&self, endpoint_id: &str) -> bool {
        self.inner
            .lock()
            .handshakes
            .get(endpoint_id)
            .is_some_and(PendingConnection::is_incoming_connection)
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Arm a not-cancelled flag for a new attempt with `endpoint_id`.
    pub fn add_cancellation_flag(&self, endpoint_id: &str) {
        self.inner.lock().cancellation.add(endpoint_id);
    }

    pub fn cancellation_flag(&self, endpoint_id: &str) -> CancellationFlag {
        self.inner.lock().cancellation.get(endpoint_id)
    }

    /// Returns whether the cancellation was applied.
    pub fn cancel_endpoint(&self, endpoint_id: &str) -> bool {
        let applied = self.inner.lock().cancellation.cancel(endpoint_id);
        if applied {
            tracing::info!(client_id = self.client_id, endpoint_id, "endpoint cancelled");
        }
        applied
    }

    /// Returns how many flags were cancelled and dropped.
    pub fn cancel_all_endpoints(&self) -> usize {
        let count = self.inner.lock().cancellation.cancel_all();
        if count > 0 {
            tracing::info!(client_id = self.client_id, count, "cancelled all endpoints");
        }
        count
    }

    // ── Status ────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        let mut connections: Vec<ConnectionSnapshot> =
            inner.handshakes.iter().map(ConnectionSnapshot::from).collect();
        connections.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
        SessionSnapshot {
            client_id: self.client_id,
            local_endpoint_id: inner.state.current_local_endpoint_id().map(str::to_string),
            advertising: inner.state.is_advertising(),
            advertising_service_id: inner.state.advertising_service_id(),
            discovering: inner.state.is_discovering(),
            discovery_service_id: inner.state.discovery_service_id(),
            discovered_endpoints: inner.state.discovered_endpoint_ids(),
            connections,
            cancellation_flags: inner.cancellation.len(),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Pair a record leaving the registry with its connection listener.
    /// Call with the session lock held.
    fn with_listener(
        &self,
        connection: PendingConnection,
    ) -> (PendingConnection, Option<Arc<dyn ConnectionListener>>) {
        let listener = self
            .dispatcher
            .connection_listener(connection.connection_listener());
        (connection, listener)
    }

    fn release(&self, connection: &PendingConnection) {
        let (connection_listener, payload_listener) = connection.listeners();
        self.dispatcher.unregister_connection(connection_listener);
        if let Some(id) = payload_listener {
            self.dispatcher.unregister_payload(id);
        }
    }

    /// Log caller misuse before handing it back.
    fn report<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result {
            tracing::error!(
                client_id = self.client_id,
                endpoint_id = e.endpoint_id(),
                error = %e,
                "session call rejected"
            );
        }
        result
    }
}
