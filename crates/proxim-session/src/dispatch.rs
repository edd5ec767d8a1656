//! Routes transport events and handshake transitions to application listeners.
//!
//! Listeners live in registries keyed by an opaque [`ListenerId`]. Session
//! state stores ids, never listener references. The session resolves an id to
//! its `Arc` while it still holds its own lock, in the same critical section
//! that applies the transition, and dispatches on that `Arc` after unlocking.
//! Unregistering an id therefore stops future resolutions but never cancels a
//! dispatch that was already resolved.
//!
//! Every dispatch is synchronous and runs on the caller's thread. No shard
//! lock is held while application code runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use proxim_core::{ConnectionResponseInfo, Medium, Payload, PayloadProgressInfo, Status};

// ── Listener traits ───────────────────────────────────────────────────────────

/// Discovery callbacks. Every method defaults to a no-op.
pub trait DiscoveryListener: Send + Sync {
    fn on_endpoint_found(&self, _endpoint_id: &str, _endpoint_info: &Bytes, _service_id: &str) {}
    fn on_endpoint_lost(&self, _endpoint_id: &str) {}
}

/// Connection lifecycle callbacks. Every method defaults to a no-op.
pub trait ConnectionListener: Send + Sync {
    /// An encrypted channel exists; both sides must now accept or reject.
    fn on_initiated(&self, _endpoint_id: &str, _info: &ConnectionResponseInfo) {}
    /// Both sides accepted. Payloads may flow.
    fn on_accepted(&self, _endpoint_id: &str) {}
    /// Either side rejected.
    fn on_rejected(&self, _endpoint_id: &str, _status: Status) {}
    fn on_disconnected(&self, _endpoint_id: &str) {}
    fn on_bandwidth_changed(&self, _endpoint_id: &str, _medium: Medium) {}
}

/// Payload callbacks, bound when the local side accepts a connection.
pub trait PayloadListener: Send + Sync {
    fn on_payload(&self, _endpoint_id: &str, _payload: Payload) {}
    fn on_payload_progress(&self, _endpoint_id: &str, _info: &PayloadProgressInfo) {}
}

// ── Registry ──────────────────────────────────────────────────────────────────

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a registered listener. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub struct ListenerRegistry<L: ?Sized> {
    entries: DashMap<ListenerId, Arc<L>>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn register(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.insert(id, listener);
        id
    }

    /// Idempotent. Returns whether a listener was removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn get(&self, id: ListenerId) -> Option<Arc<L>> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Run `f` against a resolved listener. `None` is a no-op. Returns whether `f`
/// ran.
fn fire<L: ?Sized>(listener: Option<Arc<L>>, f: impl FnOnce(&L)) -> bool {
    match listener {
        Some(listener) => {
            f(&*listener);
            true
        }
        None => false,
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct NotificationDispatcher {
    discovery: ListenerRegistry<dyn DiscoveryListener>,
    connection: ListenerRegistry<dyn ConnectionListener>,
    payload: ListenerRegistry<dyn PayloadListener>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_discovery(&self, listener: Arc<dyn DiscoveryListener>) -> ListenerId {
        self.discovery.register(listener)
    }

    pub fn register_connection(&self, listener: Arc<dyn ConnectionListener>) -> ListenerId {
        self.connection.register(listener)
    }

    pub fn register_payload(&self, listener: Arc<dyn PayloadListener>) -> ListenerId {
        self.payload.register(listener)
    }

    pub fn unregister_discovery(&self, id: ListenerId) -> bool {
        self.discovery.unregister(id)
    }

    pub fn unregister_connection(&self, id: ListenerId) -> bool {
        self.connection.unregister(id)
    }

    pub fn unregister_payload(&self, id: ListenerId) -> bool {
        self.payload.unregister(id)
    }

    pub fn discovery_listener(&self, id: ListenerId) -> Option<Arc<dyn DiscoveryListener>> {
        self.discovery.get(id)
    }

    pub fn connection_listener(&self, id: ListenerId) -> Option<Arc<dyn ConnectionListener>> {
        self.connection.get(id)
    }

    pub fn payload_listener(&self, id: ListenerId) -> Option<Arc<dyn PayloadListener>> {
        self.payload.get(id)
    }

    /// Registered listeners across all three registries.
    pub fn listener_count(&self) -> usize {
        self.discovery.len() + self.connection.len() + self.payload.len()
    }

    pub fn clear(&self) {
        self.discovery.clear();
        self.connection.clear();
        self.payload.clear();
    }

    pub fn endpoint_found(
        &self,
        listener: Option<Arc<dyn DiscoveryListener>>,
        endpoint_id: &str,
        endpoint_info: &Bytes,
        service_id: &str,
    ) -> bool {
        fire(listener, |l| l.on_endpoint_found(endpoint_id, endpoint_info, service_id))
    }

    pub fn endpoint_lost(
        &self,
        listener: Option<Arc<dyn DiscoveryListener>>,
        endpoint_id: &str,
    ) -> bool {
        fire(listener, |l| l.on_endpoint_lost(endpoint_id))
    }

    pub fn connection_initiated(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
        endpoint_id: &str,
        info: &ConnectionResponseInfo,
    ) -> bool {
        fire(listener, |l| l.on_initiated(endpoint_id, info))
    }

    pub fn connection_accepted(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
        endpoint_id: &str,
    ) -> bool {
        fire(listener, |l| l.on_accepted(endpoint_id))
    }

    pub fn connection_rejected(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
        endpoint_id: &str,
        status: Status,
    ) -> bool {
        fire(listener, |l| l.on_rejected(endpoint_id, status))
    }

    pub fn disconnected(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
        endpoint_id: &str,
    ) -> bool {
        fire(listener, |l| l.on_disconnected(endpoint_id))
    }

    pub fn bandwidth_changed(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
        endpoint_id: &str,
        medium: Medium,
    ) -> bool {
        fire(listener, |l| l.on_bandwidth_changed(endpoint_id, medium))
    }

    pub fn payload(
        &self,
        listener: Option<Arc<dyn PayloadListener>>,
        endpoint_id: &str,
        payload: Payload,
    ) -> bool {
        fire(listener, |l| l.on_payload(endpoint_id, payload))
    }

    pub fn payload_progress(
        &self,
        listener: Option<Arc<dyn PayloadListener>>,
        endpoint_id: &str,
        info: &PayloadProgressInfo,
    ) -> bool {
        fire(listener, |l| l.on_payload_progress(endpoint_id, info))
    }
}
