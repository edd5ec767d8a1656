//! Proxim integration test harness.
//!
//! Everything runs in-process. Sessions are wired together by hand, a
//! recording listener stands in for the application, and a manual clock
//! stands in for time, so no test sleeps.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

pub use proxim_core::{
    AdvertisingOptions, ConnectionOptions, ConnectionResponseInfo, DiscoveryOptions, Medium,
    Payload, PayloadProgressInfo, PayloadStatus, SessionError, Status, Strategy,
};
pub use proxim_session::{
    ClientSession, ConnectionListener, DiscoveryListener, HandshakeState, ManualClock,
    PayloadListener,
};

mod cancellation;
mod concurrency;
mod identity;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const SERVICE: &str = "com.proxim.test";

/// One callback, as the application saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Found(String),
    Lost(String),
    Initiated(String),
    Accepted(String),
    Rejected(String, Status),
    Disconnected(String),
    Bandwidth(String, Medium),
    Payload(String, i64),
    Progress(String, PayloadStatus),
}

/// Records every callback it receives, in order.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(*e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl DiscoveryListener for Recorder {
    fn on_endpoint_found(&self, endpoint_id: &str, _info: &Bytes, _service_id: &str) {
        self.push(Event::Found(endpoint_id.into()));
    }
    fn on_endpoint_lost(&self, endpoint_id: &str) {
        self.push(Event::Lost(endpoint_id.into()));
    }
}

impl ConnectionListener for Recorder {
    fn on_initiated(&self, endpoint_id: &str, _info: &ConnectionResponseInfo) {
        self.push(Event::Initiated(endpoint_id.into()));
    }
    fn on_accepted(&self, endpoint_id: &str) {
        self.push(Event::Accepted(endpoint_id.into()));
    }
    fn on_rejected(&self, endpoint_id: &str, status: Status) {
        self.push(Event::Rejected(endpoint_id.into(), status));
    }
    fn on_disconnected(&self, endpoint_id: &str) {
        self.push(Event::Disconnected(endpoint_id.into()));
    }
    fn on_bandwidth_changed(&self, endpoint_id: &str, medium: Medium) {
        self.push(Event::Bandwidth(endpoint_id.into(), medium));
    }
}

impl PayloadListener for Recorder {
    fn on_payload(&self, endpoint_id: &str, payload: Payload) {
        self.push(Event::Payload(endpoint_id.into(), payload.id));
    }
    fn on_payload_progress(&self, endpoint_id: &str, info: &PayloadProgressInfo) {
        self.push(Event::Progress(endpoint_id.into(), info.status));
    }
}

/// A session whose identity cache runs on a manual clock.
pub fn session_with_clock() -> (ClientSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let session = ClientSession::builder().clock(clock.clone()).build();
    (session, clock)
}

/// Full power with Bluetooth allowed.
pub fn high_visibility() -> AdvertisingOptions {
    AdvertisingOptions {
        strategy: Strategy::Cluster,
        ..Default::default()
    }
}

pub fn low_power() -> AdvertisingOptions {
    AdvertisingOptions {
        low_power: true,
        ..high_visibility()
    }
}

pub fn no_bluetooth() -> AdvertisingOptions {
    let mut options = high_visibility();
    options.allowed.bluetooth = false;
    options
}

pub fn advertise(session: &ClientSession, options: AdvertisingOptions) -> String {
    session.start_advertising(
        SERVICE,
        Strategy::Cluster,
        Recorder::new(),
        &[Medium::Bluetooth, Medium::Ble],
        options,
    )
}

pub fn discover(session: &ClientSession, listener: Arc<Recorder>) {
    session.start_discovery(
        SERVICE,
        Strategy::Cluster,
        listener,
        &[Medium::Ble],
        DiscoveryOptions::default(),
    );
}

pub fn response_info(incoming: bool) -> ConnectionResponseInfo {
    ConnectionResponseInfo {
        remote_endpoint_info: Bytes::from_static(b"remote"),
        authentication_token: "0420".into(),
        raw_authentication_token: Bytes::from_static(b"\x01\xa4"),
        is_incoming_connection: incoming,
        is_connection_verified: false,
    }
}

/// Initiate a connection to `endpoint_id`, recording into a new listener.
pub fn initiate(session: &ClientSession, endpoint_id: &str, incoming: bool) -> Arc<Recorder> {
    let listener = Recorder::new();
    session
        .on_connection_initiated(
            endpoint_id,
            &response_info(incoming),
            ConnectionOptions::default(),
            listener.clone(),
            "token",
        )
        .unwrap();
    listener
}

/// Drive an initiated connection all the way to connected.
pub fn connect(session: &ClientSession, endpoint_id: &str, payloads: Arc<Recorder>) {
    session
        .local_endpoint_accepted_connection(endpoint_id, payloads)
        .unwrap();
    session.remote_endpoint_accepted_connection(endpoint_id).unwrap();
    session.on_connection_accepted(endpoint_id).unwrap();
}
