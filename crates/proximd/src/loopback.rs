//! In-process loopback medium.
//!
//! Each peer is a tokio task draining one unbounded inbox. The inbox carries
//! both frames from the other peer and events its own listeners relay out of
//! session callbacks. Callbacks are synchronous and must not block, so a
//! relay listener only enqueues.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;

use proxim_core::config::LoopbackConfig;
use proxim_core::{
    AdvertisingOptions, ConnectionOptions, ConnectionResponseInfo, DiscoveryOptions, Medium,
    Payload, PayloadBody, PayloadProgressInfo, PayloadStatus, Status, Strategy,
};
use proxim_session::{ClientSession, ConnectionListener, DiscoveryListener, PayloadListener};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
const MEDIUMS: [Medium; 2] = [Medium::Bluetooth, Medium::WifiLan];

#[derive(Debug)]
enum Event {
    // ── Frames from the other peer ──
    Beacon { endpoint_id: String, info: Bytes },
    Request { endpoint_id: String, info: Bytes, auth: Bytes },
    Accept { endpoint_id: String },
    Data { endpoint_id: String, payload: Payload },
    Hangup { endpoint_id: String },

    // ── Relayed from our own listeners ──
    Found { endpoint_id: String, info: Bytes },
    Initiated { endpoint_id: String },
    Connected { endpoint_id: String },
    Received { endpoint_id: String, payload: Payload },
    Rejected { endpoint_id: String, status: Status },
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

/// Forwards session callbacks into the owning peer's inbox.
struct Relay(mpsc::UnboundedSender<Event>);

impl Relay {
    fn forward(&self, event: Event) {
        // The peer may already have finished; late callbacks are dropped.
        let _ = self.0.send(event);
    }
}

impl DiscoveryListener for Relay {
    fn on_endpoint_found(&self, endpoint_id: &str, endpoint_info: &Bytes, _service_id: &str) {
        self.forward(Event::Found {
            endpoint_id: endpoint_id.to_string(),
            info: endpoint_info.clone(),
        });
    }
}

impl ConnectionListener for Relay {
    fn on_initiated(&self, endpoint_id: &str, _info: &ConnectionResponseInfo) {
        self.forward(Event::Initiated {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    fn on_accepted(&self, endpoint_id: &str) {
        self.forward(Event::Connected {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    fn on_rejected(&self, endpoint_id: &str, status: Status) {
        self.forward(Event::Rejected {
            endpoint_id: endpoint_id.to_string(),
            status,
        });
    }
}

impl PayloadListener for Relay {
    fn on_payload(&self, endpoint_id: &str, payload: Payload) {
        self.forward(Event::Received {
            endpoint_id: endpoint_id.to_string(),
            payload,
        });
    }
}

struct Peer {
    name: String,
    service_id: String,
    session: Arc<ClientSession>,
    /// Our own inbox, handed to listeners.
    inbox: mpsc::UnboundedSender<Event>,
    /// The other peer's inbox.
    wire: mpsc::UnboundedSender<Event>,
    /// Sent once connected. Only the discoverer has one.
    message: Option<String>,
}

impl Peer {
    fn relay(&self) -> Arc<Relay> {
        Arc::new(Relay(self.inbox.clone()))
    }

    fn send(&self, event: Event) -> Result<()> {
        self.wire
            .send(event)
            .map_err(|_| anyhow!("{}: peer inbox closed", self.name))
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<Event>) -> Result<()> {
        while let Some(event) = inbox.recv().await {
            if self.handle(event)? == Flow::Done {
                break;
            }
        }
        tracing::debug!(peer = %self.name, "loopback peer finished");
        Ok(())
    }

    fn handle(&self, event: Event) -> Result<Flow> {
        let session = &self.session;
        match event {
            Event::Beacon { endpoint_id, info } => {
                session.on_endpoint_found(&self.service_id, &endpoint_id, &info, Medium::Bluetooth);
            }
            Event::Found { endpoint_id, info } => {
                let local = session.local_endpoint_id();
                let auth = auth_token(&local, &endpoint_id);
                self.send(Event::Request {
                    endpoint_id: local,
                    info: Bytes::from(self.name.clone()),
                    auth: auth.clone(),
                })?;
                let response = ConnectionResponseInfo {
                    remote_endpoint_info: info,
                    authentication_token: short_token(&auth),
                    raw_authentication_token: auth.clone(),
                    is_incoming_connection: false,
                    is_connection_verified: false,
                };
                session.on_connection_initiated(
                    &endpoint_id,
                    &response,
                    ConnectionOptions::default(),
                    self.relay(),
                    &hex::encode(&auth),
                )?;
            }
            Event::Request {
                endpoint_id,
                info,
                auth,
            } => {
                let listener = session
                    .advertising_connection_listener()
                    .context("connection request while not advertising")?;
                let response = ConnectionResponseInfo {
                    remote_endpoint_info: info,
                    authentication_token: short_token(&auth),
                    raw_authentication_token: auth.clone(),
                    is_incoming_connection: true,
                    is_connection_verified: false,
                };
                session.on_connection_initiated(
                    &endpoint_id,
                    &response,
                    ConnectionOptions::default(),
                    listener,
                    &hex::encode(&auth),
                )?;
            }
            Event::Initiated { endpoint_id } => {
                session.local_endpoint_accepted_connection(&endpoint_id, self.relay())?;
                self.send(Event::Accept {
                    endpoint_id: session.local_endpoint_id(),
                })?;
                self.try_connect(&endpoint_id)?;
            }
            Event::Accept { endpoint_id } => {
                session.remote_endpoint_accepted_connection(&endpoint_id)?;
                self.try_connect(&endpoint_id)?;
            }
            Event::Connected { endpoint_id } => {
                tracing::info!(peer = %self.name, endpoint_id = %endpoint_id, "connected");
                if let Some(message) = &self.message {
                    self.send(Event::Data {
                        endpoint_id: session.local_endpoint_id(),
                        payload: Payload::bytes(1, message.clone()),
                    })?;
                }
            }
            Event::Data {
                endpoint_id,
                payload,
            } => {
                let progress = PayloadProgressInfo {
                    payload_id: payload.id,
                    status: PayloadStatus::Success,
                    total_bytes: payload.size(),
                    bytes_transferred: payload.size(),
                };
                session.on_payload(&endpoint_id, payload)?;
                session.on_payload_progress(&endpoint_id, &progress)?;
            }
            Event::Received {
                endpoint_id,
                payload,
            } => {
                if let PayloadBody::Bytes(data) = &payload.body {
                    tracing::info!(
                        peer = %self.name,
                        from = %endpoint_id,
                        text = %String::from_utf8_lossy(data),
                        "payload delivered"
                    );
                }
                self.send(Event::Hangup {
                    endpoint_id: session.local_endpoint_id(),
                })?;
                session.on_disconnected(&endpoint_id, true)?;
                return Ok(Flow::Done);
            }
            Event::Hangup { endpoint_id } => {
                session.on_disconnected(&endpoint_id, true)?;
                return Ok(Flow::Done);
            }
            Event::Rejected {
                endpoint_id,
                status,
            } => {
                tracing::warn!(
                    peer = %self.name,
                    endpoint_id = %endpoint_id,
                    ?status,
                    "connection rejected"
                );
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Continue)
    }

    fn try_connect(&self, endpoint_id: &str) -> Result<()> {
        if self.session.is_connection_accepted(endpoint_id)
            && !self.session.is_connected_to_endpoint(endpoint_id)
        {
            self.session.on_connection_accepted(endpoint_id)?;
        }
        Ok(())
    }
}

fn auth_token(a: &str, b: &str) -> Bytes {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    Bytes::from([lo.as_bytes(), hi.as_bytes()].concat())
}

/// Four-digit code shown to users for out-of-band verification.
fn short_token(auth: &Bytes) -> String {
    let sum: u32 = auth.iter().map(|b| u32::from(*b)).sum();
    format!("{:04}", sum % 10_000)
}

/// Drive one advertise → discover → connect → payload → hangup exchange.
pub async fn run(
    config: &LoopbackConfig,
    advertiser: Arc<ClientSession>,
    discoverer: Arc<ClientSession>,
) -> Result<()> {
    let (adv_tx, adv_rx) = mpsc::unbounded_channel();
    let (disc_tx, disc_rx) = mpsc::unbounded_channel();

    let adv = Peer {
        name: config.advertiser_name.clone(),
        service_id: config.service_id.clone(),
        session: advertiser,
        inbox: adv_tx.clone(),
        wire: disc_tx.clone(),
        message: None,
    };
    let disc = Peer {
        name: config.discoverer_name.clone(),
        service_id: config.service_id.clone(),
        session: discoverer,
        inbox: disc_tx.clone(),
        wire: adv_tx,
        message: Some(config.message.clone()),
    };

    let options = AdvertisingOptions {
        strategy: Strategy::PointToPoint,
        ..Default::default()
    };
    let advertised_id = adv.session.start_advertising(
        &config.service_id,
        Strategy::PointToPoint,
        adv.relay(),
        &MEDIUMS,
        options,
    );
    disc.session.start_discovery(
        &config.service_id,
        Strategy::PointToPoint,
        disc.relay(),
        &MEDIUMS,
        DiscoveryOptions {
            strategy: Strategy::PointToPoint,
            ..Default::default()
        },
    );

    // The advertiser's beacon is heard once.
    disc_tx
        .send(Event::Beacon {
            endpoint_id: advertised_id,
            info: Bytes::from(config.advertiser_name.clone()),
        })
        .map_err(|_| anyhow!("discoverer inbox closed"))?;

    let advertiser = adv.session.clone();
    let discoverer = disc.session.clone();
    let adv_task = tokio::spawn(adv.run(adv_rx));
    let disc_task = tokio::spawn(disc.run(disc_rx));

    let (adv_result, disc_result) =
        tokio::time::timeout(EXCHANGE_TIMEOUT, async { tokio::try_join!(adv_task, disc_task) })
            .await
            .context("loopback exchange timed out")?
            .context("loopback peer task panicked")?;
    adv_result?;
    disc_result?;

    advertiser.stop_advertising();
    discoverer.stop_discovery();
    Ok(())
}
