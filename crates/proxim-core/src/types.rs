//! Value types exchanged between transports, the session manager, and the
//! application.
//!
//! Nothing here knows how bytes move. Mediums are named, not implemented.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Mediums ───────────────────────────────────────────────────────────────────

/// A physical transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    #[default]
    Unknown,
    Bluetooth,
    Ble,
    WifiLan,
    WebRtc,
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Medium::Unknown => "unknown",
            Medium::Bluetooth => "bluetooth",
            Medium::Ble => "ble",
            Medium::WifiLan => "wifi_lan",
            Medium::WebRtc => "web_rtc",
        };
        f.write_str(name)
    }
}

/// Which mediums an operation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediumSelector {
    pub bluetooth: bool,
    pub ble: bool,
    pub wifi_lan: bool,
    pub web_rtc: bool,
}

impl Default for MediumSelector {
    fn default() -> Self {
        Self::all()
    }
}

impl MediumSelector {
    pub fn all() -> Self {
        Self {
            bluetooth: true,
            ble: true,
            wifi_lan: true,
            web_rtc: true,
        }
    }

    pub fn none() -> Self {
        Self {
            bluetooth: false,
            ble: false,
            wifi_lan: false,
            web_rtc: false,
        }
    }

    pub fn allows(&self, medium: Medium) -> bool {
        match medium {
            Medium::Bluetooth => self.bluetooth,
            Medium::Ble => self.ble,
            Medium::WifiLan => self.wifi_lan,
            Medium::WebRtc => self.web_rtc,
            Medium::Unknown => false,
        }
    }

    /// Allowed mediums, in a stable order.
    pub fn mediums(&self) -> Vec<Medium> {
        [Medium::Bluetooth, Medium::Ble, Medium::WifiLan, Medium::WebRtc]
            .into_iter()
            .filter(|m| self.allows(*m))
            .collect()
    }
}

// ── Strategy ──────────────────────────────────────────────────────────────────

/// Connection topology a service operates under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// No topology requested. Topology enforcement and bandwidth upgrades
    /// default to on.
    #[default]
    Unspecified,
    /// M-to-N.
    Cluster,
    /// 1-to-N.
    Star,
    /// 1-to-1.
    PointToPoint,
}

impl Strategy {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Strategy::Unspecified)
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingOptions {
    pub strategy: Strategy,
    pub allowed: MediumSelector,
    /// Advertise at reduced power. Disables identity caching.
    pub low_power: bool,
    pub auto_upgrade_bandwidth: bool,
    pub enforce_topology_constraints: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub strategy: Strategy,
    pub allowed: MediumSelector,
    pub low_power: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Mediums this connection may later be upgraded to.
    pub allowed: MediumSelector,
    pub low_power: bool,
    pub keep_alive_interval_millis: u32,
    pub keep_alive_timeout_millis: u32,
}

/// What a transport learned while the encrypted channel was set up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionResponseInfo {
    /// Opaque, typically a human-readable name.
    pub remote_endpoint_info: Bytes,
    /// Short digits both users can compare.
    pub authentication_token: String,
    pub raw_authentication_token: Bytes,
    pub is_incoming_connection: bool,
    pub is_connection_verified: bool,
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Outcome reported to a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
    ConnectionRejected,
    EndpointUnknown,
    EndpointIoError,
    Timeout,
    Cancelled,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    Bytes(Bytes),
    File { path: PathBuf, size: u64 },
}

/// Data delivered to a connected endpoint's payload listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub id: i64,
    pub body: PayloadBody,
}

impl Payload {
    pub fn bytes(id: i64, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: PayloadBody::Bytes(data.into()),
        }
    }

    pub fn file(id: i64, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            id,
            body: PayloadBody::File {
                path: path.into(),
                size,
            },
        }
    }

    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        match &self.body {
            PayloadBody::Bytes(b) => b.len() as u64,
            PayloadBody::File { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStatus {
    Success,
    Failure,
    InProgress,
    Canceled,
}

impl PayloadStatus {
    /// True once no further progress will be reported.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PayloadStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadProgressInfo {
    pub payload_id: i64,
    pub status: PayloadStatus,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
}
