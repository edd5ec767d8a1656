//! Handshake state for every remote endpoint being connected to.
//!
//! Local and remote responses are independent. Either order is legal:
//!
//! ```text
//! NONE ──initiated──▶ INITIATED
//! INITIATED ──local/remote accept──▶ LOCAL_ACCEPTED | REMOTE_ACCEPTED ──▶ BOTH_ACCEPTED
//! BOTH_ACCEPTED ──connection accepted──▶ CONNECTED ──disconnected──▶ (removed)
//! any side REJECTED ──connection rejected──▶ (removed)
//! ```
//!
//! Each response moves away from `Unresponded` at most once. A reject on
//! either side decides the outcome no matter what the other side says.
//!
//! The registry is a plain map; the owning session serializes access.

use std::collections::HashMap;

use bytes::Bytes;
use proxim_core::{ConnectionOptions, ConnectionResponseInfo, ResponseSide, SessionError};
use serde::Serialize;

use crate::dispatch::ListenerId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    #[default]
    Unresponded,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    Initiated,
    LocalAccepted,
    LocalRejected,
    RemoteAccepted,
    RemoteRejected,
    /// Both sides accepted; waiting for the transport to confirm.
    BothAccepted,
    Connected,
}

/// One remote endpoint in a handshake or connected.
#[derive(Debug, Clone)]
pub struct PendingConnection {
    endpoint_id: String,
    remote_endpoint_info: Bytes,
    authentication_token: String,
    raw_authentication_token: Bytes,
    is_incoming_connection: bool,
    connection_token: String,
    connection_options: ConnectionOptions,
    local_response: Response,
    remote_response: Response,
    connected: bool,
    connection_listener: ListenerId,
    payload_listener: Option<ListenerId>,
}

impl PendingConnection {
    pub fn new(
        endpoint_id: &str,
        info: &ConnectionResponseInfo,
        connection_options: ConnectionOptions,
        connection_token: &str,
        connection_listener: ListenerId,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            remote_endpoint_info: info.remote_endpoint_info.clone(),
            authentication_token: info.authentication_token.clone(),
            raw_authentication_token: info.raw_authentication_token.clone(),
            is_incoming_connection: info.is_incoming_connection,
            connection_token: connection_token.to_string(),
            connection_options,
            local_response: Response::Unresponded,
            remote_response: Response::Unresponded,
            connected: false,
            connection_listener,
            payload_listener: None,
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn remote_endpoint_info(&self) -> &Bytes {
        &self.remote_endpoint_info
    }

    pub fn authentication_token(&self) -> &str {
        &self.authentication_token
    }

    pub fn raw_authentication_token(&self) -> &Bytes {
        &self.raw_authentication_token
    }

    pub fn is_incoming_connection(&self) -> bool {
        self.is_incoming_connection
    }

    pub fn connection_token(&self) -> &str {
        &self.connection_token
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.connection_options
    }

    pub fn local_response(&self) -> Response {
        self.local_response
    }

    pub fn remote_response(&self) -> Response {
        self.remote_response
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connection_listener(&self) -> ListenerId {
        self.connection_listener
    }

    pub fn payload_listener(&self) -> Option<ListenerId> {
        self.payload_listener
    }

    /// Listeners owned by this record.
    pub fn listeners(&self) -> (ListenerId, Option<ListenerId>) {
        (self.connection_listener, self.payload_listener)
    }

    pub fn is_accepted(&self) -> bool {
        self.local_response == Response::Accepted && self.remote_response == Response::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.local_response == Response::Rejected || self.remote_response == Response::Rejected
    }

    pub fn state(&self) -> HandshakeState {
        if self.connected {
            return HandshakeState::Connected;
        }
        match (self.local_response, self.remote_response) {
            (Response::Rejected, _) => HandshakeState::LocalRejected,
            (_, Response::Rejected) => HandshakeState::RemoteRejected,
            (Response::Accepted, Response::Accepted) => HandshakeState::BothAccepted,
            (Response::Accepted, Response::Unresponded) => HandshakeState::LocalAccepted,
            (Response::Unresponded, Response::Accepted) => HandshakeState::RemoteAccepted,
            (Response::Unresponded, Response::Unresponded) => HandshakeState::Initiated,
        }
    }

    fn response_mut(&mut self, side: ResponseSide) -> &mut Response {
        match side {
            ResponseSide::Local => &mut self.local_response,
            ResponseSide::Remote => &mut self.remote_response,
        }
    }
}

#[derive(Debug, Default)]
pub struct HandshakeRegistry {
    connections: HashMap<String, PendingConnection>,
}

impl HandshakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: PendingConnection) -> Result<(), SessionError> {
        if self.connections.contains_key(connection.endpoint_id()) {
            return Err(SessionError::DuplicateEndpoint(connection.endpoint_id));
        }
        self.connections
            .insert(connection.endpoint_id.clone(), connection);
        Ok(())
    }

    pub fn get(&self, endpoint_id: &str) -> Option<&PendingConnection> {
        self.connections.get(endpoint_id)
    }

    pub fn lookup(&self, endpoint_id: &str) -> Result<&PendingConnection, SessionError> {
        self.connections
            .get(endpoint_id)
            .ok_or_else(|| SessionError::UnknownEndpoint(endpoint_id.to_string()))
    }

    pub fn contains(&self, endpoint_id: &str) -> bool {
        self.connections.contains_key(endpoint_id)
    }

    pub fn remove(&mut self, endpoint_id: &str) -> Option<PendingConnection> {
        self.connections.remove(endpoint_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Remove every record.
    pub fn drain(&mut self) -> Vec<PendingConnection> {
        self.connections.drain().map(|(_, c)| c).collect()
    }

    // ── Responses ─────────────────────────────────────────────────────────────

    /// Record a response once per side.
    pub fn respond(
        &mut self,
        endpoint_id: &str,
        side: ResponseSide,
        response: Response,
    ) -> Result<&mut PendingConnection, SessionError> {
        let connection = self
            .connections
            .get_mut(endpoint_id)
            .ok_or_else(|| SessionError::UnknownEndpoint(endpoint_id.to_string()))?;
        let slot = connection.response_mut(side);
        if *slot != Response::Unresponded {
            return Err(SessionError::AlreadyResponded {
                endpoint_id: endpoint_id.to_string(),
                side,
            });
        }
        *slot = response;
        Ok(connection)
    }

    /// Local accept, binding the payload listener.
    pub fn local_accepted(
        &mut self,
        endpoint_id: &str,
        payload_listener: ListenerId,
    ) -> Result<(), SessionError> {
        let connection = self.respond(endpoint_id, ResponseSide::Local, Response::Accepted)?;
        connection.payload_listener = Some(payload_listener);
        Ok(())
    }

    pub fn local_rejected(&mut self, endpoint_id: &str) -> Result<(), SessionError> {
        self.respond(endpoint_id, ResponseSide::Local, Response::Rejected)
            .map(|_| ())
    }

    pub fn remote_accepted(&mut self, endpoint_id: &str) -> Result<(), SessionError> {
        self.respond(endpoint_id, ResponseSide::Remote, Response::Accepted)
            .map(|_| ())
    }

    pub fn remote_rejected(&mut self, endpoint_id: &str) -> Result<(), SessionError> {
        self.respond(endpoint_id, ResponseSide::Remote, Response::Rejected)
            .map(|_| ())
    }

    // ── Outcomes ──────────────────────────────────────────────────────────────

    /// Move a fully accepted handshake to connected. Returns the connection
    /// listener to notify.
    pub fn mark_connected(&mut self, endpoint_id: &str) -> Result<ListenerId, SessionError> {
        let connection = self
            .connections
            .get_mut(endpoint_id)
            .ok_or_else(|| SessionError::UnknownEndpoint(endpoint_id.to_string()))?;
        if connection.connected {
            return Err(SessionError::AlreadyConnected(endpoint_id.to_string()));
        }
        if !connection.is_accepted() {
            return Err(SessionError::HandshakeIncomplete(endpoint_id.to_string()));
        }
        connection.connected = true;
        Ok(connection.connection_listener)
    }

    /// Remove a rejected handshake. Fails if neither side rejected.
    pub fn take_rejected(&mut self, endpoint_id: &str) -> Result<PendingConnection, SessionError> {
        let rejected = self.lookup(endpoint_id)?.is_rejected();
        if !rejected {
            return Err(SessionError::HandshakeIncomplete(endpoint_id.to_string()));
        }
        self.connections
            .remove(endpoint_id)
            .ok_or_else(|| SessionError::UnknownEndpoint(endpoint_id.to_string()))
    }

    // ── Queries ───────────────────────────────────────────────────────────────
    //
    // Unknown endpoints answer false: nothing has responded, nothing is accepted.

    pub fn state(&self, endpoint_id: &str) -> Option<HandshakeState> {
        self.get(endpoint_id).map(PendingConnection::state)
    }

    pub fn has_local_responded(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id)
            .is_some_and(|c| c.local_response != Response::Unresponded)
    }

    pub fn has_remote_responded(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id)
            .is_some_and(|c| c.remote_response != Response::Unresponded)
    }

    pub fn local_is_accepted(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id)
            .is_some_and(|c| c.local_response == Response::Accepted)
    }

    pub fn remote_is_accepted(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id)
            .is_some_and(|c| c.remote_response == Response::Accepted)
    }

    pub fn is_accepted(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id).is_some_and(PendingConnection::is_accepted)
    }

    pub fn is_rejected(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id).is_some_and(PendingConnection::is_rejected)
    }

    pub fn is_connected(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id).is_some_and(PendingConnection::is_connected)
    }

    /// Endpoint ids matching `pred`, sorted.
    pub fn endpoints_matching(&self, pred: impl Fn(&PendingConnection) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .connections
            .values()
            .filter(|c| pred(*c))
            .map(|c| c.endpoint_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn connected_endpoints(&self) -> Vec<String> {
        self.endpoints_matching(PendingConnection::is_connected)
    }

    pub fn pending_endpoints(&self) -> Vec<String> {
        self.endpoints_matching(|c| !c.is_connected())
    }

    pub fn count_connected(&self, incoming: bool) -> usize {
        self.connections
            .values()
            .filter(|c| c.connected && c.is_incoming_connection == incoming)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingConnection> {
        self.connections.values()
    }
}
