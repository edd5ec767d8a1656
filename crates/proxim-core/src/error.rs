//! Caller-misuse errors reported by the session manager.
//!
//! These indicate a defect in the transport or application layer. They are
//! returned, never swallowed; policy no-ops are not represented here.

use std::fmt;

/// Which side of a handshake a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSide {
    Local,
    Remote,
}

impl fmt::Display for ResponseSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSide::Local => f.write_str("local"),
            ResponseSide::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no pending connection to endpoint {0}")]
    UnknownEndpoint(String),
    #[error("connection to endpoint {0} was already initiated")]
    DuplicateEndpoint(String),
    #[error("{side} endpoint already responded to connection with {endpoint_id}")]
    AlreadyResponded {
        endpoint_id: String,
        side: ResponseSide,
    },
    #[error("handshake with endpoint {0} has not reached the required outcome")]
    HandshakeIncomplete(String),
    #[error("endpoint {0} is already connected")]
    AlreadyConnected(String),
    #[error("endpoint {0} has not been accepted locally; no payload listener is bound")]
    NotLocallyAccepted(String),
}

impl SessionError {
    /// The endpoint the error refers to.
    pub fn endpoint_id(&self) -> &str {
        match self {
            SessionError::UnknownEndpoint(id)
            | SessionError::DuplicateEndpoint(id)
            | SessionError::HandshakeIncomplete(id)
            | SessionError::AlreadyConnected(id)
            | SessionError::NotLocallyAccepted(id) => id,
            SessionError::AlreadyResponded { endpoint_id, .. } => endpoint_id,
        }
    }
}
