//! Endpoint identifiers.
//!
//! A local endpoint id is what a peer exposes to everyone scanning nearby.
//! It is deliberately short: four characters from a 36-symbol alphabet.

/// Length of every local endpoint id.
pub const ENDPOINT_ID_LENGTH: usize = 4;

/// Symbols an endpoint id is drawn from.
pub const ENDPOINT_ID_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// True if `id` is a well-formed local endpoint id.
pub fn is_valid_endpoint_id(id: &str) -> bool {
    id.len() == ENDPOINT_ID_LENGTH && id.bytes().all(|b| ENDPOINT_ID_ALPHABET.contains(&b))
}
