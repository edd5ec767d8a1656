//! proxim-core — shared value types, configuration, and errors.
//! All other Proxim crates depend on this one.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod types;

pub use endpoint::{ENDPOINT_ID_ALPHABET, ENDPOINT_ID_LENGTH};
pub use error::{ResponseSide, SessionError};
pub use types::{
    AdvertisingOptions, ConnectionOptions, ConnectionResponseInfo, DiscoveryOptions, Medium,
    MediumSelector, Payload, PayloadBody, PayloadProgressInfo, PayloadStatus, Status, Strategy,
};
