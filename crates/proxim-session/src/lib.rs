//! proxim-session — the per-device session manager.
//!
//! One [`ClientSession`] per local participant. Transports and the
//! application both call into it; it owns advertising/discovery state, the
//! handshake record of every remote endpoint, per-endpoint cancellation
//! flags, and the local endpoint id policy.

pub mod cancellation;
pub mod clock;
pub mod dispatch;
pub mod flags;
pub mod handshake;
pub mod identity;
pub mod session;
pub mod state;

pub use cancellation::{CancellationFlag, CancellationRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{
    ConnectionListener, DiscoveryListener, ListenerId, ListenerRegistry, NotificationDispatcher,
    PayloadListener,
};
pub use flags::{FeatureFlagSource, SharedFeatureFlags};
pub use handshake::{HandshakeRegistry, HandshakeState, PendingConnection, Response};
pub use identity::{IdGenerator, IdentityCache, RandomIdGenerator, Visibility};
pub use session::{ClientSession, ClientSessionBuilder, ConnectionSnapshot, SessionSnapshot};
pub use state::SessionState;
