use std::sync::Arc;

use proxim_core::config::{FeatureConfig, ProximConfig};
use proxim_session::SharedFeatureFlags;

use crate::*;

fn session(enabled: bool) -> (ClientSession, Arc<SharedFeatureFlags>) {
    let flags = Arc::new(SharedFeatureFlags::new(&FeatureConfig {
        enable_cancellation_flag: enabled,
    }));
    let session = ClientSession::builder().feature_flags(flags.clone()).build();
    (session, flags)
}

#[test]
fn untouched_endpoint_is_not_cancelled() {
    let (session, _) = session(true);
    assert!(!session.cancellation_flag("AB12").cancelled());
}

#[test]
fn cancel_endpoint_sets_the_flag() {
    let (session, _) = session(true);
    let held = session.cancellation_flag("AB12");
    assert!(session.cancel_endpoint("AB12"));
    assert!(held.cancelled());
    assert!(session.cancellation_flag("AB12").cancelled());
    assert!(!session.cancellation_flag("CD34").cancelled());
}

#[test]
fn cancel_all_covers_every_tracked_endpoint() {
    let (session, _) = session(true);
    let held: Vec<_> = ["AAAA", "BBBB", "CCCC"]
        .iter()
        .map(|id| session.cancellation_flag(id))
        .collect();

    assert_eq!(session.cancel_all_endpoints(), 3);
    assert!(held.iter().all(|f| f.cancelled()));
    assert_eq!(session.snapshot().cancellation_flags, 0);
}

#[test]
fn dropped_flags_come_back_cancelled() {
    let (session, _) = session(true);
    session.cancellation_flag("AAAA");
    session.cancel_all_endpoints();

    // Cancelled and cleaned up, as opposed to never seen.
    assert!(session.cancellation_flag("AAAA").cancelled());
    assert!(!session.cancellation_flag("DDDD").cancelled());
}

#[test]
fn disabled_feature_never_changes_a_flag() {
    let (session, flags) = session(true);
    let cancelled = session.cancellation_flag("AAAA");
    session.cancel_endpoint("AAAA");
    let live = session.cancellation_flag("BBBB");

    flags.set_enable_cancellation_flag(false);
    assert!(!session.cancel_endpoint("BBBB"));
    assert_eq!(session.cancel_all_endpoints(), 0);
    session.add_cancellation_flag("AAAA");

    assert!(cancelled.cancelled());
    assert!(!live.cancelled());
    assert!(session.cancellation_flag("AAAA").cancelled());
    assert!(!session.cancellation_flag("BBBB").cancelled());
    assert_eq!(session.snapshot().cancellation_flags, 2);
}

#[test]
fn disabled_by_config() {
    let mut config = ProximConfig::default();
    config.features.enable_cancellation_flag = false;
    let session = ClientSession::from_config(&config);

    assert!(!session.cancel_endpoint("AB12"));
    assert!(!session.cancellation_flag("AB12").cancelled());
}

#[test]
fn add_rearms_for_a_new_attempt() {
    let (session, _) = session(true);
    let held = session.cancellation_flag("AB12");
    session.cancel_endpoint("AB12");
    session.add_cancellation_flag("AB12");
    assert!(!held.cancelled());
}

#[test]
fn disconnect_cancels_in_flight_work() {
    let (session, _) = session(true);
    initiate(&session, "AB12", true);
    let held = session.cancellation_flag("AB12");
    assert!(!held.cancelled());

    session.on_disconnected("AB12", false).unwrap();
    assert!(held.cancelled());
}

#[test]
fn cancellation_leaves_the_handshake_alone() {
    let (session, _) = session(true);
    initiate(&session, "AB12", false);
    session.cancel_endpoint("AB12");
    session.cancel_all_endpoints();

    assert!(session.has_pending_connection_to_endpoint("AB12"));
    assert_eq!(session.handshake_state("AB12"), Some(HandshakeState::Initiated));
}
