use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proxim_core::endpoint::is_valid_endpoint_id;
use proxim_session::IdGenerator;

use crate::*;

#[test]
fn high_visibility_id_is_reused_within_ttl() {
    let (session, clock) = session_with_clock();
    let first = advertise(&session, high_visibility());
    session.stop_advertising();
    clock.advance(Duration::from_secs(5));

    let second = advertise(&session, high_visibility());
    assert_eq!(second, first);
    assert_eq!(session.local_endpoint_id(), first);
}

#[test]
fn high_visibility_id_rotates_after_ttl() {
    let (session, clock) = session_with_clock();
    let first = advertise(&session, high_visibility());
    session.stop_advertising();
    clock.advance(Duration::from_secs(31));

    assert_ne!(advertise(&session, high_visibility()), first);
}

#[test]
fn ttl_starts_at_stop() {
    let (session, clock) = session_with_clock();
    let first = advertise(&session, high_visibility());
    // A long advertisement does not age the cached id.
    clock.advance(Duration::from_secs(600));
    session.stop_advertising();
    clock.advance(Duration::from_secs(29));

    assert_eq!(advertise(&session, high_visibility()), first);
}

#[test]
fn low_visibility_never_reuses_cached_id() {
    for options in [low_power(), no_bluetooth()] {
        let (session, _clock) = session_with_clock();
        let cached = advertise(&session, high_visibility());
        session.stop_advertising();

        assert_ne!(advertise(&session, options), cached);
    }
}

#[test]
fn low_visibility_rotates_every_time() {
    let (session, _clock) = session_with_clock();
    let first = advertise(&session, low_power());
    session.stop_advertising();
    assert_ne!(advertise(&session, low_power()), first);
}

#[test]
fn discovery_forfeits_cached_id() {
    let (session, _clock) = session_with_clock();
    let cached = advertise(&session, high_visibility());
    session.stop_advertising();
    discover(&session, Recorder::new());

    assert_ne!(advertise(&session, high_visibility()), cached);
}

#[test]
fn endpoint_ids_are_always_well_formed() {
    let (session, clock) = session_with_clock();
    for round in 0..50 {
        let options = if round % 3 == 0 { low_power() } else { high_visibility() };
        let id = advertise(&session, options);
        assert_eq!(id.len(), 4);
        assert!(is_valid_endpoint_id(&id), "bad endpoint id {id}");
        session.stop_advertising();
        clock.advance(Duration::from_secs(40));
    }
    assert!(is_valid_endpoint_id(&session.local_endpoint_id()));
}

/// Always hands out the same id.
struct FixedId(String);

impl IdGenerator for FixedId {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

#[test]
fn concurrent_sessions_have_distinct_identities() {
    let sessions: Vec<ClientSession> = thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|n| {
                s.spawn(move || {
                    let session = ClientSession::builder()
                        .id_generator(Arc::new(FixedId(format!("S{n:03}"))))
                        .build();
                    let endpoint_id = session.local_endpoint_id();
                    (session, endpoint_id)
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(n, handle)| {
                let (session, endpoint_id) = handle.join().unwrap();
                assert_eq!(endpoint_id, format!("S{n:03}"));
                session
            })
            .collect()
    });

    let client_ids: HashSet<i64> = sessions.iter().map(ClientSession::client_id).collect();
    assert_eq!(client_ids.len(), sessions.len());
}

#[test]
fn configured_ttl_is_honoured() {
    let mut config = proxim_core::config::ProximConfig::default();
    config.identity.high_visibility_cache_ttl_secs = 2;
    let clock = Arc::new(ManualClock::new());
    let session = ClientSession::builder()
        .clock(clock.clone())
        .config(&config)
        .build();

    let first = advertise(&session, high_visibility());
    session.stop_advertising();
    clock.advance(Duration::from_secs(3));
    assert_ne!(advertise(&session, high_visibility()), first);
}
