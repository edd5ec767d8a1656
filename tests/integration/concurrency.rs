use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use proxim_session::CancellationFlag;

use crate::*;

fn peer_id(n: usize) -> String {
    format!("P{n:03}")
}

#[test]
fn parallel_handshakes_on_one_session() {
    let session = ClientSession::new();
    let listeners: Vec<_> = (0..16).map(|_| Recorder::new()).collect();

    thread::scope(|s| {
        for (n, listener) in listeners.iter().enumerate() {
            let session = &session;
            s.spawn(move || {
                let id = peer_id(n);
                session
                    .on_connection_initiated(
                        &id,
                        &response_info(n % 2 == 0),
                        ConnectionOptions::default(),
                        listener.clone(),
                        "tok",
                    )
                    .unwrap();
                connect(session, &id, Recorder::new());
            });
        }
    });

    assert_eq!(session.connected_endpoints().len(), 16);
    assert_eq!(session.num_incoming_connections(), 8);
    assert_eq!(session.num_outgoing_connections(), 8);
    for listener in &listeners {
        assert_eq!(listener.count(|e| matches!(e, Event::Initiated(_))), 1);
        assert_eq!(listener.count(|e| matches!(e, Event::Accepted(_))), 1);
    }
}

#[test]
fn transport_and_application_threads_race_on_one_endpoint() {
    const PEER: &str = "AB12";
    let session = ClientSession::new();
    let listener = initiate(&session, PEER, false);

    // Local accept and remote accept from different threads, in any order.
    thread::scope(|s| {
        s.spawn(|| {
            session
                .local_endpoint_accepted_connection(PEER, Recorder::new())
                .unwrap()
        });
        s.spawn(|| session.remote_endpoint_accepted_connection(PEER).unwrap());
    });
    assert!(session.is_connection_accepted(PEER));

    // Only one of several racing transports wins the accepted transition.
    let wins = Mutex::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                if session.on_connection_accepted(PEER).is_ok() {
                    *wins.lock().unwrap() += 1;
                }
            });
        }
    });
    assert_eq!(*wins.lock().unwrap(), 1);
    assert_eq!(listener.count(|e| matches!(e, Event::Accepted(_))), 1);
}

const TEARDOWN_ROUNDS: usize = 2_000;

fn round_id(round: usize) -> String {
    format!("R{round:05}")
}

/// Run `a` and `b` on two threads released together.
fn race<A, B>(a: A, b: B) -> (bool, bool)
where
    A: FnOnce() -> bool + Send,
    B: FnOnce() -> bool + Send,
{
    let barrier = Barrier::new(2);
    thread::scope(|s| {
        let a = s.spawn(|| {
            barrier.wait();
            a()
        });
        let b = s.spawn(|| {
            barrier.wait();
            b()
        });
        (a.join().unwrap(), b.join().unwrap())
    })
}

#[test]
fn accepted_callback_survives_racing_disconnect() {
    let session = ClientSession::new();
    for round in 0..TEARDOWN_ROUNDS {
        let id = round_id(round);
        let listener = initiate(&session, &id, false);
        session
            .local_endpoint_accepted_connection(&id, Recorder::new())
            .unwrap();
        session.remote_endpoint_accepted_connection(&id).unwrap();

        let (accepted, disconnected) = race(
            || session.on_connection_accepted(&id).is_ok(),
            || session.on_disconnected(&id, true).is_ok(),
        );

        assert!(disconnected, "round {round}: disconnect found no record");
        if accepted {
            assert_eq!(
                listener.count(|e| matches!(e, Event::Accepted(_))),
                1,
                "round {round}: accepted transition applied but never dispatched"
            );
        }
        assert_eq!(listener.count(|e| matches!(e, Event::Disconnected(_))), 1);
    }
    assert!(session.snapshot().connections.is_empty());
}

#[test]
fn initiated_callback_survives_racing_disconnect() {
    let session = ClientSession::new();
    for round in 0..TEARDOWN_ROUNDS {
        let id = round_id(round);
        let listener = Recorder::new();

        let (initiated, disconnected) = race(
            || {
                session
                    .on_connection_initiated(
                        &id,
                        &response_info(round % 2 == 0),
                        ConnectionOptions::default(),
                        listener.clone(),
                        "tok",
                    )
                    .is_ok()
            },
            || session.on_disconnected(&id, true).is_ok(),
        );

        assert!(initiated, "round {round}: fresh endpoint refused");
        assert_eq!(
            listener.count(|e| matches!(e, Event::Initiated(_))),
            1,
            "round {round}: initiation applied but never dispatched"
        );
        if disconnected {
            assert_eq!(listener.count(|e| matches!(e, Event::Disconnected(_))), 1);
        } else {
            session.on_disconnected(&id, false).unwrap();
        }
    }
    assert!(session.snapshot().connections.is_empty());
}

#[test]
fn payload_callback_survives_racing_disconnect() {
    let session = ClientSession::new();
    for round in 0..TEARDOWN_ROUNDS {
        let id = round_id(round);
        initiate(&session, &id, true);
        let payloads = Recorder::new();
        connect(&session, &id, payloads.clone());

        let (delivered, _) = race(
            || session.on_payload(&id, Payload::bytes(7, "hi")).is_ok(),
            || session.on_disconnected(&id, false).is_ok(),
        );

        if delivered {
            assert_eq!(
                payloads.count(|e| matches!(e, Event::Payload(_, 7))),
                1,
                "round {round}: payload accepted but never dispatched"
            );
        }
    }
}

#[test]
fn flags_are_observed_across_threads() {
    let session = ClientSession::new();
    let flags: Vec<CancellationFlag> = (0..8)
        .map(|n| session.cancellation_flag(&peer_id(n)))
        .collect();

    thread::scope(|s| {
        for n in 0..8 {
            let session = &session;
            s.spawn(move || session.cancel_endpoint(&peer_id(n)));
        }
        s.spawn(|| {
            // Readers never block on the session.
            for flag in &flags {
                let _ = flag.cancelled();
            }
        });
    });
    assert!(flags.iter().all(CancellationFlag::cancelled));
}

/// Calls back into the session from inside its callbacks.
struct Reentrant {
    session: Mutex<Option<Arc<ClientSession>>>,
    observed: Mutex<Vec<bool>>,
}

impl Reentrant {
    fn session(&self) -> Arc<ClientSession> {
        self.session.lock().unwrap().clone().expect("session bound")
    }
}

impl ConnectionListener for Reentrant {
    fn on_initiated(&self, endpoint_id: &str, _info: &ConnectionResponseInfo) {
        let session = self.session();
        // Accept straight from the callback.
        session
            .local_endpoint_accepted_connection(endpoint_id, Recorder::new())
            .unwrap();
    }

    fn on_accepted(&self, endpoint_id: &str) {
        let session = self.session();
        self.observed
            .lock()
            .unwrap()
            .push(session.is_connected_to_endpoint(endpoint_id));
        session.cancel_endpoint(endpoint_id);
    }

    fn on_disconnected(&self, _endpoint_id: &str) {
        // Dropping the session here ends the reference cycle.
        self.session.lock().unwrap().take();
    }
}

#[test]
fn callbacks_may_reenter_the_session() {
    let session = Arc::new(ClientSession::new());
    let listener = Arc::new(Reentrant {
        session: Mutex::new(Some(session.clone())),
        observed: Mutex::new(Vec::new()),
    });

    session
        .on_connection_initiated(
            "AB12",
            &response_info(true),
            ConnectionOptions::default(),
            listener.clone(),
            "tok",
        )
        .unwrap();
    assert!(session.local_connection_is_accepted("AB12"));

    session.remote_endpoint_accepted_connection("AB12").unwrap();
    session.on_connection_accepted("AB12").unwrap();
    assert_eq!(*listener.observed.lock().unwrap(), vec![true]);
    assert!(session.cancellation_flag("AB12").cancelled());

    session.on_disconnected("AB12", true).unwrap();
    assert!(listener.session.lock().unwrap().is_none());
}

#[test]
fn reentrant_callbacks_under_contention() {
    let session = Arc::new(ClientSession::new());

    thread::scope(|s| {
        for n in 0..8 {
            let session = session.clone();
            s.spawn(move || {
                let id = peer_id(n);
                let listener = Arc::new(Reentrant {
                    session: Mutex::new(Some(session.clone())),
                    observed: Mutex::new(Vec::new()),
                });
                session
                    .on_connection_initiated(
                        &id,
                        &response_info(false),
                        ConnectionOptions::default(),
                        listener.clone(),
                        "tok",
                    )
                    .unwrap();
                session.remote_endpoint_accepted_connection(&id).unwrap();
                session.on_connection_accepted(&id).unwrap();
                session.on_disconnected(&id, true).unwrap();
                assert_eq!(*listener.observed.lock().unwrap(), vec![true]);
            });
        }
    });

    assert!(session.connected_endpoints().is_empty());
    assert!((0..8).all(|n| session.cancellation_flag(&peer_id(n)).cancelled()));
}
