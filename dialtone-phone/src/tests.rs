//! Two phones talking through an in-process relay

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use dialtone_core::{BusyPolicy, RelayConfig};
use dialtone_proto::{ClientEvent, EndpointId, IceCandidate, SessionDescription};
use dialtone_relay::{EndpointRegistry, Relay};

use crate::state::{CallPhase, Role};
use crate::test_helpers::FakeBackend;
use crate::{Phone, PhoneHandle};

struct Endpoint {
    id: EndpointId,
    phone: PhoneHandle,
    backend: Arc<FakeBackend>,
}

/// Connect a phone to `relay` through channel bridges
async fn join(relay: &Relay, backend: FakeBackend) -> Endpoint {
    let backend = Arc::new(backend);
    let (id, mut from_relay) = relay.connect();

    let (events_tx, events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = from_relay.recv().await {
            if events_tx.send(event).is_err() {
                break;
            }
        }
    });

    let (signal, mut to_relay) = mpsc::unbounded_channel::<ClientEvent>();
    let relay = relay.clone();
    let sender = id.clone();
    tokio::spawn(async move {
        while let Some(event) = to_relay.recv().await {
            relay.handle(&sender, event);
        }
    });

    let phone = Phone::spawn(Arc::clone(&backend), signal, events, BusyPolicy::Reject);
    phone
        .wait_for(|state| state.local_id.as_ref() == Some(&id))
        .await
        .unwrap();

    Endpoint { id, phone, backend }
}

fn relay() -> Relay {
    Relay::new(EndpointRegistry::new(64), &RelayConfig::default())
}

async fn wait_phase(endpoint: &Endpoint, phase: CallPhase) {
    tokio::time::timeout(
        Duration::from_secs(5),
        endpoint.phone.wait_for(|state| state.phase == phase),
    )
    .await
    .unwrap()
    .unwrap();
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_call_connects_and_hangs_up() {
    let relay = relay();
    let a = join(&relay, FakeBackend::with_sdp("x", "unused")).await;
    let b = join(&relay, FakeBackend::with_sdp("unused", "y")).await;

    a.phone.place_call(b.id.clone()).await.unwrap();
    assert_eq!(a.phone.state().phase, CallPhase::OutgoingPending);

    wait_phase(&b, CallPhase::IncomingPending).await;
    let ringing = b.phone.state();
    assert_eq!(ringing.counterpart, Some(a.id.clone()));
    assert_eq!(ringing.role, Role::Callee);

    b.phone.accept().await.unwrap();
    wait_phase(&a, CallPhase::Active).await;

    assert_eq!(
        a.backend.last_peer().remote(),
        Some(SessionDescription::answer("y"))
    );
    assert_eq!(
        b.backend.last_peer().remote(),
        Some(SessionDescription::offer("x"))
    );
    assert_eq!(a.phone.state().counterpart, Some(b.id.clone()));
    assert_eq!(b.phone.state().phase, CallPhase::Active);

    b.phone.end().await.unwrap();
    wait_phase(&a, CallPhase::Idle).await;

    assert_eq!(b.phone.state().phase, CallPhase::Idle);
    assert_eq!(a.backend.stats.media_stopped(), 1);
    assert_eq!(b.backend.stats.media_stopped(), 1);
    assert!(a.backend.last_peer().is_closed());
    assert!(b.backend.last_peer().is_closed());
}

#[tokio::test]
async fn test_candidates_cross_while_ringing() {
    let relay = relay();
    let a = join(&relay, FakeBackend::default()).await;
    let b = join(&relay, FakeBackend::default()).await;

    a.phone.place_call(b.id.clone()).await.unwrap();
    wait_phase(&b, CallPhase::IncomingPending).await;

    // Caller trickles while the callee is still ringing
    a.backend.last_peer().sink.emit(IceCandidate::new("from-a"));

    b.phone.accept().await.unwrap();
    wait_phase(&a, CallPhase::Active).await;

    let b_peer = b.backend.last_peer();
    eventually(|| b_peer.candidates() == vec![IceCandidate::new("from-a")]).await;

    b_peer.sink.emit(IceCandidate::new("from-b"));
    let a_peer = a.backend.last_peer();
    eventually(|| a_peer.candidates() == vec![IceCandidate::new("from-b")]).await;
}

#[tokio::test]
async fn test_decline_returns_both_to_idle() {
    let relay = relay();
    let a = join(&relay, FakeBackend::default()).await;
    let b = join(&relay, FakeBackend::default()).await;

    a.phone.place_call(b.id.clone()).await.unwrap();
    wait_phase(&b, CallPhase::IncomingPending).await;

    b.phone.end().await.unwrap();
    wait_phase(&a, CallPhase::Idle).await;

    assert_eq!(a.backend.stats.peers_closed(), 1);
    // The callee never opened a peer
    assert_eq!(b.backend.stats.peers_created(), 0);
}

#[tokio::test]
async fn test_busy_callee_rejects_third_party() {
    let relay = relay();
    let a = join(&relay, FakeBackend::default()).await;
    let b = join(&relay, FakeBackend::default()).await;
    let c = join(&relay, FakeBackend::default()).await;

    a.phone.place_call(b.id.clone()).await.unwrap();
    wait_phase(&b, CallPhase::IncomingPending).await;

    c.phone.place_call(b.id.clone()).await.unwrap();
    wait_phase(&c, CallPhase::Idle).await;

    let ringing = b.phone.state();
    assert_eq!(ringing.phase, CallPhase::IncomingPending);
    assert_eq!(ringing.counterpart, Some(a.id.clone()));
    assert_eq!(a.phone.state().phase, CallPhase::OutgoingPending);
}

#[tokio::test]
async fn test_call_to_unknown_endpoint_stays_pending() {
    let relay = relay();
    let a = join(&relay, FakeBackend::default()).await;

    a.phone.place_call("nobody").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // No error comes back from the relay; the caller cancels locally
    assert_eq!(a.phone.state().phase, CallPhase::OutgoingPending);
    a.phone.end().await.unwrap();
    assert_eq!(a.phone.state().phase, CallPhase::Idle);
}
