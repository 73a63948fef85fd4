use duet_core::{ClientSignal, ConnectionId, RelaySignal, SessionDescription};
use duet_server::{RoomPolicy, SignalingService};

use crate::integration::init_tracing;
use crate::utils::{drain_signals, wait_for_signal};

#[tokio::test]
async fn test_signal_to_departed_peer_dropped() {
    init_tracing();

    let service = SignalingService::new(RoomPolicy::default());
    let mut alice = service.connect_local();
    let bob = service.connect_local();
    let bob_id = bob.id;
    drop(bob);

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while service.connections().contains(&bob_id) {
        assert!(tokio::time::Instant::now() < deadline, "Bob never unregistered");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    alice
        .outgoing
        .send(ClientSignal::CallOffer {
            to: bob_id,
            offer: SessionDescription::offer("v=0"),
        })
        .unwrap();
    alice
        .outgoing
        .send(ClientSignal::CallOffer {
            to: ConnectionId::new(),
            offer: SessionDescription::offer("v=0"),
        })
        .unwrap();

    // the sender hears nothing back and its connection stays usable
    assert!(drain_signals(&mut alice.incoming).await.is_empty());

    alice
        .outgoing
        .send(ClientSignal::Join {
            email: "a@x.com".into(),
            room: "r1".into(),
        })
        .unwrap();
    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
        .await
        .expect("Alice's connection broke after a dropped relay");
}
