use duet_core::{ClientSignal, RelaySignal, RoomId};
use duet_server::{RoomPolicy, SignalingService};

use crate::integration::init_tracing;
use crate::utils::wait_for_signal;

#[tokio::test]
async fn test_disconnect_triggers_leave() {
    init_tracing();

    let service = SignalingService::new(RoomPolicy::default());
    let room = RoomId::from("r1");

    let mut alice = service.connect_local();
    let bob = service.connect_local();

    alice
        .outgoing
        .send(ClientSignal::Join {
            email: "a@x.com".into(),
            room: room.clone(),
        })
        .unwrap();
    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
        .await
        .expect("Alice not acknowledged");

    bob.outgoing
        .send(ClientSignal::Join {
            email: "b@x.com".into(),
            room: room.clone(),
        })
        .unwrap();
    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::Joined { .. }))
        .await
        .expect("Alice never saw Bob");

    let bob_id = bob.id;
    drop(bob);

    let left = wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::Left { .. }))
        .await
        .expect("Alice never saw Bob leave");
    assert_eq!(
        left,
        RelaySignal::Left {
            email: "b@x.com".into(),
            id: bob_id,
        }
    );

    assert!(!service.connections().contains(&bob_id));
    assert_eq!(service.directory().members(&room).await.len(), 1);
}

#[tokio::test]
async fn test_last_leave_destroys_room() {
    init_tracing();

    let service = SignalingService::new(RoomPolicy::default());
    let room = RoomId::from("r1");

    let mut alice = service.connect_local();
    alice
        .outgoing
        .send(ClientSignal::Join {
            email: "a@x.com".into(),
            room: room.clone(),
        })
        .unwrap();
    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
        .await
        .expect("Alice not acknowledged");
    assert!(service.directory().contains_room(&room));

    alice.outgoing.send(ClientSignal::Leave).unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while service.directory().contains_room(&room) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Empty room was not destroyed"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // a fresh join recreates it
    alice
        .outgoing
        .send(ClientSignal::Join {
            email: "a@x.com".into(),
            room: room.clone(),
        })
        .unwrap();
    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
        .await
        .expect("Alice not acknowledged after rejoin");
    assert_eq!(service.directory().members(&room).await.len(), 1);
}
