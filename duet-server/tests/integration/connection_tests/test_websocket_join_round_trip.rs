use duet_core::{ClientSignal, RelaySignal, RoomId};
use duet_server::RoomPolicy;

use crate::integration::{init_tracing, spawn_test_server};
use crate::utils::WsTestClient;

#[tokio::test]
async fn test_websocket_join_round_trip() {
    init_tracing();

    let addr = spawn_test_server(RoomPolicy::default()).await;
    let room = RoomId::from("r1");

    let mut alice = WsTestClient::connect(addr).await.expect("Alice failed to connect");
    alice
        .send(&ClientSignal::Join {
            email: "a@x.com".into(),
            room: room.clone(),
        })
        .await
        .expect("Send failed");

    let alice_id = match alice.recv().await.expect("No ack for Alice") {
        RelaySignal::JoinAck { email, room: r, id } => {
            assert_eq!(email, "a@x.com");
            assert_eq!(r, room);
            id
        }
        other => panic!("Unexpected signal: {:?}", other),
    };

    let mut bob = WsTestClient::connect(addr).await.expect("Bob failed to connect");
    bob.send(&ClientSignal::Join {
        email: "b@x.com".into(),
        room: room.clone(),
    })
    .await
    .expect("Send failed");

    let bob_id = match bob.recv().await.expect("No ack for Bob") {
        RelaySignal::JoinAck { id, .. } => id,
        other => panic!("Unexpected signal: {:?}", other),
    };

    assert_eq!(
        alice.recv().await.expect("Alice never saw Bob"),
        RelaySignal::Joined {
            email: "b@x.com".into(),
            id: bob_id,
        }
    );

    bob.close().await.expect("Failed to close Bob");

    assert_eq!(
        alice.recv().await.expect("Alice never saw Bob leave"),
        RelaySignal::Left {
            email: "b@x.com".into(),
            id: bob_id,
        }
    );
    assert_ne!(alice_id, bob_id);

    alice.close().await.expect("Failed to close Alice");
}
