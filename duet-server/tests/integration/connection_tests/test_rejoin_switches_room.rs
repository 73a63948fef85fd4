use duet_core::{ClientSignal, RelaySignal, RoomId};
use duet_server::{RoomPolicy, SignalingService};

use crate::integration::init_tracing;
use crate::utils::wait_for_signal;

#[tokio::test]
async fn test_join_other_room_leaves_current_one() {
    init_tracing();

    let service = SignalingService::new(RoomPolicy::default());
    let first = RoomId::from("first");
    let second = RoomId::from("second");

    let mut alice = service.connect_local();
    let mut bob = service.connect_local();

    for (conn, email) in [(&mut alice, "a@x.com"), (&mut bob, "b@x.com")] {
        conn.outgoing
            .send(ClientSignal::Join {
                email: email.into(),
                room: first.clone(),
            })
            .unwrap();
        wait_for_signal(&mut conn.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
            .await
            .expect("Join not acknowledged");
    }

    bob.outgoing
        .send(ClientSignal::Join {
            email: "b@x.com".into(),
            room: second.clone(),
        })
        .unwrap();

    let ack = wait_for_signal(&mut bob.incoming, |s| matches!(s, RelaySignal::JoinAck { .. }))
        .await
        .expect("Second join not acknowledged");
    assert!(matches!(ack, RelaySignal::JoinAck { room, .. } if room == second));

    wait_for_signal(&mut alice.incoming, |s| matches!(s, RelaySignal::Left { .. }))
        .await
        .expect("Alice never saw Bob move away");

    assert_eq!(service.room_of(&bob.id), Some(second.clone()));
    assert_eq!(service.directory().members(&first).await.len(), 1);
    assert_eq!(service.directory().members(&second).await.len(), 1);
}
