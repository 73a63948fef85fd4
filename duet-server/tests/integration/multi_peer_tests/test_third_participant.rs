use duet_core::{RelaySignal, RoomId};
use duet_server::{JoinOutcome, RoomPolicy};

use crate::integration::{create_test_directory, init_tracing, participant};

#[tokio::test]
async fn test_third_participant_is_turned_away() {
    init_tracing();

    let (directory, _sent_rx, signaling) = create_test_directory(RoomPolicy::default());
    let room = RoomId::from("r1");
    let alice = participant("a@x.com");
    let bob = participant("b@x.com");
    let carol = participant("c@x.com");

    directory.join(&room, alice.clone()).await;
    directory.join(&room, bob.clone()).await;
    assert_eq!(signaling.joined_broadcasts().await, 1);

    assert_eq!(directory.join(&room, carol.clone()).await, JoinOutcome::Full);

    // no announcement went out for the rejected joiner
    assert_eq!(signaling.joined_broadcasts().await, 1);
    assert_eq!(
        signaling.signals_for(&carol.id).await,
        vec![RelaySignal::RoomFull { room: room.clone() }]
    );
    assert_eq!(directory.members(&room).await.len(), 2);
}

#[tokio::test]
async fn test_third_participant_slot_frees_up_after_leave() {
    init_tracing();

    let (directory, _sent_rx, _signaling) = create_test_directory(RoomPolicy::default());
    let room = RoomId::from("r1");
    let alice = participant("a@x.com");
    let bob = participant("b@x.com");
    let carol = participant("c@x.com");

    directory.join(&room, alice.clone()).await;
    directory.join(&room, bob.clone()).await;
    directory.leave(&room, bob.id).await;

    assert_eq!(directory.join(&room, carol).await, JoinOutcome::Admitted);
}

/// Without a cap the relay keeps the original fan-out: every existing member
/// hears about every joiner, so a third joiner produces two announcements.
#[tokio::test]
async fn test_unbounded_room_fans_out_to_every_member() {
    init_tracing();

    let (directory, _sent_rx, signaling) = create_test_directory(RoomPolicy::unbounded());
    let room = RoomId::from("r1");
    let alice = participant("a@x.com");
    let bob = participant("b@x.com");
    let carol = participant("c@x.com");

    directory.join(&room, alice.clone()).await;
    directory.join(&room, bob.clone()).await;
    assert_eq!(directory.join(&room, carol.clone()).await, JoinOutcome::Admitted);

    let announced_carol = RelaySignal::Joined {
        email: "c@x.com".into(),
        id: carol.id,
    };
    assert!(signaling.signals_for(&alice.id).await.contains(&announced_carol));
    assert!(signaling.signals_for(&bob.id).await.contains(&announced_carol));
    assert_eq!(signaling.joined_broadcasts().await, 3);
    assert_eq!(directory.members(&room).await.len(), 3);
}
