use duet_core::RoomId;
use duet_server::{JoinOutcome, RoomPolicy};

use crate::integration::{create_test_directory, init_tracing, participant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_exceed_cap() {
    init_tracing();

    let (directory, _sent_rx, signaling) = create_test_directory(RoomPolicy::default());
    let room = RoomId::from("busy");

    let mut tasks = Vec::new();
    for i in 0..16 {
        let directory = directory.clone();
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            directory.join(&room, participant(&format!("user{}@x.com", i))).await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.expect("Join task panicked") {
            JoinOutcome::Admitted => admitted += 1,
            JoinOutcome::Full => full += 1,
            other => panic!("Unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(full, 14);
    assert_eq!(directory.room_count(), 1);
    assert_eq!(directory.members(&room).await.len(), 2);
    assert_eq!(signaling.joined_broadcasts().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_racing_room_teardown_lands_in_a_live_room() {
    init_tracing();

    let (directory, _sent_rx, _signaling) = create_test_directory(RoomPolicy::default());
    let room = RoomId::from("churn");

    for _ in 0..50 {
        let leaver = participant("leaver@x.com");
        directory.join(&room, leaver.clone()).await;

        let joiner = participant("joiner@x.com");
        let leave = {
            let directory = directory.clone();
            let room = room.clone();
            tokio::spawn(async move { directory.leave(&room, leaver.id).await })
        };
        let outcome = directory.join(&room, joiner.clone()).await;
        leave.await.unwrap();

        assert_eq!(outcome, JoinOutcome::Admitted);
        let members = directory.members(&room).await;
        assert_eq!(members.iter().map(|m| m.id).collect::<Vec<_>>(), vec![joiner.id]);

        directory.leave(&room, joiner.id).await;
    }
}
