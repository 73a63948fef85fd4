use anyhow::Result;
use duet::client::SessionEvent;
use duet::server::{RoomPolicy, SignalingService};
use duet::{CallCommand, RoomId};

use super::init_tracing;
use crate::utils::TestParticipant;

fn join(email: &str, room: &str) -> CallCommand {
    CallCommand::Join {
        email: email.into(),
        room: RoomId::from(room),
    }
}

#[tokio::test]
async fn test_third_participant_is_turned_away() -> Result<()> {
    init_tracing();
    let service = SignalingService::new(RoomPolicy::default());
    let mut a = TestParticipant::local(&service, "a");
    let mut b = TestParticipant::local(&service, "b");
    let mut c = TestParticipant::local(&service, "c");

    a.send(join("a@x.com", "r1"));
    a.wait_for(|e| matches!(e, SessionEvent::JoinedRoom { .. }))
        .await?;
    b.send(join("b@x.com", "r1"));
    b.wait_for(|e| matches!(e, SessionEvent::JoinedRoom { .. }))
        .await?;

    c.send(join("c@x.com", "r1"));
    let refused = c
        .wait_for(|e| {
            matches!(
                e,
                SessionEvent::RoomFull { .. } | SessionEvent::JoinedRoom { .. }
            )
        })
        .await?;
    assert_eq!(
        refused,
        SessionEvent::RoomFull {
            room: RoomId::from("r1")
        }
    );

    let c = c.stop().await?;
    assert!(c.room().is_none());
    assert!(c.local_id().is_none());
    assert_eq!(service.directory().members(&RoomId::from("r1")).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_start_call_alone_keeps_session_alive() -> Result<()> {
    init_tracing();
    let service = SignalingService::new(RoomPolicy::default());
    let mut a = TestParticipant::local(&service, "a");
    let b = TestParticipant::local(&service, "b");

    a.send(join("a@x.com", "lonely"));
    a.wait_for(|e| matches!(e, SessionEvent::JoinedRoom { .. }))
        .await?;
    a.send(CallCommand::StartCall);

    // the failed call must not have ended the loop
    b.send(join("b@x.com", "lonely"));
    a.wait_for(|e| matches!(e, SessionEvent::PeerJoined { .. }))
        .await?;

    let factory = a.factory.clone();
    let a = a.stop().await?;
    assert!(a.engine().is_none());
    assert!(a.local_stream().is_none());
    assert_eq!(factory.created(), 0);
    Ok(())
}
