use anyhow::Result;
use duet::client::{CallState, SessionConfig, SessionEvent, SignalingBus};
use duet::model::NegotiationState;
use duet::server::{RoomPolicy, SignalingService, serve_with_listener};
use duet::{CallCommand, RoomId};
use tokio::net::TcpListener;

use super::init_tracing;
use crate::utils::TestParticipant;

fn join(email: &str, room: &str) -> CallCommand {
    CallCommand::Join {
        email: email.into(),
        room: RoomId::from(room),
    }
}

/// A and B meet in `room`; returns once A knows B's id.
async fn meet(a: &mut TestParticipant, b: &mut TestParticipant, room: &str) -> Result<()> {
    a.send(join("a@x.com", room));
    a.wait_for(|e| matches!(e, SessionEvent::JoinedRoom { .. }))
        .await?;

    b.send(join("b@x.com", room));
    let b_id = match b
        .wait_for(|e| matches!(e, SessionEvent::JoinedRoom { .. }))
        .await?
    {
        SessionEvent::JoinedRoom { id, .. } => id,
        other => unreachable!("{:?}", other),
    };

    let announced = a
        .wait_for(|e| matches!(e, SessionEvent::PeerJoined { .. }))
        .await?;
    assert_eq!(
        announced,
        SessionEvent::PeerJoined {
            email: "b@x.com".into(),
            id: b_id,
        }
    );
    Ok(())
}

/// A calls B and both sides end up showing the other's stream.
async fn place_call(a: &mut TestParticipant, b: &mut TestParticipant) -> Result<()> {
    a.send(CallCommand::StartCall);

    b.wait_for(|e| matches!(e, SessionEvent::IncomingCall { .. }))
        .await?;
    let on_b = b
        .wait_for(|e| matches!(e, SessionEvent::RemoteStream(_)))
        .await?;
    let SessionEvent::RemoteStream(stream) = on_b else {
        unreachable!()
    };
    assert!(stream.id.starts_with("a-"), "B sees A's camera: {}", stream.id);

    let on_a = a
        .wait_for(|e| matches!(e, SessionEvent::RemoteStream(s) if s.tracks.len() == 2))
        .await?;
    let SessionEvent::RemoteStream(stream) = on_a else {
        unreachable!()
    };
    assert!(stream.id.starts_with("b-"), "A sees B's camera: {}", stream.id);
    Ok(())
}

#[tokio::test]
async fn test_call_between_two_local_participants() -> Result<()> {
    init_tracing();
    let service = SignalingService::new(RoomPolicy::default());
    let mut a = TestParticipant::local(&service, "a");
    let mut b = TestParticipant::local(&service, "b");

    meet(&mut a, &mut b, "r1").await?;
    place_call(&mut a, &mut b).await?;

    let a_factory = a.factory.clone();
    let b_factory = b.factory.clone();
    let a = a.stop().await?;
    let b = b.stop().await?;

    assert_eq!(a.state(), CallState::Connected);
    assert_eq!(b.state(), CallState::Connected);
    for session in [&a, &b] {
        let engine = session.engine().expect("Call should be up");
        assert_eq!(engine.state(), NegotiationState::Stable);
        assert_eq!(engine.senders().await.len(), 2);
    }
    assert_eq!(a_factory.created(), 1);
    assert_eq!(b_factory.created(), 1);
    Ok(())
}

#[tokio::test]
async fn test_peer_leaving_ends_the_call() -> Result<()> {
    init_tracing();
    let service = SignalingService::new(RoomPolicy::default());
    let mut a = TestParticipant::local(&service, "a");
    let mut b = TestParticipant::local(&service, "b");

    meet(&mut a, &mut b, "r1").await?;
    place_call(&mut a, &mut b).await?;

    b.send(CallCommand::Leave);
    a.wait_for(|e| *e == SessionEvent::CallEnded).await?;
    a.wait_for(|e| matches!(e, SessionEvent::PeerLeft { .. }))
        .await?;

    let a = a.stop().await?;
    assert_eq!(a.state(), CallState::Idle);
    assert!(a.engine().is_none());
    assert!(a.remote().is_none());
    assert!(a.room().is_some());
    Ok(())
}

#[tokio::test]
async fn test_call_over_websocket_relay() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(serve_with_listener(
        listener,
        SignalingService::new(RoomPolicy::default()),
    ));
    let url = format!("ws://{}/ws", addr);

    let mut a = TestParticipant::spawn(
        SignalingBus::connect(&url).await?,
        "a",
        SessionConfig::default(),
    );
    let mut b = TestParticipant::spawn(
        SignalingBus::connect(&url).await?,
        "b",
        SessionConfig::default(),
    );

    meet(&mut a, &mut b, "ws-room").await?;
    place_call(&mut a, &mut b).await?;

    let a = a.stop().await?;
    let b = b.stop().await?;
    assert_eq!(
        a.engine().map(|e| e.state()),
        Some(NegotiationState::Stable)
    );
    assert_eq!(
        b.engine().map(|e| e.state()),
        Some(NegotiationState::Stable)
    );
    Ok(())
}
