use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use duet_client::sim::SimMedia;
use duet_client::{
    CallCommand, CallSession, PeerConfig, SessionConfig, SessionEvent, SignalingBus,
    WebRtcPeerFactory,
};
use duet_core::RoomId;
use duet_server::{RoomPolicy, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duet", about = "One-to-one video calls over a small signaling relay")]
struct Cli {
    /// Used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Serve {
        #[arg(long, default_value = "0.0.0.0:3000")]
        bind: SocketAddr,

        /// 0 lifts the cap.
        #[arg(long, default_value_t = 2)]
        max_participants: usize,
    },

    /// Join a room and take part in a call.
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
        url: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        room: Option<String>,

        /// Call whoever joins the room next.
        #[arg(long)]
        call: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Serve {
            bind,
            max_participants,
        } => {
            let config = ServerConfig {
                bind,
                room: RoomPolicy {
                    max_participants: (max_participants > 0).then_some(max_participants),
                },
            };
            println!("{}", format!("Relay starting on {}", bind).green().bold());
            duet_server::serve(config).await?;
        }

        Commands::Join {
            url,
            email,
            room,
            call,
        } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("Failed to read email")?,
            };
            let room: String = match room {
                Some(room) => room,
                None => Input::new()
                    .with_prompt("Room")
                    .interact_text()
                    .context("Failed to read room")?,
            };
            join(&url, email, RoomId::from(room), call).await?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn join(url: &str, email: String, room: RoomId, call: bool) -> Result<()> {
    let bus = SignalingBus::connect(url)
        .await
        .with_context(|| format!("Failed to reach relay at {}", url))?;

    let (session, mut events) = CallSession::new(
        bus,
        Arc::new(SimMedia::new(email.clone())),
        Arc::new(WebRtcPeerFactory::new(PeerConfig::default())),
        SessionConfig::default(),
    );
    let (commands, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(session.run(command_rx));

    commands
        .send(CallCommand::Join { email, room })
        .context("Session ended before joining")?;
    println!("{}", "Press Ctrl-C to hang up".dimmed());

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let start_call = call && matches!(event, SessionEvent::PeerJoined { .. });
                print_event(&event);
                if start_call {
                    let _ = commands.send(CallCommand::StartCall);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    drop(commands);
    let mut session = task.await.context("Session task panicked")??;
    session.leave_room().await?;
    println!("{}", "Bye".green());
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::JoinedRoom { room, id } => {
            println!("{} {} as {}", "Joined".green().bold(), room, id);
        }
        SessionEvent::RoomFull { room } => {
            println!("{} {} is full", "Rejected".red().bold(), room);
        }
        SessionEvent::PeerJoined { email, id } => {
            println!("{} {} ({})", "+".green(), email.bold(), id);
        }
        SessionEvent::PeerLeft { email, .. } => {
            println!("{} {}", "-".yellow(), email);
        }
        SessionEvent::IncomingCall { from } => {
            println!("{} from {}", "Incoming call".cyan().bold(), from);
        }
        SessionEvent::LocalStream(stream) => {
            println!("{} {} ({} tracks)", "Camera".cyan(), stream.id, stream.tracks.len());
        }
        SessionEvent::RemoteStream(stream) => {
            println!(
                "{} {} ({} tracks)",
                "Remote stream".magenta().bold(),
                stream.id,
                stream.tracks.len()
            );
        }
        SessionEvent::CallEnded => println!("{}", "Call ended".yellow()),
    }
}
