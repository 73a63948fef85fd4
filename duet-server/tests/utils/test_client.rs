use anyhow::{Context, Result};
use duet_core::{ClientSignal, RelaySignal};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::signal_helpers::SIGNAL_TIMEOUT_MS;

/// A raw WebSocket client speaking the JSON signaling protocol.
pub struct WsTestClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let url = format!("ws://{}/ws", addr);
        let (socket, _) = connect_async(url.as_str())
            .await
            .context("Failed to connect to relay")?;
        Ok(Self { socket })
    }

    pub async fn send(&mut self, signal: &ClientSignal) -> Result<()> {
        let json = serde_json::to_string(signal)?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .context("Failed to send signal")?;
        Ok(())
    }

    /// Next signal from the relay, skipping control frames.
    pub async fn recv(&mut self) -> Result<RelaySignal> {
        let timeout = Duration::from_millis(SIGNAL_TIMEOUT_MS);
        loop {
            let msg = tokio::time::timeout(timeout, self.socket.next())
                .await
                .context("Timeout waiting for signal")?
                .context("Socket closed")??;

            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).context("Malformed signal");
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await.context("Failed to close socket")?;
        Ok(())
    }
}
