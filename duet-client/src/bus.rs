use crate::CallError;
use dashmap::DashMap;
use duet_core::{ClientSignal, EventKind, RelaySignal};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<RelaySignal>,
}

type Subscribers = Arc<DashMap<u64, Subscriber>>;

/// Cloneable handle for emitting signals onto a bus.
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<ClientSignal>,
}

impl SignalSender {
    /// Fire-and-forget. Fails only once the transport is gone.
    pub fn emit(&self, signal: ClientSignal) -> Result<(), CallError> {
        debug!("Emitting {}", signal.event_name());
        self.tx
            .send(signal)
            .map_err(|_| CallError::SignalingDisconnected)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Named-event channel between one client and the relay.
///
/// Incoming signals fan out to every subscription whose kinds match, in
/// arrival order. Dropping the bus closes the transport and ends every
/// subscription.
pub struct SignalingBus {
    sender: SignalSender,
    subscribers: Subscribers,
    next_id: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalingBus {
    /// Opens a WebSocket to the relay's `/ws` endpoint.
    pub async fn connect(url: &str) -> Result<Self, CallError> {
        info!("Connecting to relay at {}", url);
        let (socket, _) = connect_async(url).await?;
        info!("Connected to relay");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_socket(socket, out_rx, in_tx));

        let mut bus = Self::from_channels(out_tx, in_rx);
        bus.tasks.push(pump);
        Ok(bus)
    }

    /// Builds a bus over an already ordered channel pair, e.g. an in-process
    /// relay connection.
    pub fn from_channels(
        outgoing: mpsc::UnboundedSender<ClientSignal>,
        incoming: mpsc::UnboundedReceiver<RelaySignal>,
    ) -> Self {
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let dispatcher = tokio::spawn(dispatch(incoming, subscribers.clone()));

        Self {
            sender: SignalSender { tx: outgoing },
            subscribers,
            next_id: AtomicU64::new(0),
            tasks: vec![dispatcher],
        }
    }

    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    pub fn emit(&self, signal: ClientSignal) -> Result<(), CallError> {
        self.sender.emit(signal)
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(
            id,
            Subscriber {
                kinds: kinds.to_vec(),
                tx,
            },
        );

        Subscription {
            id,
            rx,
            subscribers: self.subscribers.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Drop for SignalingBus {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.subscribers.clear();
    }
}

/// Receiver for the signals of the kinds it was created with. Dropping it
/// unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<RelaySignal>,
    subscribers: Subscribers,
}

impl Subscription {
    /// `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<RelaySignal> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RelaySignal> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

pub fn encode(signal: &ClientSignal) -> Result<String, CallError> {
    Ok(serde_json::to_string(signal)?)
}

pub fn decode(text: &str) -> Result<RelaySignal, CallError> {
    Ok(serde_json::from_str(text)?)
}

async fn dispatch(mut incoming: mpsc::UnboundedReceiver<RelaySignal>, subscribers: Subscribers) {
    while let Some(signal) = incoming.recv().await {
        let kind = signal.kind();
        let mut delivered = false;
        for entry in subscribers.iter() {
            if entry.kinds.contains(&kind) {
                delivered |= entry.tx.send(signal.clone()).is_ok();
            }
        }
        if !delivered {
            debug!("No subscriber for {}, dropping", kind);
        }
    }

    debug!(
        "Signaling transport closed, ending {} subscriptions",
        subscribers.len()
    );
    subscribers.clear();
}

async fn pump_socket(
    socket: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<ClientSignal>,
    incoming: mpsc::UnboundedSender<RelaySignal>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            signal = outgoing.recv() => {
                let Some(signal) = signal else {
                    let _ = write.close().await;
                    break;
                };
                let text = match encode(&signal) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {}: {}", signal.event_name(), e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!("Failed to send signal: {}", e);
                    break;
                }
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(signal) => {
                        if incoming.send(signal).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping signal: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!("Signaling socket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    debug!("Signaling socket pump finished");
}
