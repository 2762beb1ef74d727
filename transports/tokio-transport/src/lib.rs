//! Tokio-based WebSocket transport for the voice call signaling channel.
//!
//! The transport owns a reconnecting socket: it dials the preferred URI
//! first, falls back through the configured URI list on failure, and keeps
//! re-dialing with a capped delay until closed. Consumers see it as a black
//! box emitting [`TransportEvent`]s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message;

/// An event produced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A socket was established and is ready for sends.
    Opened,
    /// A text frame arrived from the server.
    TextReceived(String),
    /// The socket went away. The transport keeps re-dialing unless closed.
    Closed,
    /// A socket level failure, with whatever detail the socket gave us.
    Error(Option<String>),
}

/// A duplex, text-framed connection to the signaling server.
///
/// Sends never block: a frame is either handed to the socket writer or
/// rejected because no socket is currently open.
pub trait Transport: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), anyhow::Error>;

    fn is_open(&self) -> bool;

    /// Stops re-dialing and closes the current socket, if any.
    fn close(&self);

    /// The URI of the socket currently (or most recently) open.
    fn uri(&self) -> Option<String>;

    fn update_uris(&self, uris: Vec<String>);

    fn update_preferred_uri(&self, uri: Option<String>);
}

/// A factory responsible for creating new transport instances.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Creates a new transport and returns it, along with a stream of events.
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error>;
}

const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone, Debug)]
pub struct TransportOptions {
    pub uris: Vec<String>,
    pub preferred_uri: Option<String>,
    /// Upper bound on the delay between re-dial attempts.
    pub max_reconnect_delay: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            uris: Vec::new(),
            preferred_uri: None,
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct UriSelector {
    uris: Vec<String>,
    preferred: Option<String>,
    preferred_failed: bool,
    index: usize,
}

impl UriSelector {
    fn new(uris: Vec<String>, preferred: Option<String>) -> Self {
        Self {
            uris,
            preferred,
            ..Default::default()
        }
    }

    fn current(&self) -> Option<String> {
        if !self.preferred_failed && self.preferred.is_some() {
            return self.preferred.clone();
        }
        if self.uris.is_empty() {
            return None;
        }
        Some(self.uris[self.index % self.uris.len()].clone())
    }

    fn mark_failed(&mut self) {
        if self.preferred.is_some() && !self.preferred_failed {
            self.preferred_failed = true;
        } else if !self.uris.is_empty() {
            self.index = (self.index + 1) % self.uris.len();
        }
    }

    fn set_uris(&mut self, uris: Vec<String>) {
        self.uris = uris;
        self.index = 0;
    }

    fn set_preferred(&mut self, uri: Option<String>) {
        self.preferred = uri;
        self.preferred_failed = false;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    selector: Mutex<UriSelector>,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    current_uri: Mutex<Option<String>>,
    is_open: AtomicBool,
    is_closed: AtomicBool,
    shutdown: Notify,
}

/// WebSocket transport backed by `tokio-tungstenite`.
pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

impl Transport for WebSocketTransport {
    fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
        if !self.is_open() {
            return Err(anyhow::anyhow!("Socket is closed"));
        }
        let writer = lock(&self.shared.writer);
        let tx = writer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Socket is closed"))?;
        trace!(target: "Transport/WebSocket", "--> {text}");
        tx.send(Message::text(text.to_owned()))
            .map_err(|_| anyhow::anyhow!("Socket writer is gone"))
    }

    fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.shared.is_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(target: "Transport/WebSocket", "Closing transport");
        self.shared.is_open.store(false, Ordering::Release);
        lock(&self.shared.writer).take();
        self.shared.shutdown.notify_one();
    }

    fn uri(&self) -> Option<String> {
        lock(&self.shared.current_uri).clone()
    }

    fn update_uris(&self, uris: Vec<String>) {
        lock(&self.shared.selector).set_uris(uris);
    }

    fn update_preferred_uri(&self, uri: Option<String>) {
        lock(&self.shared.selector).set_preferred(uri);
    }
}

/// Factory for [`WebSocketTransport`]s.
pub struct WebSocketTransportFactory {
    options: TransportOptions,
}

impl WebSocketTransportFactory {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        if self.options.uris.is_empty() && self.options.preferred_uri.is_none() {
            return Err(anyhow::anyhow!("No signaling URIs configured"));
        }

        let shared = Arc::new(Shared {
            selector: Mutex::new(UriSelector::new(
                self.options.uris.clone(),
                self.options.preferred_uri.clone(),
            )),
            writer: Mutex::new(None),
            current_uri: Mutex::new(None),
            is_open: AtomicBool::new(false),
            is_closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(connection_loop(
            shared.clone(),
            event_tx,
            self.options.max_reconnect_delay,
        ));

        Ok((Arc::new(WebSocketTransport { shared }), event_rx))
    }
}

async fn connection_loop(
    shared: Arc<Shared>,
    events: mpsc::Sender<TransportEvent>,
    max_delay: Duration,
) {
    let mut error_count: u32 = 0;

    while !shared.is_closed.load(Ordering::Acquire) {
        let next = lock(&shared.selector).current();
        let Some(uri) = next else {
            error!(target: "Transport/WebSocket", "No URI available to dial");
            let _ = events
                .send(TransportEvent::Error(Some("No URI available".into())))
                .await;
            break;
        };

        info!(target: "Transport/WebSocket", "Dialing {uri}");
        match tokio_tungstenite::connect_async(uri.as_str()).await {
            Ok((ws, _response)) => {
                if shared.is_closed.load(Ordering::Acquire) {
                    break;
                }
                error_count = 0;
                let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                *lock(&shared.writer) = Some(writer_tx);
                *lock(&shared.current_uri) = Some(uri);
                shared.is_open.store(true, Ordering::Release);

                if events.send(TransportEvent::Opened).await.is_err() {
                    break;
                }
                pump(ws, writer_rx, &shared, &events).await;

                shared.is_open.store(false, Ordering::Release);
                lock(&shared.writer).take();
                if events.send(TransportEvent::Closed).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(target: "Transport/WebSocket", "Failed to connect to {uri}: {e}");
                lock(&shared.selector).mark_failed();
                if events
                    .send(TransportEvent::Error(Some(e.to_string())))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }

        if shared.is_closed.load(Ordering::Acquire) {
            break;
        }
        error_count += 1;
        let delay = Duration::from_secs(u64::from(error_count * 2)).min(max_delay);
        debug!(target: "Transport/WebSocket", "Re-dialing in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.shutdown.notified() => break,
        }
    }

    debug!(target: "Transport/WebSocket", "Connection loop finished");
}

async fn pump<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    mut writer_rx: mpsc::UnboundedReceiver<Message>,
    shared: &Shared,
    events: &mpsc::Sender<TransportEvent>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.notified() => {
                while let Ok(msg) = writer_rx.try_recv() {
                    if sink.send(msg).await.is_err() {
                        return;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            outgoing = writer_rx.recv() => {
                let Some(msg) = outgoing else { return };
                if let Err(e) = sink.send(msg).await {
                    warn!(target: "Transport/WebSocket", "WebSocket send error: {e}");
                    let _ = events.send(TransportEvent::Error(Some(e.to_string()))).await;
                    return;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    trace!(target: "Transport/WebSocket", "<-- {}", text.as_str());
                    if events
                        .send(TransportEvent::TextReceived(text.as_str().to_owned()))
                        .await
                        .is_err()
                    {
                        warn!(target: "Transport/WebSocket", "Event receiver dropped, closing pump");
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target: "Transport/WebSocket", "Received close frame: {frame:?}");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(target: "Transport/WebSocket", "Error reading from websocket: {e}");
                    let _ = events.send(TransportEvent::Error(Some(e.to_string()))).await;
                    return;
                }
                None => {
                    trace!(target: "Transport/WebSocket", "Websocket stream ended");
                    return;
                }
            },
        }
    }
}
