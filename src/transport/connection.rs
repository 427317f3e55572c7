use crate::error::TransportError;
use crate::protocol::{
    decode_server_message, encode_request, Command, PadEvent, Request, Response, ServerMessage,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Called from the reader task when the link drops without `close()`
pub(crate) type DisconnectHook = Box<dyn Fn(u64, Option<String>) + Send + Sync>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Routes incoming frames: responses to their waiting request, events to the
/// active signature subscription.
#[derive(Default)]
struct Dispatcher {
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    subscriber: Mutex<Option<mpsc::UnboundedSender<PadEvent>>>,
}

impl Dispatcher {
    fn resolve(&self, response: Response) {
        let waiter = self.pending.lock().remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!("Dropping response to unknown request {}", response.id),
        }
    }

    fn forward(&self, event: PadEvent) {
        let subscriber = self.subscriber.lock();
        match subscriber.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Signature subscription closed, event dropped");
                }
            }
            None => debug!("No active signature, dropping pad event {:?}", event),
        }
    }

    fn fail_all(&self, reason: Option<String>) {
        // Dropping the senders wakes every waiter with a closed channel
        self.pending.lock().clear();
        if let Some(tx) = self.subscriber.lock().take() {
            let _ = tx.send(PadEvent::Disconnect { reason });
        }
    }
}

/// One WebSocket link to the pad server
pub(crate) struct Connection {
    id: u64,
    url: String,
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    reader: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
    alive: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
}

impl Connection {
    /// Perform the WebSocket handshake and start the reader task
    pub(crate) async fn open(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
        on_lost: DisconnectHook,
    ) -> Result<Self, TransportError> {
        let handshake = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Connection {
                url: url.to_string(),
                details: format!("handshake timed out after {:?}", connect_timeout),
            })?;

        let (stream, _response) = handshake.map_err(|e| TransportError::Connection {
            url: url.to_string(),
            details: e.to_string(),
        })?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (writer, reader) = stream.split();
        let dispatcher = Arc::new(Dispatcher::default());
        let alive = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            id,
            reader,
            Arc::clone(&dispatcher),
            Arc::clone(&alive),
            on_lost,
        ));

        info!("Connected to pad server at {} (connection {})", url, id);

        Ok(Self {
            id,
            url: url.to_string(),
            writer: tokio::sync::Mutex::new(writer),
            reader,
            dispatcher,
            alive,
            next_request_id: AtomicU64::new(1),
            request_timeout,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its response
    pub(crate) async fn request(&self, command: Command) -> Result<Response, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Disconnected);
        }

        let name = command.name();
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(&Request { id, command })?;

        let (tx, rx) = oneshot::channel();
        self.dispatcher.pending.lock().insert(id, tx);

        debug!("-> {}", text);
        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(text)).await
        };
        if let Err(e) = sent {
            self.dispatcher.pending.lock().remove(&id);
            warn!("Failed to send {} to pad server: {}", name, e);
            return Err(TransportError::Disconnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                self.dispatcher.pending.lock().remove(&id);
                Err(TransportError::Timeout {
                    command: name.to_string(),
                })
            }
        }
    }

    /// Route pad events to a fresh channel, replacing any previous subscription
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<PadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_alive() {
            let _ = tx.send(PadEvent::Disconnect { reason: None });
        }
        if self.dispatcher.subscriber.lock().replace(tx).is_some() {
            warn!("Replacing an active signature subscription");
        }
        rx
    }

    pub(crate) fn unsubscribe(&self) {
        self.dispatcher.subscriber.lock().take();
    }

    /// Close the link without invoking the disconnect hook
    pub(crate) async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.close().await {
                debug!("Error closing pad server socket: {}", e);
            }
        }
        self.reader.abort();
        self.dispatcher.fail_all(Some("disconnected by client".to_string()));
        info!("Disconnected from pad server at {}", self.url);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    id: u64,
    mut stream: SplitStream<WsStream>,
    dispatcher: Arc<Dispatcher>,
    alive: Arc<AtomicBool>,
    on_lost: DisconnectHook,
) {
    let mut reason = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!("<- {}", text);
                match decode_server_message(&text) {
                    Ok(ServerMessage::Response(response)) => dispatcher.resolve(response),
                    Ok(ServerMessage::Event {
                        event: PadEvent::Log { message },
                    }) => {
                        info!(target: "sigpad::pad_server", "{}", message);
                    }
                    Ok(ServerMessage::Event {
                        event: PadEvent::Disconnect { reason: why },
                    }) => {
                        reason = Some(why.unwrap_or_else(|| "server closed the session".to_string()));
                        break;
                    }
                    Ok(ServerMessage::Event { event }) => dispatcher.forward(event),
                    Err(e) => warn!("Ignoring malformed pad server frame: {}", e),
                }
            }
            Ok(Message::Close(frame)) => {
                reason = frame.map(|f| f.reason.to_string());
                break;
            }
            Ok(_) => {}
            Err(e) => {
                reason = Some(e.to_string());
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    warn!(
        "Pad server connection {} lost: {}",
        id,
        reason.as_deref().unwrap_or("stream ended")
    );
    dispatcher.fail_all(reason.clone());
    on_lost(id, reason);
}
