use super::connection::{Connection, DisconnectHook};
use super::pad::{PadHandle, ScaleFactors};
use super::signature::{self, SignatureData, SignatureProgress, SignatureRequest};
use crate::config::{ServerConfig, SigpadConfig};
use crate::error::TransportError;
use crate::protocol::{Command, OpenPadResult, PadDescriptor, SearchPadsResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// State of the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct OpenPad {
    id: u64,
    index: u32,
    cancel: CancellationToken,
}

struct SessionInner {
    server: ServerConfig,
    min_duration_seconds: f64,
    connect_lock: tokio::sync::Mutex<()>,
    state: Mutex<ConnectionState>,
    connection: Mutex<Option<Arc<Connection>>>,
    pad: Mutex<Option<OpenPad>>,
    next_pad_id: AtomicU64,
}

impl SessionInner {
    fn handle_connection_lost(&self, connection_id: u64, reason: Option<String>) {
        let mut connection = self.connection.lock();
        if connection.as_ref().map(|c| c.id()) != Some(connection_id) {
            return;
        }
        *connection = None;
        drop(connection);

        *self.state.lock() = ConnectionState::Disconnected;
        if let Some(pad) = self.pad.lock().take() {
            pad.cancel.cancel();
            warn!("Pad {} released after connection loss", pad.index);
        }
        warn!(
            "Pad server session ended: {}",
            reason.as_deref().unwrap_or("connection lost")
        );
    }
}

/// Session with the local pad server.
///
/// Cloning is cheap and every clone drives the same connection and the same
/// (single) open pad. Compose one per application and hand it to the capture
/// surface.
#[derive(Clone)]
pub struct TransportSession {
    inner: Arc<SessionInner>,
}

impl TransportSession {
    pub fn new(server: ServerConfig, min_duration_seconds: f64) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                server,
                min_duration_seconds,
                connect_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(ConnectionState::Disconnected),
                connection: Mutex::new(None),
                pad: Mutex::new(None),
                next_pad_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &SigpadConfig) -> Self {
        Self::new(
            config.server.clone(),
            config.signature.min_duration_seconds,
        )
    }

    pub fn server_url(&self) -> &str {
        &self.inner.server.url
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .as_ref()
            .map(|c| c.is_alive())
            .unwrap_or(false)
    }

    pub fn is_pad_open(&self) -> bool {
        self.inner.pad.lock().is_some()
    }

    fn connection(&self) -> Result<Arc<Connection>, TransportError> {
        match self.inner.connection.lock().as_ref() {
            Some(connection) if connection.is_alive() => Ok(Arc::clone(connection)),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Connect to the pad server, reusing a live connection
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.inner.connect_lock.lock().await;

        if self.is_connected() {
            debug!("Already connected to pad server");
            return Ok(());
        }

        // A pad belongs to the link it was opened on
        if self.inner.connection.lock().take().is_some() {
            debug!("Replacing dead pad server connection");
        }
        if let Some(pad) = self.inner.pad.lock().take() {
            pad.cancel.cancel();
            warn!("Pad {} dropped with its closed connection", pad.index);
        }

        *self.inner.state.lock() = ConnectionState::Connecting;
        info!("Connecting to pad server at {}", self.inner.server.url);

        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let on_lost: DisconnectHook = Box::new(move |id, reason| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_connection_lost(id, reason);
            }
        });

        match Connection::open(
            &self.inner.server.url,
            self.inner.server.connect_timeout(),
            self.inner.server.request_timeout(),
            on_lost,
        )
        .await
        {
            Ok(connection) => {
                *self.inner.connection.lock() = Some(Arc::new(connection));
                *self.inner.state.lock() = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                *self.inner.state.lock() = ConnectionState::Disconnected;
                error!("Pad server connection failed: {}", e);
                Err(e)
            }
        }
    }

    /// Tear down the connection; no-op when not connected
    pub async fn disconnect(&self) {
        let connection = self.inner.connection.lock().take();
        if let Some(pad) = self.inner.pad.lock().take() {
            pad.cancel.cancel();
        }
        *self.inner.state.lock() = ConnectionState::Disconnected;

        match connection {
            Some(connection) => connection.close().await,
            None => debug!("disconnect: not connected"),
        }
    }

    /// Discover pads of the configured device class
    pub async fn search_pads(&self) -> Result<Vec<PadDescriptor>, TransportError> {
        let connection = self.connection()?;
        let result: SearchPadsResult = connection
            .request(Command::SearchPads {
                pad_subset: self.inner.server.pad_subset.clone(),
            })
            .await?
            .into_result("search_pads")?;

        debug!("Discovered {} pad(s)", result.pads.len());
        Ok(result.pads)
    }

    /// Open the pad at `index` of the discovery list
    pub async fn open_pad(&self, index: u32) -> Result<PadHandle, TransportError> {
        let connection = self.connection()?;
        if self.is_pad_open() {
            return Err(TransportError::PadAlreadyOpen);
        }

        let pads = self.search_pads().await?;
        if pads.is_empty() {
            warn!("No {} signature pad connected", self.inner.server.pad_subset);
            return Err(TransportError::NoPadFound);
        }
        if index as usize >= pads.len() {
            warn!(
                "Pad index {} requested but only {} pad(s) found",
                index,
                pads.len()
            );
            return Err(TransportError::NoPadFound);
        }

        let opened: OpenPadResult = connection
            .request(Command::OpenPad { index })
            .await?
            .into_result("open_pad")?;

        let Some(scale) = ScaleFactors::from_resolution(
            opened.display_width,
            opened.display_height,
            opened.x_resolution,
            opened.y_resolution,
        ) else {
            let _ = connection.request(Command::ClosePad { index }).await;
            return Err(TransportError::Codec {
                details: "pad reported a zero native resolution".to_string(),
            });
        };

        let id = self.inner.next_pad_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut pad = self.inner.pad.lock();
            if pad.is_some() {
                return Err(TransportError::PadAlreadyOpen);
            }
            *pad = Some(OpenPad {
                id,
                index,
                cancel: CancellationToken::new(),
            });
        }

        let handle = PadHandle::new(id, index, opened, scale);
        info!(
            "Opened pad {}: {} (scale {:.3}x{:.3}, {} Hz)",
            index,
            handle.info().description(),
            scale.x,
            scale.y,
            handle.sample_rate()
        );
        Ok(handle)
    }

    /// Release the open pad. Safe to call at any time; failures are logged only.
    pub async fn close_pad(&self) {
        self.release_pad(None).await
    }

    /// Release the pad `pad` refers to; a pad opened since is left alone
    pub async fn close_pad_handle(&self, pad: PadHandle) {
        self.release_pad(Some(pad.id)).await
    }

    /// Close the open pad, restricted to the pad with id `only` when given
    async fn release_pad(&self, only: Option<u64>) {
        let pad = {
            let mut open = self.inner.pad.lock();
            let is_target = open
                .as_ref()
                .map_or(false, |current| only.map_or(true, |id| id == current.id));
            if is_target {
                open.take()
            } else {
                None
            }
        };
        let Some(pad) = pad else {
            debug!("close_pad: no pad open");
            return;
        };

        // Abort a signature still waiting on this pad
        pad.cancel.cancel();

        let connection = match self.connection() {
            Ok(connection) => connection,
            Err(_) => {
                debug!("close_pad: pad {} released, server not connected", pad.index);
                return;
            }
        };

        let closed = connection
            .request(Command::ClosePad { index: pad.index })
            .await
            .and_then(|r| r.into_result::<serde_json::Value>("close_pad"));
        match closed {
            Ok(_) => info!("Closed pad {}", pad.index),
            Err(e) => warn!("Failed to close pad {}: {}", pad.index, e),
        }
    }

    /// Start a signature on the open pad and wait until the signer confirms it.
    ///
    /// `on_progress` sees every pen sample in display coordinates and every
    /// restart. There is no timeout: the call waits for a button on the pad,
    /// a [`close_pad`](Self::close_pad) from another task, or a disconnect.
    /// The pad is closed whenever this returns.
    pub async fn start_signature<F>(
        &self,
        pad: PadHandle,
        request: SignatureRequest,
        mut on_progress: F,
    ) -> Result<SignatureData, TransportError>
    where
        F: FnMut(SignatureProgress) + Send,
    {
        let cancel = {
            let open = self.inner.pad.lock();
            match open.as_ref() {
                Some(open) if open.id == pad.id => open.cancel.clone(),
                _ => return Err(TransportError::PadNotOpen),
            }
        };
        let connection = self.connection()?;

        let attempt = Uuid::new_v4();
        info!(
            "Starting signature {} on pad {} ({})",
            attempt,
            pad.index(),
            request.field_name
        );

        let mut events = connection.subscribe();
        let started = connection
            .request(Command::StartSignature {
                field_name: request.field_name,
                custom_text: request.custom_text,
            })
            .await
            .and_then(|r| r.into_result::<serde_json::Value>("start_signature"));

        if let Err(e) = started {
            error!("Failed to start signature {}: {}", attempt, e);
            connection.unsubscribe();
            self.release_pad(Some(pad.id)).await;
            return Err(e);
        }

        let outcome = signature::drive(
            &connection,
            &pad,
            &mut events,
            &cancel,
            self.inner.min_duration_seconds,
            &mut on_progress,
        )
        .await;
        connection.unsubscribe();

        match &outcome {
            Ok(data) => info!(
                "Signature {} completed with {} points",
                attempt, data.counted_points
            ),
            Err(TransportError::Cancelled) => info!("Signature {} cancelled", attempt),
            Err(e) => error!("Signature {} failed: {}", attempt, e),
        }

        self.release_pad(Some(pad.id)).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::PadSimulator;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reconnect_forgets_pad_of_dead_connection() {
        let simulator = PadSimulator::new().bind("127.0.0.1:0").await.unwrap();
        let server = ServerConfig {
            url: simulator.url(),
            ..ServerConfig::default()
        };
        let session = TransportSession::new(server, 0.2);
        session.connect().await.unwrap();
        let _pad = session.open_pad(0).await.unwrap();

        simulator.handle().disconnect_clients();
        for _ in 0..100 {
            if !session.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!session.is_connected());

        // Loss handling skipped, as when a new link was installed first
        let stale = CancellationToken::new();
        *session.inner.pad.lock() = Some(OpenPad {
            id: 999,
            index: 0,
            cancel: stale.clone(),
        });

        session.connect().await.unwrap();
        assert!(!session.is_pad_open());
        assert!(stale.is_cancelled());

        let pad = session.open_pad(0).await.unwrap();
        assert_eq!(pad.index(), 0);
    }
}
