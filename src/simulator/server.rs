use crate::error::Result;
use crate::protocol::{
    decode_request, encode_server_message, Command, ConfirmResult, OpenPadResult, PadDescriptor,
    PadEvent, Response, SearchPadsResult, ServerMessage, SignatureDataResult,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// A pad the simulator pretends is attached
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPad {
    pub pad_type: String,
    pub serial: String,
    pub firmware: String,
    pub display_width: u32,
    pub display_height: u32,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub sample_rate: u32,
}

impl Default for SimulatedPad {
    fn default() -> Self {
        Self {
            pad_type: "Sigma".to_string(),
            serial: "SIM-0001".to_string(),
            firmware: "1.0.0".to_string(),
            display_width: 320,
            display_height: 160,
            x_resolution: 3200,
            y_resolution: 1600,
            sample_rate: 250,
        }
    }
}

#[derive(Default)]
struct SimState {
    pads: Vec<SimulatedPad>,
    open: Option<u32>,
    capturing: bool,
    attempt_points: u64,
    commands: Vec<Command>,
    failures: HashMap<&'static str, (i32, String)>,
    clients: Vec<mpsc::UnboundedSender<Message>>,
}

struct Shared {
    state: Mutex<SimState>,
    command_seen: Notify,
}

/// Local stand-in for the pad server, scriptable from tests and the CLI
pub struct PadSimulator {
    pads: Vec<SimulatedPad>,
    failures: HashMap<&'static str, (i32, String)>,
}

impl PadSimulator {
    pub fn new() -> Self {
        Self::with_pads(vec![SimulatedPad::default()])
    }

    pub fn with_pads(pads: Vec<SimulatedPad>) -> Self {
        Self {
            pads,
            failures: HashMap::new(),
        }
    }

    /// Make every `command` fail with the given return code
    pub fn fail_command(mut self, command: &'static str, code: i32, description: &str) -> Self {
        self.failures
            .insert(command, (code, description.to_string()));
        self
    }

    /// Start serving on `addr` (port 0 picks a free port)
    pub async fn bind(self, addr: &str) -> Result<RunningSimulator> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SimState {
                pads: self.pads,
                failures: self.failures,
                ..SimState::default()
            }),
            command_seen: Notify::new(),
        });

        let accept_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("Simulator accepted {}", peer);
                        tokio::spawn(serve_client(stream, Arc::clone(&accept_shared)));
                    }
                    Err(e) => {
                        warn!("Simulator accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        });

        info!("Pad simulator listening on ws://{}", local_addr);

        Ok(RunningSimulator {
            addr: local_addr,
            handle: SimulatorHandle { shared },
            task,
        })
    }
}

impl Default for PadSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound simulator; stops serving when dropped
pub struct RunningSimulator {
    addr: SocketAddr,
    handle: SimulatorHandle,
    task: JoinHandle<()>,
}

impl RunningSimulator {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }
}

impl Drop for RunningSimulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drives the simulated pad: pen samples, buttons, faults
#[derive(Clone)]
pub struct SimulatorHandle {
    shared: Arc<Shared>,
}

impl SimulatorHandle {
    /// Push an event to every connected client
    pub fn emit(&self, event: PadEvent) {
        let state = self.shared.state.lock();
        broadcast(&state.clients, &event);
    }

    /// Emit pen samples in native coordinates
    pub fn draw(&self, points: &[(f64, f64, u32)]) {
        let mut state = self.shared.state.lock();
        for &(x, y, p) in points {
            state.attempt_points += 1;
            broadcast(&state.clients, &PadEvent::SignaturePoint { x, y, p });
        }
    }

    /// Emit a wavy stroke of `count` samples across the sensor
    pub fn scribble(&self, count: usize) {
        let (width, height) = {
            let state = self.shared.state.lock();
            let pad = state
                .open
                .and_then(|i| state.pads.get(i as usize))
                .or_else(|| state.pads.first())
                .cloned()
                .unwrap_or_default();
            (pad.x_resolution as f64, pad.y_resolution as f64)
        };

        let points: Vec<(f64, f64, u32)> = (0..count)
            .map(|i| {
                let t = i as f64 / count.max(1) as f64;
                let x = width * (0.1 + 0.8 * t);
                let y = height * (0.5 + 0.3 * (t * std::f64::consts::TAU * 2.0).sin());
                let p = if i == 0 { 0 } else { 512 };
                (x, y, p)
            })
            .collect();
        self.draw(&points);
    }

    pub fn press_confirm(&self) {
        self.emit(PadEvent::SignatureConfirm);
    }

    pub fn press_retry(&self) {
        self.emit(PadEvent::SignatureRetry);
    }

    pub fn press_cancel(&self) {
        self.emit(PadEvent::SignatureCancel);
    }

    /// Report a device fault the way the server does
    pub fn raise_error(&self, context: &str, code: i32, description: &str) {
        self.emit(PadEvent::Error {
            context: context.to_string(),
            code,
            description: description.to_string(),
        });
    }

    /// Drop every client connection
    pub fn disconnect_clients(&self) {
        let mut state = self.shared.state.lock();
        for client in state.clients.drain(..) {
            let _ = client.send(Message::Close(None));
        }
        state.open = None;
        state.capturing = false;
    }

    pub fn commands(&self) -> Vec<Command> {
        self.shared.state.lock().commands.clone()
    }

    pub fn command_count(&self, name: &str) -> usize {
        self.shared
            .state
            .lock()
            .commands
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }

    pub fn is_pad_open(&self) -> bool {
        self.shared.state.lock().open.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.state.lock().capturing
    }

    /// Wait until `name` has been received at least `occurrences` times
    pub async fn wait_for_command(&self, name: &str, occurrences: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let notified = self.shared.command_seen.notified();
            if self.command_count(name) >= occurrences {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }
}

fn broadcast(clients: &[mpsc::UnboundedSender<Message>], event: &PadEvent) {
    let message = ServerMessage::Event {
        event: event.clone(),
    };
    match encode_server_message(&message) {
        Ok(text) => {
            for client in clients {
                let _ = client.send(Message::Text(text.clone()));
            }
        }
        Err(e) => warn!("Simulator failed to encode event: {}", e),
    }
}

async fn serve_client(stream: TcpStream, shared: Arc<Shared>) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Simulator handshake failed: {}", e);
            return;
        }
    };

    let (mut writer, mut reader) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    shared.state.lock().clients.push(tx.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if writer.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(frame) = reader.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let request = match decode_request(&text) {
            Ok(request) => request,
            Err(e) => {
                warn!("Simulator received malformed request: {}", e);
                continue;
            }
        };

        let response = handle_command(&shared, request.id, request.command);
        match encode_server_message(&ServerMessage::Response(response)) {
            Ok(text) => {
                let _ = tx.send(Message::Text(text));
            }
            Err(e) => warn!("Simulator failed to encode response: {}", e),
        }
        shared.command_seen.notify_waiters();
    }

    shared
        .state
        .lock()
        .clients
        .retain(|client| !client.same_channel(&tx));
    writer_task.abort();
}

fn handle_command(shared: &Shared, id: u64, command: Command) -> Response {
    let mut state = shared.state.lock();
    let name = command.name();
    state.commands.push(command.clone());

    if let Some((code, description)) = state.failures.get(name) {
        return Response::failure(id, *code, name, description);
    }

    let ok = |result: serde_json::Result<serde_json::Value>| match result {
        Ok(value) => Response::ok(id, value),
        Err(e) => Response::failure(id, -99, name, &e.to_string()),
    };

    match command {
        Command::SearchPads { pad_subset } => {
            let pads = if pad_subset.eq_ignore_ascii_case("HID") {
                state
                    .pads
                    .iter()
                    .map(|pad| PadDescriptor {
                        pad_type: pad.pad_type.clone(),
                        serial: pad.serial.clone(),
                        connection: "HID".to_string(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            ok(serde_json::to_value(SearchPadsResult { pads }))
        }
        Command::OpenPad { index } => {
            if state.open.is_some() {
                return Response::failure(id, -12, name, "pad already open");
            }
            let Some(pad) = state.pads.get(index as usize).cloned() else {
                return Response::failure(id, -3, name, "invalid pad index");
            };
            state.open = Some(index);
            ok(serde_json::to_value(OpenPadResult {
                pad_type: pad.pad_type,
                serial: pad.serial,
                firmware: pad.firmware,
                display_width: pad.display_width,
                display_height: pad.display_height,
                x_resolution: pad.x_resolution,
                y_resolution: pad.y_resolution,
                sample_rate: pad.sample_rate,
            }))
        }
        Command::ClosePad { index } => {
            if state.open != Some(index) {
                return Response::failure(id, -5, name, "pad not open");
            }
            state.open = None;
            state.capturing = false;
            Response::ok(id, serde_json::Value::Null)
        }
        Command::StartSignature { .. } => {
            if state.open.is_none() {
                return Response::failure(id, -5, name, "pad not open");
            }
            state.capturing = true;
            state.attempt_points = 0;
            Response::ok(id, serde_json::Value::Null)
        }
        Command::RetrySignature => {
            state.attempt_points = 0;
            Response::ok(id, serde_json::Value::Null)
        }
        Command::ConfirmSignature => ok(serde_json::to_value(ConfirmResult {
            counted_points: state.attempt_points,
        })),
        Command::CancelSignature => {
            state.capturing = false;
            state.attempt_points = 0;
            Response::ok(id, serde_json::Value::Null)
        }
        Command::GetSignatureData => {
            state.capturing = false;
            let sign_data = STANDARD.encode(format!("sim:{}", state.attempt_points));
            ok(serde_json::to_value(SignatureDataResult { sign_data }))
        }
    }
}
