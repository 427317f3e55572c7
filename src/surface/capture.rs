use super::canvas::InkCanvas;
use super::freehand::FreehandPad;
use super::types::{
    parse_ink_color, BorderStyle, CaptureOutcome, CaptureOutput, CaptureStatus, InputMode,
    SurfaceOptions,
};
use crate::config::SignatureConfig;
use crate::error::{CanvasError, SigpadError, SurfaceError};
use crate::events::{EventBus, SigpadEvent};
use crate::transport::{RetryReason, SignatureProgress, SignatureRequest, TransportSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

pub const TOO_SHORT_HINT: &str = "Signature too short, please sign again";

/// Consumer callback receiving every published value
pub type ChangeCallback = Box<dyn FnMut(CaptureOutput) + Send>;

struct SurfaceState {
    mode: InputMode,
    status: CaptureStatus,
    error_message: Option<String>,
    hint: Option<String>,
    canvas: InkCanvas,
    freehand: FreehandPad,
    /// Last published image, re-rendered on resize
    value: Option<String>,
    container_width: u32,
    /// Bumped whenever an in-flight hardware capture must stop touching state
    generation: u64,
}

/// Signature field with freehand and hardware pad input
pub struct SignatureCapture {
    options: SurfaceOptions,
    transport: TransportSession,
    request: SignatureRequest,
    pad_index: u32,
    state: Arc<Mutex<SurfaceState>>,
    on_change: Mutex<ChangeCallback>,
    events: Option<Arc<EventBus>>,
}

impl SignatureCapture {
    pub fn new<F>(
        options: SurfaceOptions,
        transport: TransportSession,
        on_change: F,
    ) -> Result<Self, CanvasError>
    where
        F: FnMut(CaptureOutput) + Send + 'static,
    {
        let ink = parse_ink_color(&options.ink_color)?;
        let mut canvas = InkCanvas::new(options.width, options.height, ink, options.pen_width);

        let value = match &options.initial_value {
            Some(url) => {
                canvas.load_data_url(url)?;
                Some(url.clone())
            }
            None => None,
        };

        let state = SurfaceState {
            mode: InputMode::Canvas,
            status: CaptureStatus::Idle,
            error_message: None,
            hint: None,
            canvas,
            freehand: FreehandPad::new(!options.disabled),
            value,
            container_width: options.width.max(1),
            generation: 0,
        };

        Ok(Self {
            request: SignatureRequest::from(&SignatureConfig::default()),
            pad_index: 0,
            transport,
            options,
            state: Arc::new(Mutex::new(state)),
            on_change: Mutex::new(Box::new(on_change)),
            events: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.events = Some(event_bus);
        self
    }

    pub fn with_signature_request(mut self, request: SignatureRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_pad_index(mut self, index: u32) -> Self {
        self.pad_index = index;
        self
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    pub fn input_mode(&self) -> InputMode {
        self.state.lock().mode
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.state.lock().status
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.lock().error_message.clone()
    }

    pub fn hint(&self) -> Option<String> {
        self.state.lock().hint.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().canvas.is_empty()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.state.lock().canvas.dimensions()
    }

    pub fn has_ink_at(&self, x: u32, y: u32) -> bool {
        self.state.lock().canvas.has_ink_at(x, y)
    }

    pub fn to_data_url(&self) -> Result<String, CanvasError> {
        self.state.lock().canvas.to_data_url()
    }

    pub fn label(&self) -> Option<&str> {
        self.options.label.as_deref()
    }

    pub fn border_style(&self) -> BorderStyle {
        if self.options.error {
            BorderStyle::Error
        } else {
            BorderStyle::Normal
        }
    }

    /// Whether the mode toggle is offered at all
    pub fn shows_mode_toggle(&self) -> bool {
        self.options.hardware_toggle && !self.options.disabled
    }

    /// Whether a "start" or "retry" affordance should be enabled
    pub fn can_start_hardware_capture(&self) -> bool {
        let state = self.state.lock();
        !self.options.disabled && state.mode == InputMode::Hardware && !state.status.is_busy()
    }

    fn emit(&self, event: SigpadEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.publish(event);
        }
    }

    fn publish(&self, output: CaptureOutput) {
        self.emit(SigpadEvent::OutputPublished {
            empty: output.is_empty(),
            timestamp: SystemTime::now(),
        });
        let mut on_change = self.on_change.lock();
        (on_change.as_mut())(output);
    }

    /// Switch input source. Always clears the drawing and the status.
    pub async fn set_input_mode(&self, mode: InputMode) -> Result<(), SurfaceError> {
        if self.options.disabled {
            return Err(SurfaceError::Disabled);
        }
        if mode == InputMode::Hardware && !self.options.hardware_toggle {
            return Err(SurfaceError::HardwareUnavailable);
        }

        let (was_hardware, previous_status) = {
            let mut state = self.state.lock();
            let was_hardware = state.mode == InputMode::Hardware;
            let previous_status = std::mem::replace(&mut state.status, CaptureStatus::Idle);

            state.mode = mode;
            state.generation += 1;
            state.error_message = None;
            state.hint = None;
            state.value = None;
            match mode {
                InputMode::Canvas => {
                    let width = state.container_width;
                    state.canvas.resize(width, self.options.height);
                    state.freehand.on();
                }
                InputMode::Hardware => {
                    state.freehand.off();
                    state.canvas.clear();
                }
            }
            (was_hardware, previous_status)
        };

        info!("Signature input mode set to {:?}", mode);
        self.emit(SigpadEvent::InputModeChanged { mode });
        if previous_status != CaptureStatus::Idle {
            self.emit(SigpadEvent::CaptureStatusChanged {
                status: CaptureStatus::Idle,
            });
        }

        if was_hardware {
            self.transport.close_pad().await;
        }
        Ok(())
    }

    pub fn pointer_down(&self, x: f32, y: f32) -> bool {
        let mut state = self.state.lock();
        if self.options.disabled || state.mode != InputMode::Canvas {
            return false;
        }
        let SurfaceState {
            canvas, freehand, ..
        } = &mut *state;
        freehand.pointer_down(canvas, x, y)
    }

    pub fn pointer_move(&self, x: f32, y: f32) -> bool {
        let mut state = self.state.lock();
        if self.options.disabled || state.mode != InputMode::Canvas {
            return false;
        }
        let SurfaceState {
            canvas, freehand, ..
        } = &mut *state;
        freehand.pointer_move(canvas, x, y)
    }

    /// Finish a stroke and publish the whole canvas
    pub fn pointer_up(&self) -> bool {
        let image = {
            let mut state = self.state.lock();
            if self.options.disabled || state.mode != InputMode::Canvas {
                return false;
            }
            let SurfaceState {
                canvas, freehand, ..
            } = &mut *state;
            if !freehand.pointer_up(canvas) {
                return false;
            }

            match state.canvas.to_data_url() {
                Ok(image) => {
                    state.value = Some(image.clone());
                    image
                }
                Err(e) => {
                    error!("Failed to serialize signature canvas: {}", e);
                    return false;
                }
            }
        };

        self.publish(CaptureOutput::Image(image));
        true
    }

    /// Wipe the drawing and publish an empty value.
    ///
    /// In hardware mode a capture still in progress is abandoned and its pad
    /// closed.
    pub async fn clear(&self) -> Result<(), SurfaceError> {
        if self.options.disabled {
            return Err(SurfaceError::Disabled);
        }

        let (abandon_capture, previous_status) = {
            let mut state = self.state.lock();
            let abandon_capture = state.mode == InputMode::Hardware && state.status.is_busy();
            if abandon_capture {
                state.generation += 1;
            }
            let previous_status = std::mem::replace(&mut state.status, CaptureStatus::Idle);
            state.canvas.clear();
            state.value = None;
            state.error_message = None;
            state.hint = None;
            (abandon_capture, previous_status)
        };

        debug!("Signature cleared");
        if previous_status != CaptureStatus::Idle {
            self.emit(SigpadEvent::CaptureStatusChanged {
                status: CaptureStatus::Idle,
            });
        }
        self.publish(CaptureOutput::Empty);

        if abandon_capture {
            self.transport.close_pad().await;
        }
        Ok(())
    }

    /// Follow the container width; canvas mode only
    pub fn resize(&self, container_width: u32) {
        let mut state = self.state.lock();
        state.container_width = container_width.max(1);
        if state.mode != InputMode::Canvas {
            return;
        }

        let width = state.container_width;
        state.canvas.resize(width, self.options.height);
        if let Some(value) = state.value.clone() {
            if let Err(e) = state.canvas.load_data_url(&value) {
                warn!("Failed to re-render signature after resize: {}", e);
            }
        }
        debug!("Signature canvas resized to {}x{}", width, self.options.height);
    }

    /// Detach from the pad; any capture in progress is abandoned
    pub async fn unmount(&self) {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.status = CaptureStatus::Idle;
            state.freehand.off();
        }
        self.transport.close_pad().await;
        debug!("Signature surface unmounted");
    }

    /// Run one hardware capture from connect to publish.
    ///
    /// Failures do not surface as `Err`: they put the surface into the error
    /// status and come back as [`CaptureOutcome::Failed`]. Calling this again
    /// from the error status is the retry.
    pub async fn start_hardware_capture(&self) -> Result<CaptureOutcome, SurfaceError> {
        let generation = {
            let mut state = self.state.lock();
            if self.options.disabled {
                return Err(SurfaceError::Disabled);
            }
            if state.mode != InputMode::Hardware {
                return Err(SurfaceError::NotHardwareMode);
            }
            if state.status.is_busy() {
                return Err(SurfaceError::Busy);
            }
            state.status = CaptureStatus::Connecting;
            state.error_message = None;
            state.hint = None;
            state.generation
        };
        self.emit(SigpadEvent::CaptureStatusChanged {
            status: CaptureStatus::Connecting,
        });

        match self.run_hardware_capture(generation).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(self.fail_capture(generation, e).await),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    async fn run_hardware_capture(&self, generation: u64) -> Result<CaptureOutcome, SigpadError> {
        let was_connected = self.transport.is_connected();
        self.transport.connect().await?;
        if !was_connected {
            self.emit(SigpadEvent::ConnectionChanged {
                connected: true,
                timestamp: SystemTime::now(),
            });
        }
        if !self.is_current(generation) {
            return Ok(CaptureOutcome::Superseded);
        }

        let pad = self.transport.open_pad(self.pad_index).await?;
        let info = pad.info().clone();
        let current = {
            let mut state = self.state.lock();
            let current = state.generation == generation;
            if current {
                state
                    .canvas
                    .resize(info.display_width, info.display_height);
                state.value = None;
                state.status = CaptureStatus::Waiting;
            }
            current
        };
        if !current {
            self.transport.close_pad_handle(pad).await;
            return Ok(CaptureOutcome::Superseded);
        }

        self.emit(SigpadEvent::PadOpened {
            pad_type: info.pad_type.clone(),
            serial: info.serial.clone(),
            timestamp: SystemTime::now(),
        });
        self.emit(SigpadEvent::CaptureStatusChanged {
            status: CaptureStatus::Waiting,
        });

        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let data = self
            .transport
            .start_signature(pad, self.request.clone(), move |progress| {
                let mut state = shared.lock();
                if state.generation != generation {
                    return;
                }
                match progress {
                    SignatureProgress::Point(point) => {
                        state.hint = None;
                        state.canvas.paint(point);
                    }
                    SignatureProgress::Retried(reason) => {
                        state.canvas.clear();
                        state.hint = match reason {
                            RetryReason::TooShort { .. } => Some(TOO_SHORT_HINT.to_string()),
                            RetryReason::PadButton => None,
                        };
                        drop(state);
                        if let Some(bus) = &events {
                            let _ = bus.publish(SigpadEvent::SignatureRetried { reason });
                        }
                    }
                }
            })
            .await?;

        let image = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Ok(CaptureOutcome::Superseded);
            }
            let image = state.canvas.to_data_url()?;
            state.value = Some(image.clone());
            state.status = CaptureStatus::Idle;
            state.hint = None;
            image
        };

        match data.duration_seconds {
            Some(seconds) => info!(
                "Hardware signature captured ({} points, {:.2}s)",
                data.counted_points, seconds
            ),
            None => info!("Hardware signature captured ({} points)", data.counted_points),
        }
        self.emit(SigpadEvent::CaptureStatusChanged {
            status: CaptureStatus::Idle,
        });
        self.publish(CaptureOutput::Image(image));
        Ok(CaptureOutcome::Published)
    }

    async fn fail_capture(&self, generation: u64, err: SigpadError) -> CaptureOutcome {
        let message = match &err {
            SigpadError::Transport(e) => e.user_message(),
            other => other.to_string(),
        };

        let current = {
            let mut state = self.state.lock();
            let current = state.generation == generation;
            if current {
                state.status = CaptureStatus::Error;
                state.error_message = Some(message.clone());
                state.hint = None;
            }
            current
        };
        if !current {
            debug!("Abandoned hardware capture ended: {}", err);
            return CaptureOutcome::Superseded;
        }

        error!("Hardware signature capture failed: {}", err);
        self.transport.close_pad().await;

        if let SigpadError::Transport(e) = &err {
            if e.is_connection_failure() {
                self.emit(SigpadEvent::ConnectionChanged {
                    connected: false,
                    timestamp: SystemTime::now(),
                });
            }
        }
        self.emit(SigpadEvent::SystemError {
            component: "signature_capture".to_string(),
            error: err.to_string(),
        });
        self.emit(SigpadEvent::CaptureStatusChanged {
            status: CaptureStatus::Error,
        });
        CaptureOutcome::Failed { message }
    }
}
