pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod simulator;
pub mod surface;
pub mod transport;

pub use config::SigpadConfig;
pub use error::{CanvasError, Result, SigpadError, SurfaceError, TransportError};
pub use events::{EventBus, EventFilter, EventReceiver, SigpadEvent};
pub use simulator::{PadSimulator, RunningSimulator, SimulatorHandle, SimulatorKeyboard};
pub use surface::{
    BorderStyle, CaptureOutcome, CaptureOutput, CaptureStatus, InputMode, SignatureCapture,
    SurfaceOptions,
};
pub use transport::{
    ConnectionState, PadHandle, PadInfo, RetryReason, SignatureData, SignatureProgress,
    SignatureRequest, StrokePoint, TransportSession,
};
