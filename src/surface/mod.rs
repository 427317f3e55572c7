//! Signature capture surface.
//!
//! [`SignatureCapture`] renders ink from either freehand pointer input or a
//! hardware pad driven through a [`TransportSession`](crate::transport::TransportSession),
//! and hands the finished canvas to the consumer as a PNG data URL.

mod canvas;
mod capture;
mod encode;
mod freehand;
mod types;


pub use canvas::InkCanvas;
pub use capture::{ChangeCallback, SignatureCapture, TOO_SHORT_HINT};
pub use encode::{from_png_data_url, to_png_data_url};
pub use freehand::FreehandPad;
pub use types::{
    parse_ink_color, BorderStyle, CaptureOutcome, CaptureOutput, CaptureStatus, InputMode,
    SurfaceOptions,
};
