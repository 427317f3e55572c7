//! Hardware pad transport.
//!
//! [`TransportSession`] owns the WebSocket link to the pad server and the
//! single open pad. Pads are opened into a [`PadHandle`] which is consumed by
//! [`TransportSession::start_signature`].

mod connection;
mod pad;
mod session;
mod signature;

#[cfg(test)]
mod tests;

pub use pad::{PadHandle, PadInfo, ScaleFactors, StrokePoint};
pub use session::{ConnectionState, TransportSession};
pub use signature::{
    is_too_short, signature_duration, RetryReason, SignatureData, SignatureProgress,
    SignatureRequest,
};
