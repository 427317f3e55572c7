//! Local pad server simulator.
//!
//! Speaks the same protocol as the real pad server so the transport and the
//! capture surface can be exercised without hardware.

mod keyboard;
mod server;

pub use keyboard::{PadKey, SimulatorKeyboard};
pub use server::{PadSimulator, RunningSimulator, SimulatedPad, SimulatorHandle};
