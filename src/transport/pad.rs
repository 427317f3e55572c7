use crate::protocol::OpenPadResult;
use serde::{Deserialize, Serialize};

/// One pen sample. Pressure `0` marks a pen lift: the point starts a new sub-stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    pub pressure: u32,
}

impl StrokePoint {
    pub fn new(x: f64, y: f64, pressure: u32) -> Self {
        Self { x, y, pressure }
    }

    pub fn is_pen_lift(&self) -> bool {
        self.pressure == 0
    }
}

/// Maps native sensor coordinates to display coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// `display / native` per axis; `None` when a native resolution is zero
    pub fn from_resolution(
        display_width: u32,
        display_height: u32,
        x_resolution: u32,
        y_resolution: u32,
    ) -> Option<Self> {
        if x_resolution == 0 || y_resolution == 0 {
            return None;
        }

        Some(Self {
            x: display_width as f64 / x_resolution as f64,
            y: display_height as f64 / y_resolution as f64,
        })
    }

    pub fn apply(&self, x: f64, y: f64, pressure: u32) -> StrokePoint {
        StrokePoint::new(x * self.x, y * self.y, pressure)
    }
}

/// Identity and display geometry of an opened pad
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadInfo {
    pub pad_type: String,
    pub serial: String,
    pub firmware: String,
    pub display_width: u32,
    pub display_height: u32,
}

impl PadInfo {
    pub fn description(&self) -> String {
        format!(
            "{} #{} (firmware {}, display {}x{})",
            self.pad_type, self.serial, self.firmware, self.display_width, self.display_height
        )
    }
}

/// Proof that a pad is open.
///
/// Only [`TransportSession::open_pad`](super::TransportSession::open_pad) creates
/// handles, and at most one is valid at a time. Starting a signature consumes
/// the handle because every terminal outcome closes the pad.
#[derive(Debug)]
pub struct PadHandle {
    pub(crate) id: u64,
    index: u32,
    info: PadInfo,
    scale: ScaleFactors,
    sample_rate: u32,
}

impl PadHandle {
    pub(crate) fn new(id: u64, index: u32, opened: OpenPadResult, scale: ScaleFactors) -> Self {
        Self {
            id,
            index,
            info: PadInfo {
                pad_type: opened.pad_type,
                serial: opened.serial,
                firmware: opened.firmware,
                display_width: opened.display_width,
                display_height: opened.display_height,
            },
            scale,
            sample_rate: opened.sample_rate,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn info(&self) -> &PadInfo {
        &self.info
    }

    pub fn scale(&self) -> ScaleFactors {
        self.scale
    }

    /// Native sampling rate in points per second
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factors() {
        let scale = ScaleFactors::from_resolution(1000, 400, 2000, 800).unwrap();
        assert_eq!(scale.x, 0.5);
        assert_eq!(scale.y, 0.5);
        assert_eq!(scale.apply(1000.0, 400.0, 1), StrokePoint::new(500.0, 200.0, 1));
    }

    #[test]
    fn test_zero_native_resolution() {
        assert!(ScaleFactors::from_resolution(320, 160, 0, 1000).is_none());
        assert!(ScaleFactors::from_resolution(320, 160, 1000, 0).is_none());
    }

    #[test]
    fn test_pen_lift() {
        assert!(StrokePoint::new(1.0, 2.0, 0).is_pen_lift());
        assert!(!StrokePoint::new(1.0, 2.0, 300).is_pen_lift());
    }
}
