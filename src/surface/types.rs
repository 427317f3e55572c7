use crate::config::SurfaceConfig;
use crate::error::CanvasError;
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Which source drives the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    /// Freehand pointer or touch drawing
    Canvas,
    /// Ink streamed from the hardware pad
    Hardware,
}

/// Progress of a hardware capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureStatus {
    Idle,
    Connecting,
    Waiting,
    Error,
}

impl CaptureStatus {
    /// Connecting or waiting for the signer; a new capture must not start
    pub fn is_busy(&self) -> bool {
        matches!(self, CaptureStatus::Connecting | CaptureStatus::Waiting)
    }
}

/// Value handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutput {
    /// PNG data URL of the whole canvas
    Image(String),
    Empty,
}

impl CaptureOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, CaptureOutput::Empty)
    }

    pub fn as_data_url(&self) -> Option<&str> {
        match self {
            CaptureOutput::Image(url) => Some(url),
            CaptureOutput::Empty => None,
        }
    }
}

/// Border drawn around the signature field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderStyle {
    Normal,
    Error,
}

/// How a hardware capture ended
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The canvas was published to the consumer
    Published,
    /// The capture failed; the message is also kept on the surface
    Failed { message: String },
    /// The mode changed or the surface was cleared while capturing
    Superseded,
}

#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub height: u32,
    pub width: u32,
    pub ink_color: String,
    pub pen_width: f32,
    /// Suppresses input, clear and the mode toggle
    pub disabled: bool,
    /// Visual only: draw the error border
    pub error: bool,
    pub label: Option<String>,
    pub hardware_toggle: bool,
    /// Data URL shown in canvas mode before anything is drawn
    pub initial_value: Option<String>,
}

impl SurfaceOptions {
    pub fn from_config(config: &SurfaceConfig) -> Self {
        Self {
            height: config.height,
            width: config.width,
            ink_color: config.ink_color.clone(),
            pen_width: config.pen_width,
            hardware_toggle: config.hardware_toggle,
            ..Self::default()
        }
    }
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        let config = SurfaceConfig::default();
        Self {
            height: config.height,
            width: config.width,
            ink_color: config.ink_color,
            pen_width: config.pen_width,
            disabled: false,
            error: false,
            label: None,
            hardware_toggle: config.hardware_toggle,
            initial_value: None,
        }
    }
}

/// Parse `#rrggbb` or `#rrggbbaa`
pub fn parse_ink_color(value: &str) -> Result<Rgba<u8>, CanvasError> {
    let invalid = || CanvasError::InvalidColor(value.to_string());
    let hex = value.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ink_color() {
        assert_eq!(parse_ink_color("#000000").unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_ink_color("#1a237e").unwrap(), Rgba([0x1a, 0x23, 0x7e, 255]));
        assert_eq!(parse_ink_color("#ff000080").unwrap(), Rgba([255, 0, 0, 128]));
        assert!(parse_ink_color("black").is_err());
        assert!(parse_ink_color("#12345").is_err());
        assert!(parse_ink_color("#gg0000").is_err());
    }

    #[test]
    fn test_default_options() {
        let options = SurfaceOptions::default();
        assert_eq!(options.height, 160);
        assert_eq!(options.ink_color, "#000000");
        assert!(options.hardware_toggle);
        assert!(!options.disabled);
    }

    #[test]
    fn test_status_busy() {
        assert!(CaptureStatus::Connecting.is_busy());
        assert!(CaptureStatus::Waiting.is_busy());
        assert!(!CaptureStatus::Idle.is_busy());
        assert!(!CaptureStatus::Error.is_busy());
    }
}
