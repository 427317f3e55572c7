use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigpadError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Pad transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Canvas error: {0}")]
    Canvas(#[from] CanvasError),

    #[error("Signature surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Failures reported by the pad transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to connect to pad server at {url}: {details}")]
    Connection { url: String, details: String },

    #[error("Not connected to the pad server")]
    NotConnected,

    #[error("No signature pad found")]
    NoPadFound,

    #[error("A signature pad is already open")]
    PadAlreadyOpen,

    #[error("Signature pad is not open")]
    PadNotOpen,

    #[error("Pad server error in {context} (code {code}): {description}")]
    Protocol {
        context: String,
        code: i32,
        description: String,
    },

    #[error("Signature cancelled")]
    Cancelled,

    #[error("Pad server disconnected")]
    Disconnected,

    #[error("Pad server did not answer {command} in time")]
    Timeout { command: String },

    #[error("Malformed pad server message: {details}")]
    Codec { details: String },
}

impl TransportError {
    /// True for failures of the control channel itself rather than of a pad command
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. }
                | TransportError::NotConnected
                | TransportError::Disconnected
        )
    }

    /// Message suitable for showing next to the signature field
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Connection { .. } | TransportError::NotConnected => {
                "Could not reach the signature pad service. Make sure it is running and try again."
                    .to_string()
            }
            TransportError::NoPadFound => "Please connect a signature pad via USB.".to_string(),
            TransportError::PadAlreadyOpen => "The signature pad is already in use.".to_string(),
            TransportError::PadNotOpen => "The signature pad was closed.".to_string(),
            TransportError::Protocol {
                context,
                code,
                description,
            } => format!("Signature pad error ({} {}): {}", context, code, description),
            TransportError::Cancelled => "Signature was cancelled on the pad.".to_string(),
            TransportError::Disconnected => {
                "Connection to the signature pad service was lost.".to_string()
            }
            TransportError::Timeout { command } => {
                format!("The signature pad did not respond ({}).", command)
            }
            TransportError::Codec { details } => {
                format!("Unexpected answer from the signature pad service: {}", details)
            }
        }
    }
}

/// Failures while rendering or serializing the ink canvas
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    #[error("Failed to encode canvas: {details}")]
    Encode { details: String },

    #[error("Failed to decode image: {details}")]
    Decode { details: String },

    #[error("Not a PNG data URL")]
    InvalidDataUrl,

    #[error("Invalid ink color '{0}'")]
    InvalidColor(String),
}

/// Requests the capture surface refuses in its current state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Signature input is disabled")]
    Disabled,

    #[error("Hardware pad input is not offered")]
    HardwareUnavailable,

    #[error("Hardware capture only runs in hardware mode")]
    NotHardwareMode,

    #[error("A hardware capture is already in progress")]
    Busy,
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SigpadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_class() {
        assert!(TransportError::NotConnected.is_connection_failure());
        assert!(TransportError::Connection {
            url: "ws://127.0.0.1:1".to_string(),
            details: "refused".to_string(),
        }
        .is_connection_failure());
        assert!(!TransportError::NoPadFound.is_connection_failure());
        assert!(!TransportError::Cancelled.is_connection_failure());
    }

    #[test]
    fn test_user_messages() {
        assert!(TransportError::NoPadFound.user_message().contains("USB"));

        let err = TransportError::Protocol {
            context: "open_pad".to_string(),
            code: -22,
            description: "pad busy".to_string(),
        };
        assert!(err.user_message().contains("pad busy"));
        assert!(err.to_string().contains("-22"));
    }

    #[test]
    fn test_wraps_into_crate_error() {
        let err: SigpadError = TransportError::Cancelled.into();
        assert!(matches!(err, SigpadError::Transport(TransportError::Cancelled)));
    }
}
