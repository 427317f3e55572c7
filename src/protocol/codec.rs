use super::message::{Request, ServerMessage};
use crate::error::TransportError;

pub fn encode_request(request: &Request) -> Result<String, TransportError> {
    serde_json::to_string(request).map_err(|e| TransportError::Codec {
        details: e.to_string(),
    })
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Codec {
        details: e.to_string(),
    })
}

/// Server side of the codec, used by the simulator
pub fn decode_request(text: &str) -> Result<Request, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Codec {
        details: e.to_string(),
    })
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|e| TransportError::Codec {
        details: e.to_string(),
    })
}
