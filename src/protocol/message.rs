use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Commands understood by the pad server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum Command {
    SearchPads { pad_subset: String },
    OpenPad { index: u32 },
    ClosePad { index: u32 },
    StartSignature {
        field_name: String,
        custom_text: String,
    },
    RetrySignature,
    ConfirmSignature,
    CancelSignature,
    GetSignatureData,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SearchPads { .. } => "search_pads",
            Command::OpenPad { .. } => "open_pad",
            Command::ClosePad { .. } => "close_pad",
            Command::StartSignature { .. } => "start_signature",
            Command::RetrySignature => "retry_signature",
            Command::ConfirmSignature => "confirm_signature",
            Command::CancelSignature => "cancel_signature",
            Command::GetSignatureData => "get_signature_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Everything the server may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(Response),
    Event { event: PadEvent },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    /// Zero or positive on success, negative on failure
    pub return_code: i32,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Response {
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            return_code: 0,
            result,
            error: None,
        }
    }

    pub fn failure(id: u64, return_code: i32, context: &str, description: &str) -> Self {
        Self {
            id,
            return_code,
            result: serde_json::Value::Null,
            error: Some(ErrorInfo {
                context: Some(context.to_string()),
                description: description.to_string(),
            }),
        }
    }

    /// Turn the response into the typed result of `command`, mapping negative
    /// return codes to protocol errors.
    pub fn into_result<T: DeserializeOwned>(self, command: &str) -> Result<T, TransportError> {
        if self.return_code < 0 {
            let info = self.error.unwrap_or(ErrorInfo {
                context: None,
                description: String::new(),
            });
            return Err(TransportError::Protocol {
                context: info.context.unwrap_or_else(|| command.to_string()),
                code: self.return_code,
                description: info.description,
            });
        }

        serde_json::from_value(self.result).map_err(|e| TransportError::Codec {
            details: format!("{} result: {}", command, e),
        })
    }
}

/// Unsolicited server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum PadEvent {
    Log {
        message: String,
    },
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Raw pen sample in native sensor coordinates
    SignaturePoint {
        x: f64,
        y: f64,
        p: u32,
    },
    SignatureRetry,
    SignatureConfirm,
    SignatureCancel,
    Error {
        context: String,
        code: i32,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadDescriptor {
    pub pad_type: String,
    pub serial: String,
    #[serde(default)]
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPadsResult {
    #[serde(default)]
    pub pads: Vec<PadDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPadResult {
    pub pad_type: String,
    pub serial: String,
    #[serde(default)]
    pub firmware: String,
    pub display_width: u32,
    pub display_height: u32,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmResult {
    pub counted_points: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureDataResult {
    pub sign_data: String,
}
