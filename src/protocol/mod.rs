//! Control protocol spoken with the local pad server.
//!
//! Frames are JSON text messages. The client sends [`Request`]s carrying a
//! numeric id; the server answers each with a [`Response`] echoing that id
//! and pushes unsolicited [`PadEvent`]s (pen points, pad buttons, logs,
//! errors) at any time.

mod codec;
mod message;

pub use codec::{decode_request, decode_server_message, encode_request, encode_server_message};
pub use message::{
    Command, ConfirmResult, ErrorInfo, OpenPadResult, PadDescriptor, PadEvent, Request,
    Response, SearchPadsResult, ServerMessage, SignatureDataResult,
};
