//! Channel frame encoding and decoding.

use serde::Serialize;
use thiserror::Error;

use crate::model::ChannelMessage;

/// A frame that could not be turned into a `ChannelMessage`, or a payload that
/// could not be serialized.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unserializable payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Parse a text frame into a structured message.
pub fn decode(raw: &str) -> Result<ChannelMessage, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::Decode)
}

/// Serialize an outgoing payload into a text frame.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<String, CodecError> {
    serde_json::to_string(payload).map_err(CodecError::Encode)
}
