//! Wire payloads for the broker request/reply protocol
//!
//! Frames are length-prefixed (`LengthDelimitedCodec` at the transport
//! layer); this module owns what goes inside a frame. Requests carry
//! `{"message": <text>}`; replies are opaque UTF-8 text interpreted by the
//! caller.

use crate::error::{BridgeError, BridgeResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Outbound request payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerRequest {
    pub message: String,
}

/// Encode the outgoing message as a request frame body.
pub fn encode_request(message: &str) -> BridgeResult<Bytes> {
    let request = BrokerRequest {
        message: message.to_string(),
    };
    let encoded = serde_json::to_vec(&request)
        .map_err(|e| BridgeError::invalid_input(format!("failed to encode request: {e}")))?;
    Ok(Bytes::from(encoded))
}

/// Decode a reply frame body into the opaque response text.
pub fn decode_reply(reply: &[u8]) -> BridgeResult<String> {
    let text = std::str::from_utf8(reply)
        .map_err(|_| BridgeError::transport("reply is not valid UTF-8"))?;
    Ok(text.to_string())
}
