//! JSON text-frame codec

use crate::error::Result;
use crate::messages::{ClientEvent, ServerEvent};

/// Encodes and decodes signaling envelopes carried in WebSocket text frames
pub struct JsonCodec;

impl JsonCodec {
    /// Encode `ClientEvent` to a text frame
    pub fn encode_client_event(event: &ClientEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }

    /// Decode `ClientEvent` from a text frame
    pub fn decode_client_event(text: &str) -> Result<ClientEvent> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode `ServerEvent` to a text frame
    pub fn encode_server_event(event: &ServerEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }

    /// Decode `ServerEvent` from a text frame
    pub fn decode_server_event(text: &str) -> Result<ServerEvent> {
        Ok(serde_json::from_str(text)?)
    }
}
