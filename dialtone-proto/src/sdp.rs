//! Typed views over the opaque negotiation payloads
//!
//! The shapes match the browser `RTCSessionDescriptionInit` and
//! `RTCIceCandidateInit` dictionaries so that web endpoints interoperate.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ProtoError, Result};
use crate::messages::Payload;

/// SDP type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        }
    }
}

/// Session description (SDP)
///
/// `type` may be absent on the wire; the receiver knows from context whether
/// it holds an offer or an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sdp_type: Option<SdpType>,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: Some(SdpType::Offer),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: Some(SdpType::Answer),
            sdp: sdp.into(),
        }
    }

    /// Fill in the type if the sender omitted it
    #[must_use]
    pub fn or_type(mut self, sdp_type: SdpType) -> Self {
        self.sdp_type.get_or_insert(sdp_type);
        self
    }

    pub fn from_payload(payload: &Payload) -> Result<Self> {
        decode_payload("session description", payload)
    }

    pub fn to_payload(&self) -> Result<Payload> {
        Ok(serde_json::to_value(self)?)
    }
}

/// ICE candidate for WebRTC connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Full candidate string
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    pub fn from_payload(payload: &Payload) -> Result<Self> {
        decode_payload("candidate", payload)
    }

    pub fn to_payload(&self) -> Result<Payload> {
        Ok(serde_json::to_value(self)?)
    }
}

fn decode_payload<T: DeserializeOwned>(kind: &'static str, payload: &Payload) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(|e| ProtoError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sdp_type() {
        let offer = SdpType::Offer;
        let answer = SdpType::Answer;

        assert_eq!(offer, SdpType::Offer);
        assert_ne!(offer, answer);
        assert_eq!(offer.as_str(), "offer");
    }

    #[test]
    fn test_description_without_type() {
        let desc = SessionDescription::from_payload(&json!({ "sdp": "x" })).unwrap();
        assert_eq!(desc.sdp_type, None);
        assert_eq!(desc.sdp, "x");

        let desc = desc.or_type(SdpType::Offer);
        assert_eq!(desc.sdp_type, Some(SdpType::Offer));
    }

    #[test]
    fn test_or_type_keeps_explicit_type() {
        let desc = SessionDescription::answer("y").or_type(SdpType::Offer);
        assert_eq!(desc.sdp_type, Some(SdpType::Answer));
    }

    #[test]
    fn test_description_browser_shape() {
        let payload = SessionDescription::offer("v=0").to_payload().unwrap();
        assert_eq!(payload, json!({ "type": "offer", "sdp": "v=0" }));
    }

    #[test]
    fn test_candidate_browser_shape() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2130706431 192.168.1.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };

        let payload = candidate.to_payload().unwrap();
        assert_eq!(payload["sdpMid"], "0");
        assert_eq!(payload["sdpMLineIndex"], 0);
        assert!(payload.get("usernameFragment").is_none());

        assert_eq!(IceCandidate::from_payload(&payload).unwrap(), candidate);
    }

    #[test]
    fn test_malformed_payload() {
        let err = IceCandidate::from_payload(&json!({ "sdpMid": "0" })).unwrap_err();
        assert!(matches!(err, ProtoError::InvalidPayload { kind: "candidate", .. }));
    }
}
