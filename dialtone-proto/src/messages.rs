//! Signaling messages
//!
//! Field names are part of the wire contract and must not change. Note that
//! a call-accept travels back to the caller addressed by its `from` field,
//! while `recipient` names the callee that accepted.

use serde::{Deserialize, Serialize};

use crate::types::EndpointId;

/// Opaque JSON payload carried through the relay untouched
pub type Payload = serde_json::Value;

/// Messages sent by an endpoint to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Start a call to `recipient`
    CallRequest(CallRequest),
    /// Accept a call; routed to the original caller named by `from`
    CallAccept(CallAccept),
    /// Reject, cancel or hang up
    CallEnd(CallEnd),
    /// Trickle a connectivity candidate to `target`
    IceCandidate(CandidateRelay),
    /// Diagnostic message, logged by the relay and never forwarded
    Msg(Payload),
}

impl ClientEvent {
    /// Wire name of the event
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CallRequest(_) => "call-request",
            Self::CallAccept(_) => "call-accept",
            Self::CallEnd(_) => "call-end",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Msg(_) => "msg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub offer: Payload,
    pub recipient: EndpointId,
    pub from: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAccept {
    pub answer: Payload,
    /// The accepting callee
    pub recipient: EndpointId,
    /// The original caller, which receives this message
    pub from: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnd {
    pub origin: EndpointId,
    pub target: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelay {
    pub target: EndpointId,
    pub candidate: Payload,
}

/// Messages delivered by the relay to an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Identifier assigned to this connection, always the first message
    Id(AssignedId),
    CallRequest(IncomingCall),
    CallAccept(CallAccepted),
    CallEnd(CallEnded),
    IceCandidate(RemoteCandidate),
}

impl ServerEvent {
    /// Wire name of the event
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::CallRequest(_) => "call-request",
            Self::CallAccept(_) => "call-accept",
            Self::CallEnd(_) => "call-end",
            Self::IceCandidate(_) => "ice-candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedId {
    pub id: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub offer: Payload,
    pub from: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAccepted {
    pub answer: Payload,
    pub recipient: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnded {
    pub origin: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCandidate {
    pub candidate: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_request_wire_shape() {
        let event = ClientEvent::CallRequest(CallRequest {
            offer: json!({ "sdp": "x" }),
            recipient: EndpointId::from("b1"),
            from: EndpointId::from("a1"),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "call-request",
                "data": { "offer": { "sdp": "x" }, "recipient": "b1", "from": "a1" }
            })
        );
    }

    #[test]
    fn test_call_accepted_keeps_recipient_field() {
        let event = ServerEvent::CallAccept(CallAccepted {
            answer: json!({ "sdp": "y" }),
            recipient: EndpointId::from("b1"),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "call-accept");
        assert_eq!(value["data"]["recipient"], "b1");
        assert!(value["data"].get("from").is_none());
    }

    #[test]
    fn test_parse_ice_candidate_and_msg() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "ice-candidate",
            "data": { "target": "b1", "candidate": { "candidate": "candidate:1" } }
        }))
        .unwrap();
        assert_eq!(event.kind(), "ice-candidate");

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "msg",
            "data": ["anything", 1, true]
        }))
        .unwrap();
        assert!(matches!(event, ClientEvent::Msg(_)));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({ "event": "call-transfer", "data": {} }));
        assert!(result.is_err());
    }

    #[test]
    fn test_identity_event_name() {
        let event = ServerEvent::Id(AssignedId { id: EndpointId::from("a1") });
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value, json!({ "event": "id", "data": { "id": "a1" } }));
        assert_eq!(event.kind(), "id");
    }
}
