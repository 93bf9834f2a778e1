//! Dialtone wire protocol
//!
//! This crate defines the signaling messages exchanged between endpoints and
//! the relay, and the JSON text-frame codec used on the WebSocket transport.
//!
//! Every frame is a single envelope `{"event": <name>, "data": <payload>}`.
//! Offer, answer and candidate payloads are opaque to the relay; endpoints
//! decode them with [`SessionDescription`] and [`IceCandidate`].

mod codec;
mod error;
mod messages;
mod sdp;
mod types;

pub use codec::JsonCodec;
pub use error::{ProtoError, Result};
pub use messages::{
    AssignedId, CallAccept, CallAccepted, CallEnd, CallEnded, CallRequest, CandidateRelay,
    ClientEvent, IncomingCall, Payload, RemoteCandidate, ServerEvent,
};
pub use sdp::{IceCandidate, SdpType, SessionDescription};
pub use types::EndpointId;
