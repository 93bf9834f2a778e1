//! Dialtone endpoint
//!
//! A phone registers with the relay, then places or answers a single audio
//! call at a time. The call state machine lives in [`CallSession`]; [`Phone`]
//! runs it on its own task and hands out a [`PhoneHandle`] for local actions.

mod backend;
mod client;
mod error;
mod phone;
mod rtc;
mod session;
mod signal;
mod state;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;

pub use backend::{CandidateSink, LocalCandidate, LocalMedia, MediaBackend, PeerConnection};
pub use client::SignalingClient;
pub use error::{CallError, Result};
pub use phone::{Phone, PhoneHandle};
pub use rtc::{RtcPeer, SilentAudio, WebRtcBackend};
pub use session::CallSession;
pub use signal::SignalSender;
pub use state::{CallPhase, CallState, Role};
