//! Media and negotiation capabilities used by a call session
//!
//! The session drives these traits and never touches a WebRTC stack
//! directly. [`WebRtcBackend`](crate::WebRtcBackend) is the production
//! implementation; tests use an in-memory fake.

use async_trait::async_trait;
use tokio::sync::mpsc;

use dialtone_proto::{IceCandidate, SessionDescription};

use crate::error::Result;

/// A locally gathered candidate, tagged with the peer that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCandidate {
    pub generation: u64,
    pub candidate: IceCandidate,
}

/// Where a peer reports its locally gathered candidates
#[derive(Debug, Clone)]
pub struct CandidateSink {
    generation: u64,
    tx: mpsc::UnboundedSender<LocalCandidate>,
}

impl CandidateSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<LocalCandidate>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a candidate; silently ignored once the session is gone
    pub fn emit(&self, candidate: IceCandidate) {
        let _ = self.tx.send(LocalCandidate {
            generation: self.generation,
            candidate,
        });
    }
}

/// Factory for peers and local media
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    type Peer: PeerConnection + 'static;
    type Media: LocalMedia + 'static;

    /// Create a peer connection that reports local candidates to `sink`
    async fn create_peer(&self, sink: CandidateSink) -> Result<Self::Peer>;

    /// Acquire the local audio source
    async fn acquire_audio(&self) -> Result<Self::Media>;

    /// Send `media` over `peer`
    async fn attach(&self, peer: &Self::Peer, media: &Self::Media) -> Result<()>;
}

/// One negotiated peer-to-peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn has_remote_description(&self) -> bool;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A running local capture
pub trait LocalMedia: Send + Sync {
    /// Stop capturing; calling twice is harmless
    fn stop(&self);
}
