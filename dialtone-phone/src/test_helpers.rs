//! Test helpers for dialtone-phone tests
//!
//! An in-memory media backend that records what the session asks of it and
//! can be told to fail.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dialtone_proto::{EndpointId, IceCandidate, SessionDescription};

use crate::backend::{CandidateSink, LocalMedia, MediaBackend, PeerConnection};
use crate::error::{CallError, Result};

/// Create a test endpoint ID
pub fn test_endpoint_id(id: &str) -> EndpointId {
    EndpointId::from(id)
}

/// Counters shared by a backend and everything it created
#[derive(Debug, Default)]
pub struct FakeStats {
    pub peers_created: AtomicUsize,
    pub peers_closed: AtomicUsize,
    pub media_acquired: AtomicUsize,
    pub media_stopped: AtomicUsize,
}

impl FakeStats {
    pub fn peers_created(&self) -> usize {
        self.peers_created.load(Ordering::SeqCst)
    }

    pub fn peers_closed(&self) -> usize {
        self.peers_closed.load(Ordering::SeqCst)
    }

    pub fn media_acquired(&self) -> usize {
        self.media_acquired.load(Ordering::SeqCst)
    }

    pub fn media_stopped(&self) -> usize {
        self.media_stopped.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    pub stats: Arc<FakeStats>,
    peers: Mutex<Vec<Arc<FakePeerState>>>,
    fail_media: AtomicBool,
    fail_remote: AtomicBool,
    offer_sdp: String,
    answer_sdp: String,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::with_sdp("x", "y")
    }
}

impl FakeBackend {
    /// Backend whose peers produce the given offer and answer SDP
    pub fn with_sdp(offer: &str, answer: &str) -> Self {
        Self {
            stats: Arc::new(FakeStats::default()),
            peers: Mutex::new(Vec::new()),
            fail_media: AtomicBool::new(false),
            fail_remote: AtomicBool::new(false),
            offer_sdp: offer.to_string(),
            answer_sdp: answer.to_string(),
        }
    }

    /// Make audio acquisition fail, like a denied microphone
    pub fn fail_media(&self, fail: bool) {
        self.fail_media.store(fail, Ordering::SeqCst);
    }

    /// Make peers created from now on reject remote descriptions
    pub fn fail_remote(&self, fail: bool) {
        self.fail_remote.store(fail, Ordering::SeqCst);
    }

    /// The most recently created peer
    pub fn last_peer(&self) -> Arc<FakePeerState> {
        self.peers
            .lock()
            .last()
            .cloned()
            .expect("no peer has been created")
    }
}

/// Everything a fake peer has been told
pub struct FakePeerState {
    pub sink: CandidateSink,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub remote_sets: AtomicUsize,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub closed: AtomicBool,
    fail_remote: bool,
    offer_sdp: String,
    answer_sdp: String,
}

impl FakePeerState {
    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn local(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakePeer {
    state: Arc<FakePeerState>,
    stats: Arc<FakeStats>,
}

pub struct FakeMedia {
    stats: Arc<FakeStats>,
}

#[async_trait]
impl MediaBackend for FakeBackend {
    type Peer = FakePeer;
    type Media = FakeMedia;

    async fn create_peer(&self, sink: CandidateSink) -> Result<FakePeer> {
        let state = Arc::new(FakePeerState {
            sink,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            remote_sets: AtomicUsize::new(0),
            candidates: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_remote: self.fail_remote.load(Ordering::SeqCst),
            offer_sdp: self.offer_sdp.clone(),
            answer_sdp: self.answer_sdp.clone(),
        });
        self.peers.lock().push(Arc::clone(&state));
        self.stats.peers_created.fetch_add(1, Ordering::SeqCst);

        Ok(FakePeer {
            state,
            stats: Arc::clone(&self.stats),
        })
    }

    async fn acquire_audio(&self) -> Result<FakeMedia> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(CallError::Media("permission denied".to_string()));
        }
        self.stats.media_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeMedia {
            stats: Arc::clone(&self.stats),
        })
    }

    async fn attach(&self, _peer: &FakePeer, _media: &FakeMedia) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(self.state.offer_sdp.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if self.state.remote.lock().is_none() {
            return Err(CallError::Negotiation("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer(self.state.answer_sdp.clone()))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        *self.state.local.lock() = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.state.fail_remote {
            return Err(CallError::Negotiation("remote description rejected".to_string()));
        }
        *self.state.remote.lock() = Some(description);
        self.state.remote_sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.state.remote.lock().is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.state.remote.lock().is_none() {
            return Err(CallError::Negotiation("remote description not set".to_string()));
        }
        self.state.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.stats.peers_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl LocalMedia for FakeMedia {
    fn stop(&self) {
        // Counts every call so tests can assert a single release
        self.stats.media_stopped.fetch_add(1, Ordering::SeqCst);
    }
}
