//! Per-endpoint call state machine
//!
//! A [`CallSession`] owns everything about the endpoint's single call: the
//! phase, the counterpart, the peer connection and the local media. Local
//! actions (`place_call`, `accept`, `end_or_reject`) and relayed events are
//! applied one at a time by the owner, normally the [`Phone`](crate::Phone)
//! actor.
//!
//! Local actions either complete or leave the session in the phase it was
//! in before, with any partially created peer closed and media stopped.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use dialtone_core::BusyPolicy;
use dialtone_proto::{
    AssignedId, CallAccept, CallAccepted, CallEnd, CallEnded, CallRequest, CandidateRelay,
    ClientEvent, EndpointId, IceCandidate, IncomingCall, Payload, RemoteCandidate, SdpType,
    ServerEvent, SessionDescription,
};

use crate::backend::{CandidateSink, LocalCandidate, LocalMedia, MediaBackend, PeerConnection};
use crate::error::{CallError, Result};
use crate::signal::SignalSender;
use crate::state::{CallPhase, CallState, Role};

pub struct CallSession<B: MediaBackend, S: SignalSender> {
    backend: Arc<B>,
    signal: S,
    busy_policy: BusyPolicy,

    local_id: Option<EndpointId>,
    phase: CallPhase,
    role: Role,
    counterpart: Option<EndpointId>,
    /// Offer of the ringing call, kept until accepted or torn down
    pending_offer: Option<Payload>,

    peer: Option<B::Peer>,
    media: Option<B::Media>,
    /// Bumped for every peer; candidates from older peers are discarded
    generation: u64,
    /// Remote candidates that arrived before the peer existed
    early_candidates: Vec<IceCandidate>,

    candidate_tx: mpsc::UnboundedSender<LocalCandidate>,
    state_tx: watch::Sender<CallState>,
}

impl<B: MediaBackend, S: SignalSender> CallSession<B, S> {
    /// Create an idle session
    ///
    /// Peers created by the session report local candidates on
    /// `candidate_tx`; feed them back through [`Self::handle_local_candidate`].
    pub fn new(
        backend: Arc<B>,
        signal: S,
        busy_policy: BusyPolicy,
        candidate_tx: mpsc::UnboundedSender<LocalCandidate>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CallState::default());

        Self {
            backend,
            signal,
            busy_policy,
            local_id: None,
            phase: CallPhase::Idle,
            role: Role::None,
            counterpart: None,
            pending_offer: None,
            peer: None,
            media: None,
            generation: 0,
            early_candidates: Vec::new(),
            candidate_tx,
            state_tx,
        }
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        CallState {
            local_id: self.local_id.clone(),
            phase: self.phase,
            role: self.role,
            counterpart: self.counterpart.clone(),
        }
    }

    /// Receive a snapshot after every transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub const fn phase(&self) -> CallPhase {
        self.phase
    }

    #[must_use]
    pub const fn local_id(&self) -> Option<&EndpointId> {
        self.local_id.as_ref()
    }

    /// Call `recipient`: negotiate a local offer and send it through the relay
    pub async fn place_call(&mut self, recipient: EndpointId) -> Result<()> {
        let local_id = self.local_id.clone().ok_or(CallError::NotRegistered)?;
        self.expect_phase("place a call", CallPhase::Idle)?;

        let (peer, media) = self.open_peer().await?;
        if let Err(e) = self.send_offer(&peer, &recipient, local_id).await {
            discard(peer, media).await;
            return Err(e);
        }

        self.peer = Some(peer);
        self.media = Some(media);
        self.counterpart = Some(recipient);
        self.role = Role::Caller;
        self.phase = CallPhase::OutgoingPending;
        info!(counterpart = ?self.counterpart, "Calling");
        self.publish();
        Ok(())
    }

    /// Answer the ringing call
    pub async fn accept(&mut self) -> Result<()> {
        let local_id = self.local_id.clone().ok_or(CallError::NotRegistered)?;
        self.expect_phase("accept", CallPhase::IncomingPending)?;

        let (Some(caller), Some(offer)) = (self.counterpart.clone(), self.pending_offer.as_ref())
        else {
            return Err(CallError::InvalidState {
                action: "accept",
                phase: self.phase,
            });
        };
        let offer = SessionDescription::from_payload(offer)?.or_type(SdpType::Offer);

        let (peer, media) = self.open_peer().await?;
        if let Err(e) = self.answer_offer(&peer, offer, local_id, &caller).await {
            discard(peer, media).await;
            return Err(e);
        }

        self.peer = Some(peer);
        self.media = Some(media);
        self.pending_offer = None;
        self.early_candidates.clear();
        self.phase = CallPhase::Active;
        info!(counterpart = %caller, "Call accepted");
        self.publish();
        Ok(())
    }

    /// Leave the current call
    ///
    /// Always returns to Idle and releases the peer and media. When
    /// `is_origin` is set and a call was pending or active, the counterpart
    /// is told with a call-end.
    pub async fn end_or_reject(&mut self, is_origin: bool) -> Result<()> {
        let was_engaged = self.phase.is_engaged();
        let previous = self.teardown().await;

        if !was_engaged || !is_origin {
            return Ok(());
        }
        match (self.local_id.clone(), previous) {
            (Some(origin), Some(target)) => self
                .signal
                .send(ClientEvent::CallEnd(CallEnd { origin, target })),
            _ => Ok(()),
        }
    }

    /// Apply one message from the relay
    pub async fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Id(AssignedId { id }) => {
                info!(endpoint_id = %id, "Registered with relay");
                self.local_id = Some(id);
                self.publish();
                Ok(())
            }
            ServerEvent::CallRequest(IncomingCall { offer, from }) => {
                self.on_call_request(offer, from).await
            }
            ServerEvent::CallAccept(CallAccepted { answer, recipient }) => {
                self.on_call_accept(answer, recipient).await
            }
            ServerEvent::CallEnd(CallEnded { origin }) => self.on_call_end(origin).await,
            ServerEvent::IceCandidate(RemoteCandidate { candidate }) => {
                self.on_remote_candidate(candidate).await
            }
        }
    }

    /// Forward a candidate gathered by the local peer
    pub fn handle_local_candidate(&mut self, local: LocalCandidate) -> Result<()> {
        if local.generation != self.generation || self.peer.is_none() {
            debug!(generation = local.generation, "Discarding candidate from a closed peer");
            return Ok(());
        }
        if !matches!(self.phase, CallPhase::OutgoingPending | CallPhase::Active) {
            return Ok(());
        }
        let Some(target) = self.counterpart.clone() else {
            return Ok(());
        };

        self.signal.send(ClientEvent::IceCandidate(CandidateRelay {
            target,
            candidate: local.candidate.to_payload()?,
        }))
    }

    async fn on_call_request(&mut self, offer: Payload, from: EndpointId) -> Result<()> {
        match self.phase {
            CallPhase::Idle => {
                self.ring(from, offer);
                Ok(())
            }
            CallPhase::IncomingPending if self.counterpart.as_ref() == Some(&from) => {
                debug!(counterpart = %from, "Refreshed offer of ringing call");
                self.pending_offer = Some(offer);
                Ok(())
            }
            phase => match self.busy_policy {
                BusyPolicy::Reject => {
                    info!(caller = %from, phase = %phase, "Busy, rejecting call");
                    match self.local_id.clone() {
                        Some(origin) => self.signal.send(ClientEvent::CallEnd(CallEnd {
                            origin,
                            target: from,
                        })),
                        None => Ok(()),
                    }
                }
                BusyPolicy::Overwrite => {
                    info!(caller = %from, phase = %phase, "Replacing current call");
                    let previous = self.teardown().await;
                    // The dropped counterpart must not stay engaged
                    let notified = match (self.local_id.clone(), previous) {
                        (Some(origin), Some(target)) => {
                            self.signal.send(ClientEvent::CallEnd(CallEnd { origin, target }))
                        }
                        _ => Ok(()),
                    };
                    self.ring(from, offer);
                    notified
                }
            },
        }
    }

    async fn on_call_accept(&mut self, answer: Payload, recipient: EndpointId) -> Result<()> {
        if !matches!(self.phase, CallPhase::OutgoingPending | CallPhase::Active)
            || self.counterpart.as_ref() != Some(&recipient)
        {
            warn!(
                recipient = %recipient,
                counterpart = ?self.counterpart,
                phase = %self.phase,
                "Ignoring unexpected call-accept"
            );
            return Ok(());
        }
        let Some(peer) = self.peer.as_ref() else {
            return Ok(());
        };

        if peer.has_remote_description().await {
            debug!(counterpart = %recipient, "Remote description already set, ignoring answer");
        } else {
            let answer = SessionDescription::from_payload(&answer)?.or_type(SdpType::Answer);
            peer.set_remote_description(answer).await?;
        }

        if self.phase != CallPhase::Active {
            self.phase = CallPhase::Active;
            info!(counterpart = %recipient, "Call connected");
            self.publish();
        }
        Ok(())
    }

    async fn on_call_end(&mut self, origin: EndpointId) -> Result<()> {
        if !self.phase.is_engaged() {
            debug!(origin = %origin, "Ignoring call-end while idle");
            return Ok(());
        }
        if self.counterpart.as_ref() != Some(&origin) {
            warn!(
                origin = %origin,
                counterpart = ?self.counterpart,
                "Ignoring call-end from an endpoint that is not the counterpart"
            );
            return Ok(());
        }

        info!(counterpart = %origin, "Call ended by counterpart");
        self.end_or_reject(false).await
    }

    async fn on_remote_candidate(&mut self, payload: Payload) -> Result<()> {
        let candidate = IceCandidate::from_payload(&payload)?;

        if let Some(peer) = self.peer.as_ref() {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                warn!(error = %e, "Failed to apply remote candidate");
            }
        } else if self.phase == CallPhase::IncomingPending {
            self.early_candidates.push(candidate);
        } else {
            debug!(phase = %self.phase, "Dropping remote candidate without a peer");
        }
        Ok(())
    }

    fn ring(&mut self, from: EndpointId, offer: Payload) {
        info!(caller = %from, "Incoming call");
        self.counterpart = Some(from);
        self.pending_offer = Some(offer);
        self.role = Role::Callee;
        self.phase = CallPhase::IncomingPending;
        self.publish();
    }

    /// Create a peer with attached local audio
    async fn open_peer(&mut self) -> Result<(B::Peer, B::Media)> {
        self.generation += 1;
        let sink = CandidateSink::new(self.generation, self.candidate_tx.clone());

        let peer = self.backend.create_peer(sink).await?;
        let media = match self.backend.acquire_audio().await {
            Ok(media) => media,
            Err(e) => {
                close_peer(&peer).await;
                return Err(e);
            }
        };
        if let Err(e) = self.backend.attach(&peer, &media).await {
            discard(peer, media).await;
            return Err(e);
        }

        Ok((peer, media))
    }

    async fn send_offer(
        &self,
        peer: &B::Peer,
        recipient: &EndpointId,
        from: EndpointId,
    ) -> Result<()> {
        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;

        self.signal.send(ClientEvent::CallRequest(CallRequest {
            offer: offer.to_payload()?,
            recipient: recipient.clone(),
            from,
        }))
    }

    async fn answer_offer(
        &self,
        peer: &B::Peer,
        offer: SessionDescription,
        local_id: EndpointId,
        caller: &EndpointId,
    ) -> Result<()> {
        peer.set_remote_description(offer).await?;

        for candidate in &self.early_candidates {
            if let Err(e) = peer.add_ice_candidate(candidate.clone()).await {
                warn!(error = %e, "Failed to apply buffered candidate");
            }
        }

        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;

        self.signal.send(ClientEvent::CallAccept(CallAccept {
            answer: answer.to_payload()?,
            recipient: local_id,
            from: caller.clone(),
        }))
    }

    /// Return to Idle and release resources, yielding the previous counterpart
    async fn teardown(&mut self) -> Option<EndpointId> {
        let previous = self.counterpart.take();
        let was = self.phase;

        self.phase = CallPhase::Idle;
        self.role = Role::None;
        self.pending_offer = None;
        self.early_candidates.clear();

        if let Some(peer) = self.peer.take() {
            close_peer(&peer).await;
        }
        if let Some(media) = self.media.take() {
            media.stop();
        }

        if was.is_engaged() {
            info!(counterpart = ?previous, phase = %was, "Call torn down");
        }
        self.publish();
        previous
    }

    fn expect_phase(&self, action: &'static str, expected: CallPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(CallError::InvalidState {
                action,
                phase: self.phase,
            })
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state());
    }
}

async fn close_peer<P: PeerConnection>(peer: &P) {
    if let Err(e) = peer.close().await {
        warn!(error = %e, "Failed to close peer connection");
    }
}

async fn discard<P: PeerConnection, M: LocalMedia>(peer: P, media: M) {
    media.stop();
    close_peer(&peer).await;
}
