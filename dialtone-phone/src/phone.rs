//! Phone actor
//!
//! One task owns the [`CallSession`] and applies, in arrival order, local
//! commands, relay events and locally gathered candidates. A local action
//! runs to completion before anything else is looked at, so actions never
//! overlap.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use dialtone_core::BusyPolicy;
use dialtone_proto::{EndpointId, ServerEvent};

use crate::backend::{LocalCandidate, MediaBackend};
use crate::error::{CallError, Result};
use crate::session::CallSession;
use crate::signal::SignalSender;
use crate::state::CallState;

const COMMAND_BUFFER: usize = 32;

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    PlaceCall { recipient: EndpointId, reply: Reply },
    Accept { reply: Reply },
    End { reply: Reply },
}

pub struct Phone;

impl Phone {
    /// Start a phone fed by `events` from the relay and sending through `signal`
    ///
    /// The phone stops when `events` closes or every handle is dropped; an
    /// ongoing call is ended on the way out.
    pub fn spawn<B, S>(
        backend: Arc<B>,
        signal: S,
        events: mpsc::UnboundedReceiver<ServerEvent>,
        busy_policy: BusyPolicy,
    ) -> PhoneHandle
    where
        B: MediaBackend,
        S: SignalSender,
    {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        let session = CallSession::new(backend, signal, busy_policy, candidate_tx);
        let state = session.subscribe();
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        tokio::spawn(run(session, command_rx, events, candidate_rx));

        PhoneHandle { commands, state }
    }
}

/// Cloneable front door to a running phone
#[derive(Clone)]
pub struct PhoneHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<CallState>,
}

impl PhoneHandle {
    pub async fn place_call(&self, recipient: impl Into<EndpointId>) -> Result<()> {
        let recipient = recipient.into();
        self.request(|reply| Command::PlaceCall { recipient, reply })
            .await
    }

    pub async fn accept(&self) -> Result<()> {
        self.request(|reply| Command::Accept { reply }).await
    }

    /// Decline, cancel or hang up, whichever applies
    pub async fn end(&self) -> Result<()> {
        self.request(|reply| Command::End { reply }).await
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&CallState) -> bool) -> Result<CallState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(predicate)
            .await
            .map_err(|_| CallError::PhoneStopped)?;
        Ok((*matched).clone())
    }

    /// Resolves once the phone task has exited
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| CallError::PhoneStopped)?;
        response.await.map_err(|_| CallError::PhoneStopped)?
    }
}

async fn run<B, S>(
    mut session: CallSession<B, S>,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut candidates: mpsc::UnboundedReceiver<LocalCandidate>,
) where
    B: MediaBackend,
    S: SignalSender,
{
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All phone handles dropped");
                    break;
                };
                execute(&mut session, command).await;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    info!("Relay connection closed");
                    break;
                };
                let kind = event.kind();
                if let Err(e) = session.handle_event(event).await {
                    warn!(event = kind, error = %e, "Failed to handle relay event");
                }
            }
            Some(candidate) = candidates.recv() => {
                if let Err(e) = session.handle_local_candidate(candidate) {
                    warn!(error = %e, "Failed to send local candidate");
                }
            }
        }
    }

    if let Err(e) = session.end_or_reject(true).await {
        debug!(error = %e, "Could not notify counterpart while stopping");
    }
}

async fn execute<B, S>(session: &mut CallSession<B, S>, command: Command)
where
    B: MediaBackend,
    S: SignalSender,
{
    let (result, reply) = match command {
        Command::PlaceCall { recipient, reply } => (session.place_call(recipient).await, reply),
        Command::Accept { reply } => (session.accept().await, reply),
        Command::End { reply } => (session.end_or_reject(true).await, reply),
    };
    if let Err(e) = &result {
        warn!(error = %e, phase = %session.phase(), "Call action failed");
    }
    let _ = reply.send(result);
}
