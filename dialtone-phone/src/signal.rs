use tokio::sync::mpsc;

use dialtone_proto::ClientEvent;

use crate::error::{CallError, Result};

/// Outbound path to the relay
///
/// Sending only queues the message; delivery happens on the transport task.
pub trait SignalSender: Send + Sync + 'static {
    fn send(&self, event: ClientEvent) -> Result<()>;
}

impl SignalSender for mpsc::UnboundedSender<ClientEvent> {
    fn send(&self, event: ClientEvent) -> Result<()> {
        mpsc::UnboundedSender::send(self, event)
            .map_err(|_| CallError::Signaling("relay connection closed".to_string()))
    }
}
