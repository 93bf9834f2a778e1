//! WebSocket connection to the relay
//!
//! Bridges the socket to a pair of channels: events queued on the outbound
//! sender are written as JSON text frames, and decoded frames from the relay
//! come out of the inbound receiver. The inbound receiver closes when the
//! socket does.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dialtone_proto::{ClientEvent, JsonCodec, ServerEvent};

use crate::error::{CallError, Result};

/// Channels bound to one relay connection
pub struct SignalingClient {
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
    cancel: CancellationToken,
}

impl SignalingClient {
    /// Open a connection to the relay at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| CallError::Signaling(format!("failed to connect to {url}: {e}")))?;
        info!(url = %url, "Connected to relay");

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<ServerEvent>();
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => break,
                    event = outbound_rx.recv() => {
                        let Some(event) = event else { break };
                        let text = match JsonCodec::encode_client_event(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(event = event.kind(), error = %e, "Failed to encode event");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            debug!(error = %e, "Relay send failed");
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
        });

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = reader_cancel.cancelled() => break,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => match JsonCodec::decode_server_event(text.as_str()) {
                        Ok(event) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping undecodable frame from relay"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Relay read failed");
                        break;
                    }
                }
            }
            info!("Disconnected from relay");
            // Take the writer down with us
            reader_cancel.cancel();
        });

        Ok(Self {
            outbound,
            inbound,
            cancel,
        })
    }

    /// Token that closes the connection when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Split into the outbound sender and inbound receiver
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}
