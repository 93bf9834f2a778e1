//! WebSocket transport for endpoints
//!
//! Each socket is split: a writer task drains the endpoint's outbound queue
//! and sends heartbeat pings, while the reader loop decodes JSON text frames
//! and hands them to the [`Relay`](crate::Relay). The connection is dropped
//! when nothing arrives within the idle timeout.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use dialtone_proto::{EndpointId, JsonCodec, ServerEvent};

use crate::server::AppState;

/// Time the writer gets to flush and close after the reader stops
const WRITER_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Upgrade handler for `/ws`
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(state.settings.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (endpoint_id, outbound) = state.relay.connect();
    info!(endpoint_id = %endpoint_id, "WebSocket connection established");

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        endpoint_id.clone(),
        sink,
        outbound,
        state.settings.ping_interval(),
    ));

    let idle_timeout = state.settings.idle_timeout();
    let mut shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            frame = tokio::time::timeout(idle_timeout, stream.next()) => {
                match frame {
                    Err(_) => {
                        warn!(endpoint_id = %endpoint_id, "No traffic within idle timeout, closing");
                        break;
                    }
                    Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Err(e))) => {
                        debug!(endpoint_id = %endpoint_id, error = %e, "WebSocket read failed");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match JsonCodec::decode_client_event(text.as_str()) {
                            Ok(event) => {
                                state.relay.handle(&endpoint_id, event);
                            }
                            Err(e) => {
                                warn!(endpoint_id = %endpoint_id, error = %e, "Dropping undecodable frame");
                            }
                        }
                    }
                    Ok(Some(Ok(_))) => {
                        // Pong, ping and binary frames only count as liveness
                        state.relay.registry().touch(&endpoint_id);
                    }
                }
            }
            Ok(()) = shutdown.changed() => {
                debug!(endpoint_id = %endpoint_id, "Server shutting down, closing connection");
                break;
            }
        }
    }

    // Dropping the registry entry closes the outbound queue, which ends the writer
    state.relay.disconnect(&endpoint_id);
    if tokio::time::timeout(WRITER_CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(endpoint_id = %endpoint_id, "WebSocket connection closed");
}

async fn write_loop(
    endpoint_id: EndpointId,
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    ping_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(ping_interval);
    // First tick completes immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let text = match JsonCodec::encode_server_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(endpoint_id = %endpoint_id, error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(endpoint_id = %endpoint_id, error = %e, "WebSocket send failed");
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = sink.close().await;
}
