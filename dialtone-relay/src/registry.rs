//! Live endpoint registry
//!
//! Maps each relay-assigned identifier to the outbound queue of its socket.
//! An entry exists exactly as long as the connection is open, which makes
//! the identifier the only shared state the relay keeps per endpoint.

use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use dialtone_proto::{AssignedId, EndpointId, ServerEvent};

/// Outcome of handing a message to an endpoint's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the recipient's socket
    Delivered,
    /// No live connection has this identifier
    Unreachable,
    /// The recipient's queue was full or already closing
    Dropped,
}

struct Endpoint {
    sender: mpsc::Sender<ServerEvent>,
    connected_at: Instant,
    last_activity: Instant,
    message_count: u64,
}

/// Snapshot of one live endpoint
#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub message_count: u64,
}

impl EndpointInfo {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    #[must_use]
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Registry of live endpoints keyed by their identifier
#[derive(Clone)]
pub struct EndpointRegistry {
    endpoints: Arc<DashMap<EndpointId, Endpoint>>,

    /// Capacity of each endpoint's outbound queue
    buffer: usize,

    /// Metrics
    total_connections: Arc<AtomicU64>,
    total_messages: Arc<AtomicU64>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
            total_connections: Arc::new(AtomicU64::new(0)),
            total_messages: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new connection under a fresh identifier
    ///
    /// The identity message is the first item in the returned queue; it is
    /// enqueued before the identifier becomes reachable by anyone else.
    pub fn connect(&self) -> (EndpointId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);

        loop {
            let id = EndpointId::generate();
            if let Entry::Vacant(slot) = self.endpoints.entry(id.clone()) {
                // Fresh channel with capacity >= 1, cannot be full
                let _ = tx.try_send(ServerEvent::Id(AssignedId { id: id.clone() }));

                let now = Instant::now();
                slot.insert(Endpoint {
                    sender: tx,
                    connected_at: now,
                    last_activity: now,
                    message_count: 0,
                });
                self.total_connections.fetch_add(1, Ordering::Relaxed);

                info!(
                    endpoint_id = %id,
                    live_endpoints = self.endpoints.len(),
                    "Endpoint registered"
                );
                return (id, rx);
            }
            debug!(endpoint_id = %id, "Identifier collision, regenerating");
        }
    }

    /// Remove a connection; its identifier becomes unreachable
    pub fn disconnect(&self, id: &EndpointId) -> Option<EndpointInfo> {
        let (id, endpoint) = self.endpoints.remove(id)?;
        let info = EndpointInfo {
            id,
            connected_at: endpoint.connected_at,
            last_activity: endpoint.last_activity,
            message_count: endpoint.message_count,
        };

        info!(
            endpoint_id = %info.id,
            duration_secs = info.duration().as_secs(),
            messages = info.message_count,
            "Endpoint unregistered"
        );
        Some(info)
    }

    /// Queue a message for the endpoint named `to`
    pub fn deliver(&self, to: &EndpointId, event: ServerEvent) -> Delivery {
        let Some(endpoint) = self.endpoints.get(to) else {
            return Delivery::Unreachable;
        };

        match endpoint.sender.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    endpoint_id = %to,
                    event = event.kind(),
                    "Outbound queue full, dropping message"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dropped,
        }
    }

    /// Record inbound activity for a connection
    pub fn touch(&self, id: &EndpointId) {
        if let Some(mut endpoint) = self.endpoints.get_mut(id) {
            endpoint.last_activity = Instant::now();
            endpoint.message_count += 1;
        }
        self.total_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_live(&self, id: &EndpointId) -> bool {
        self.endpoints.contains_key(id)
    }

    #[must_use]
    pub fn info(&self, id: &EndpointId) -> Option<EndpointInfo> {
        self.endpoints.get(id).map(|endpoint| EndpointInfo {
            id: id.clone(),
            connected_at: endpoint.connected_at,
            last_activity: endpoint.last_activity,
            message_count: endpoint.message_count,
        })
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }
}
