//! Dialtone signaling relay
//!
//! Endpoints connect over WebSocket, receive a relay-assigned identifier and
//! exchange call-control messages addressed by those identifiers. The relay
//! forwards messages between live connections and keeps no call state.

mod error;
mod registry;
mod router;
mod server;
mod ws;

pub use error::{RelayError, Result};
pub use registry::{Delivery, EndpointInfo, EndpointRegistry};
pub use router::Relay;
pub use server::{create_router, shutdown_signal, AppState, RelayServer};
