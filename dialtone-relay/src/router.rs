//! Message routing between endpoints
//!
//! The relay never interprets offers, answers or candidates. It reads the
//! addressing fields of each inbound message, re-shapes the message for the
//! recipient and queues it. Messages for identifiers with no live connection
//! are dropped without notifying the sender.

use tokio::sync::mpsc;
use tracing::{debug, info};

use dialtone_core::RelayConfig;
use dialtone_proto::{
    CallAccept, CallAccepted, CallEnd, CallEnded, CallRequest, CandidateRelay, ClientEvent,
    EndpointId, IncomingCall, Payload, RemoteCandidate, ServerEvent,
};

use crate::registry::{Delivery, EndpointRegistry};

/// Stateless forwarding on top of the endpoint registry
#[derive(Clone)]
pub struct Relay {
    registry: EndpointRegistry,
    strict_sender: bool,
}

impl Relay {
    #[must_use]
    pub const fn new(registry: EndpointRegistry, config: &RelayConfig) -> Self {
        Self {
            registry,
            strict_sender: config.strict_sender,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Assign an identifier to a new connection
    pub fn connect(&self) -> (EndpointId, mpsc::Receiver<ServerEvent>) {
        self.registry.connect()
    }

    pub fn disconnect(&self, id: &EndpointId) {
        self.registry.disconnect(id);
    }

    /// Dispatch one decoded message from connection `sender`
    ///
    /// Returns the delivery outcome for forwarded messages and `None` for
    /// diagnostic messages, which are only logged.
    pub fn handle(&self, sender: &EndpointId, event: ClientEvent) -> Option<Delivery> {
        self.registry.touch(sender);

        match event {
            ClientEvent::CallRequest(CallRequest {
                offer,
                recipient,
                from,
            }) => {
                let from = self.stamp(sender, from, "from");
                Some(self.relay_call_request(offer, &recipient, from))
            }
            ClientEvent::CallAccept(CallAccept {
                answer,
                recipient,
                from,
            }) => {
                let recipient = self.stamp(sender, recipient, "recipient");
                Some(self.relay_call_accept(answer, recipient, &from))
            }
            ClientEvent::CallEnd(CallEnd { origin, target }) => {
                let origin = self.stamp(sender, origin, "origin");
                Some(self.relay_call_end(origin, &target))
            }
            ClientEvent::IceCandidate(CandidateRelay { target, candidate }) => {
                Some(self.relay_ice_candidate(candidate, &target))
            }
            ClientEvent::Msg(payload) => {
                info!(
                    target: "dialtone_relay::diagnostic",
                    endpoint_id = %sender,
                    payload = %payload,
                    "Endpoint diagnostic"
                );
                None
            }
        }
    }

    /// Forward an offer to `recipient`, naming the caller
    pub fn relay_call_request(
        &self,
        offer: Payload,
        recipient: &EndpointId,
        from: EndpointId,
    ) -> Delivery {
        self.forward(
            recipient,
            ServerEvent::CallRequest(IncomingCall { offer, from }),
        )
    }

    /// Forward an answer back to the caller named by `from`
    pub fn relay_call_accept(
        &self,
        answer: Payload,
        recipient: EndpointId,
        from: &EndpointId,
    ) -> Delivery {
        self.forward(
            from,
            ServerEvent::CallAccept(CallAccepted { answer, recipient }),
        )
    }

    pub fn relay_call_end(&self, origin: EndpointId, target: &EndpointId) -> Delivery {
        self.forward(target, ServerEvent::CallEnd(CallEnded { origin }))
    }

    pub fn relay_ice_candidate(&self, candidate: Payload, target: &EndpointId) -> Delivery {
        self.forward(
            target,
            ServerEvent::IceCandidate(RemoteCandidate { candidate }),
        )
    }

    fn forward(&self, to: &EndpointId, event: ServerEvent) -> Delivery {
        let kind = event.kind();
        let delivery = self.registry.deliver(to, event);
        match delivery {
            Delivery::Delivered => debug!(to = %to, event = kind, "Relayed"),
            Delivery::Unreachable => debug!(to = %to, event = kind, "Recipient not connected, dropping"),
            Delivery::Dropped => {}
        }
        delivery
    }

    /// Replace a self-reported identity with the connection's own when strict
    fn stamp(&self, sender: &EndpointId, claimed: EndpointId, field: &'static str) -> EndpointId {
        if self.strict_sender && claimed != *sender {
            debug!(
                endpoint_id = %sender,
                claimed = %claimed,
                field,
                "Overriding self-reported sender"
            );
            sender.clone()
        } else {
            claimed
        }
    }
}
