//! Observable call state

use std::fmt;

use dialtone_proto::EndpointId;

/// Where the local endpoint is in a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallPhase {
    #[default]
    Idle,
    /// Offer sent, waiting for the callee to accept
    OutgoingPending,
    /// Offer received, waiting for the local user to accept
    IncomingPending,
    Active,
}

impl CallPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OutgoingPending => "outgoing-pending",
            Self::IncomingPending => "incoming-pending",
            Self::Active => "active",
        }
    }

    /// Whether a call is pending or in progress
    #[must_use]
    pub const fn is_engaged(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    None,
    Caller,
    Callee,
}

/// Snapshot published on every transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallState {
    pub local_id: Option<EndpointId>,
    pub phase: CallPhase,
    pub role: Role,
    pub counterpart: Option<EndpointId>,
}
