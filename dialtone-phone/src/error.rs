use thiserror::Error;

use crate::state::CallPhase;
use dialtone_proto::ProtoError;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("No identifier assigned by the relay yet")]
    NotRegistered,

    #[error("Cannot {action} while {phase}")]
    InvalidState {
        action: &'static str,
        phase: CallPhase,
    },

    #[error("Media error: {0}")]
    Media(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Phone has stopped")]
    PhoneStopped,
}

pub type Result<T> = std::result::Result<T, CallError>;
