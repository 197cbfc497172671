//! Domain error types.

use thiserror::Error;

use crate::status::{SagaStatus, SagaTrigger};

/// Errors raised by the saga state model.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The trigger is not a valid outgoing edge from the current status.
    #[error("Invalid transition: {trigger} is not allowed from {from}")]
    InvalidTransition {
        from: SagaStatus,
        trigger: SagaTrigger,
    },

    /// The order facts supplied to start a saga are malformed.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// A persisted status string did not match any known status.
    #[error("Unknown saga status: {0}")]
    UnknownStatus(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
