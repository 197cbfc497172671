//! Saga error types.

use std::time::Duration;

use common::SagaId;
use domain::{DomainError, SagaStatus, SagaTrigger};
use state_store::StoreError;
use thiserror::Error;

use crate::order_fulfillment::SagaAction;

/// Failure to hand an action to the compute backend.
///
/// Says nothing about the business outcome of the action, which is reported
/// later through an inbound event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The backend could not be reached.
    #[error("Compute backend unreachable: {0}")]
    Unreachable(String),

    /// The dispatch did not complete within its timeout.
    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered but refused the invocation.
    #[error("Dispatch rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl DispatchError {
    /// Returns true if retrying the dispatch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Unreachable(_) | DispatchError::Timeout(_) => true,
            DispatchError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Failure to publish a saga event onto the topic.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The topic could not be reached.
    #[error("Event topic unavailable: {0}")]
    Unavailable(String),

    /// The topic answered but refused the message.
    #[error("Publish rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// An inbound event named a saga the store does not hold.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// A saga with this id has already been started.
    #[error("Saga already started: {0}")]
    AlreadyStarted(SagaId),

    /// The event is not a valid outgoing transition from the current status.
    #[error("Invalid transition for saga {saga_id}: {trigger} is not allowed from {from}")]
    InvalidTransition {
        saga_id: SagaId,
        from: SagaStatus,
        trigger: SagaTrigger,
    },

    /// The order facts are malformed.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The next action could not be dispatched; saga state is unchanged.
    #[error("Failed to dispatch {action} for saga {saga_id}: {source}")]
    Dispatch {
        saga_id: SagaId,
        action: SagaAction,
        #[source]
        source: DispatchError,
    },

    /// State store error.
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidOrder(reason) => SagaError::InvalidOrder(reason),
            other => SagaError::Domain(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
