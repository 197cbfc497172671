use common::SagaId;
use domain::{DomainError, SagaStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the saga state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A saga with this id already exists.
    #[error("Saga already exists: {0}")]
    AlreadyExists(SagaId),

    /// No saga with this id is stored.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// The stored status did not match the expected status when writing.
    #[error("Status conflict for saga {saga_id}: expected {expected}, found {actual}")]
    Conflict {
        saga_id: SagaId,
        expected: SagaStatus,
        actual: SagaStatus,
    },

    /// A stored row could not be decoded into a saga record.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for failures a later attempt of the same write may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
        )
    }
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
