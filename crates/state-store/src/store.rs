use async_trait::async_trait;
use common::SagaId;
use domain::{SagaState, SagaStatus};

use crate::Result;

/// Core trait for saga state store implementations.
///
/// The store is the only shared mutable resource of the orchestrator. Writes
/// after the initial insert go through [`SagaStore::compare_and_swap`], so two
/// racing transitions from the same status can never both be applied.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Stores a new saga record.
    ///
    /// Fails with `AlreadyExists` if a record with the same id is present.
    async fn insert(&self, state: SagaState) -> Result<()>;

    /// Retrieves a saga record by id.
    ///
    /// Returns None if the saga doesn't exist.
    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaState>>;

    /// Replaces the stored record with `state` if its current status is `expected`.
    ///
    /// Fails with `Conflict` if the stored status differs and with `NotFound`
    /// if there is no record.
    async fn compare_and_swap(&self, state: &SagaState, expected: SagaStatus) -> Result<()>;

    /// Removes a record whose saga never began (its first dispatch failed).
    ///
    /// Returns true if a record was removed.
    async fn discard(&self, saga_id: &SagaId) -> Result<bool>;

    /// Retrieves all sagas currently in one of `statuses`, oldest update first.
    async fn find_by_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaState>>;
}

#[async_trait]
impl<T: SagaStore + ?Sized> SagaStore for std::sync::Arc<T> {
    async fn insert(&self, state: SagaState) -> Result<()> {
        (**self).insert(state).await
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        (**self).get(saga_id).await
    }

    async fn compare_and_swap(&self, state: &SagaState, expected: SagaStatus) -> Result<()> {
        (**self).compare_and_swap(state, expected).await
    }

    async fn discard(&self, saga_id: &SagaId) -> Result<bool> {
        (**self).discard(saga_id).await
    }

    async fn find_by_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaState>> {
        (**self).find_by_status(statuses).await
    }
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Checks if a saga exists.
    async fn exists(&self, saga_id: &SagaId) -> Result<bool> {
        Ok(self.get(saga_id).await?.is_some())
    }

    /// Retrieves every stored saga, regardless of status.
    async fn all(&self) -> Result<Vec<SagaState>> {
        self.find_by_status(&SagaStatus::ALL).await
    }
}

// Blanket implementation for all SagaStore implementations
impl<T: SagaStore + ?Sized> SagaStoreExt for T {}
