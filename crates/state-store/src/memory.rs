use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use domain::{SagaState, SagaStatus};
use tokio::sync::RwLock;

use crate::{Result, SagaStore, StoreError};

/// In-memory saga store.
///
/// Provides the same interface as the PostgreSQL implementation. Every
/// compare-and-swap runs under a single write guard, which makes the
/// read-validate-write step atomic per key.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaState>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sagas stored.
    pub async fn len(&self) -> usize {
        self.sagas.read().await.len()
    }

    /// Returns true if no saga is stored.
    pub async fn is_empty(&self) -> bool {
        self.sagas.read().await.is_empty()
    }

    /// Clears all sagas.
    pub async fn clear(&self) {
        self.sagas.write().await.clear();
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, state: SagaState) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        if sagas.contains_key(state.saga_id()) {
            return Err(StoreError::AlreadyExists(state.saga_id().clone()));
        }
        sagas.insert(state.saga_id().clone(), state);
        Ok(())
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        Ok(self.sagas.read().await.get(saga_id).cloned())
    }

    async fn compare_and_swap(&self, state: &SagaState, expected: SagaStatus) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        let stored = sagas
            .get_mut(state.saga_id())
            .ok_or_else(|| StoreError::NotFound(state.saga_id().clone()))?;

        if stored.status() != expected {
            metrics::counter!("saga_store_conflicts_total").increment(1);
            return Err(StoreError::Conflict {
                saga_id: state.saga_id().clone(),
                expected,
                actual: stored.status(),
            });
        }

        *stored = state.clone();
        Ok(())
    }

    async fn discard(&self, saga_id: &SagaId) -> Result<bool> {
        Ok(self.sagas.write().await.remove(saga_id).is_some())
    }

    async fn find_by_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaState>> {
        let sagas = self.sagas.read().await;
        let mut found: Vec<_> = sagas
            .values()
            .filter(|s| statuses.contains(&s.status()))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.last_updated());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaStoreExt;
    use domain::{OrderFacts, SagaTrigger};

    fn started(id: &str) -> SagaState {
        SagaState::start(OrderFacts::new(id, "C1", "P1", 2)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemorySagaStore::new();
        store.insert(started("S1")).await.unwrap();

        let loaded = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(loaded.status(), SagaStatus::Started);
        assert_eq!(store.len().await, 1);
        assert!(store.exists(&SagaId::new("S1")).await.unwrap());
        assert!(store.get(&SagaId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemorySagaStore::new();
        store.insert(started("S1")).await.unwrap();

        let result = store.insert(started("S1")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(id)) if id.as_str() == "S1"));
    }

    #[tokio::test]
    async fn test_compare_and_swap_applies_on_matching_status() {
        let store = InMemorySagaStore::new();
        let mut state = started("S1");
        store.insert(state.clone()).await.unwrap();

        state.apply(SagaTrigger::InventoryReserved).unwrap();
        store
            .compare_and_swap(&state, SagaStatus::Started)
            .await
            .unwrap();

        let loaded = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(loaded.status(), SagaStatus::InventoryReserved);
    }

    #[tokio::test]
    async fn test_compare_and_swap_conflict_leaves_record_untouched() {
        let store = InMemorySagaStore::new();
        let state = started("S1");
        store.insert(state.clone()).await.unwrap();

        let mut reserved = state.clone();
        reserved.apply(SagaTrigger::InventoryReserved).unwrap();
        store
            .compare_and_swap(&reserved, SagaStatus::Started)
            .await
            .unwrap();

        // A racing writer that also read STARTED loses.
        let mut failed = state.clone();
        failed.apply(SagaTrigger::InventoryReservationFailed).unwrap();
        let result = store.compare_and_swap(&failed, SagaStatus::Started).await;
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                expected: SagaStatus::Started,
                actual: SagaStatus::InventoryReserved,
                ..
            })
        ));

        let loaded = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(loaded.status(), SagaStatus::InventoryReserved);
    }

    #[tokio::test]
    async fn test_compare_and_swap_missing_saga() {
        let store = InMemorySagaStore::new();
        let result = store
            .compare_and_swap(&started("S1"), SagaStatus::Started)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_discard() {
        let store = InMemorySagaStore::new();
        store.insert(started("S1")).await.unwrap();

        assert!(store.discard(&SagaId::new("S1")).await.unwrap());
        assert!(!store.discard(&SagaId::new("S1")).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = InMemorySagaStore::new();
        store.insert(started("S1")).await.unwrap();

        let mut reserved = started("S2");
        store.insert(reserved.clone()).await.unwrap();
        reserved.apply(SagaTrigger::InventoryReserved).unwrap();
        store
            .compare_and_swap(&reserved, SagaStatus::Started)
            .await
            .unwrap();

        let found = store.find_by_status(&[SagaStatus::Started]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].saga_id().as_str(), "S1");

        assert_eq!(store.all().await.unwrap().len(), 2);
        assert!(
            store
                .find_by_status(&[SagaStatus::Completed])
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_concurrent_swaps_from_same_status_have_one_winner() {
        let store = InMemorySagaStore::new();
        let state = started("S1");
        store.insert(state.clone()).await.unwrap();

        let mut reserved = state.clone();
        reserved.apply(SagaTrigger::InventoryReserved).unwrap();
        let mut failed = state.clone();
        failed.apply(SagaTrigger::InventoryReservationFailed).unwrap();

        let s1 = store.clone();
        let s2 = store.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { s1.compare_and_swap(&reserved, SagaStatus::Started).await }),
            tokio::spawn(async move { s2.compare_and_swap(&failed, SagaStatus::Started).await }),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
