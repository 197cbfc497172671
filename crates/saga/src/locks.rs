//! Per-saga mutual exclusion.

use std::hash::{DefaultHasher, Hash, Hasher};

use common::SagaId;
use tokio::sync::{Mutex, MutexGuard};

/// A fixed set of async mutexes striped by saga id.
///
/// Every handler holds the stripe of its saga for the whole
/// load-validate-act-write sequence, so two events for the same saga are
/// applied one after the other. Sagas hashed to different stripes never wait
/// on each other.
pub struct SagaLocks {
    stripes: Vec<Mutex<()>>,
}

impl SagaLocks {
    /// Creates `stripes` locks (at least one).
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Waits for and acquires the stripe guarding `saga_id`.
    pub async fn lock(&self, saga_id: &SagaId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_index(saga_id)].lock().await
    }

    /// Returns the number of stripes.
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_index(&self, saga_id: &SagaId) -> usize {
        let mut hasher = DefaultHasher::new();
        saga_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for SagaLocks {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_zero_stripes_is_clamped() {
        assert_eq!(SagaLocks::new(0).stripe_count(), 1);
    }

    #[test]
    fn test_same_id_maps_to_same_stripe() {
        let locks = SagaLocks::new(16);
        let id = SagaId::new("S1");
        assert_eq!(locks.stripe_index(&id), locks.stripe_index(&id.clone()));
    }

    #[tokio::test]
    async fn test_same_saga_is_serialized() {
        let locks = Arc::new(SagaLocks::new(8));
        let id = SagaId::new("S1");

        let guard = locks.lock(&id).await;

        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
