//! Compensation adapter trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SagaId;
use domain::SagaState;

/// Synchronous calls against the inventory and shipping services.
///
/// Used both as a direct action path and as the rollback mechanism. Every
/// call resolves to a definite answer: transport errors and indeterminate
/// responses are reported as failure, never propagated.
#[async_trait]
pub trait CompensationAdapter: Send + Sync {
    /// Reserves stock for the order. Returns false on any failure.
    async fn reserve_inventory(&self, state: &SagaState) -> bool;

    /// Creates a shipment for the order and returns its id.
    async fn generate_shipment(&self, state: &SagaState) -> Option<String>;

    /// Releases the stock reserved for the order. Returns false on any failure.
    async fn compensate_inventory(&self, state: &SagaState) -> bool;
}

#[async_trait]
impl<T: CompensationAdapter + ?Sized> CompensationAdapter for Arc<T> {
    async fn reserve_inventory(&self, state: &SagaState) -> bool {
        (**self).reserve_inventory(state).await
    }

    async fn generate_shipment(&self, state: &SagaState) -> Option<String> {
        (**self).generate_shipment(state).await
    }

    async fn compensate_inventory(&self, state: &SagaState) -> bool {
        (**self).compensate_inventory(state).await
    }
}

/// Largest quantity the local stock rule will reserve.
const MAX_LOCAL_QUANTITY: u32 = 10;

#[derive(Debug)]
struct InMemoryCompensationState {
    reserved: HashSet<SagaId>,
    next_shipment: u32,
    fail_shipments: bool,
    compensation_result: bool,
    reserve_calls: usize,
    shipment_calls: usize,
    compensation_calls: Vec<SagaId>,
}

impl Default for InMemoryCompensationState {
    fn default() -> Self {
        Self {
            reserved: HashSet::new(),
            next_shipment: 0,
            fail_shipments: false,
            compensation_result: true,
            reserve_calls: 0,
            shipment_calls: 0,
            compensation_calls: Vec::new(),
        }
    }
}

/// In-memory compensation adapter for testing and local mode.
///
/// Reservation succeeds unless the product id contains `"999"` or more than
/// ten units are requested.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCompensationAdapter {
    state: Arc<RwLock<InMemoryCompensationState>>,
}

impl InMemoryCompensationAdapter {
    /// Creates a new in-memory compensation adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer returned by [`CompensationAdapter::compensate_inventory`].
    pub fn set_compensation_result(&self, succeeds: bool) {
        self.state.write().unwrap().compensation_result = succeeds;
    }

    /// Makes shipment generation fail.
    pub fn set_fail_shipments(&self, fail: bool) {
        self.state.write().unwrap().fail_shipments = fail;
    }

    /// Returns the number of reservation calls.
    pub fn reserve_calls(&self) -> usize {
        self.state.read().unwrap().reserve_calls
    }

    /// Returns the number of shipment calls.
    pub fn shipment_calls(&self) -> usize {
        self.state.read().unwrap().shipment_calls
    }

    /// Returns the number of compensation calls.
    pub fn compensation_calls(&self) -> usize {
        self.state.read().unwrap().compensation_calls.len()
    }

    /// Returns the sagas compensation was requested for, in call order.
    pub fn compensated_sagas(&self) -> Vec<SagaId> {
        self.state.read().unwrap().compensation_calls.clone()
    }

    /// Returns true if stock is currently held for the saga.
    pub fn is_reserved(&self, saga_id: &SagaId) -> bool {
        self.state.read().unwrap().reserved.contains(saga_id)
    }

    fn in_stock(state: &SagaState) -> bool {
        !state.product_id().as_str().contains("999") && state.quantity() <= MAX_LOCAL_QUANTITY
    }
}

#[async_trait]
impl CompensationAdapter for InMemoryCompensationAdapter {
    async fn reserve_inventory(&self, state: &SagaState) -> bool {
        let mut inner = self.state.write().unwrap();
        inner.reserve_calls += 1;

        if !Self::in_stock(state) {
            return false;
        }

        inner.reserved.insert(state.saga_id().clone());
        true
    }

    async fn generate_shipment(&self, _state: &SagaState) -> Option<String> {
        let mut inner = self.state.write().unwrap();
        inner.shipment_calls += 1;

        if inner.fail_shipments {
            return None;
        }

        inner.next_shipment += 1;
        Some(format!("SHIP-{:04}", inner.next_shipment))
    }

    async fn compensate_inventory(&self, state: &SagaState) -> bool {
        let mut inner = self.state.write().unwrap();
        inner.compensation_calls.push(state.saga_id().clone());

        if inner.compensation_result {
            inner.reserved.remove(state.saga_id());
        }
        inner.compensation_result
    }
}
