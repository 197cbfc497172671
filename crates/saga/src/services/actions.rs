//! Action invoker trait and in-memory implementation.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::SagaId;
use domain::SagaState;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::order_fulfillment::SagaAction;

/// Acknowledgement that an action was accepted for processing.
///
/// Says nothing about the business outcome of the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReceipt {
    pub action: SagaAction,
    /// Request id assigned by the compute backend, or generated locally.
    pub request_id: String,
}

impl InvocationReceipt {
    /// Creates a receipt with a locally generated request id.
    pub fn generated(action: SagaAction) -> Self {
        Self {
            action,
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Fire-and-forget dispatch of saga actions to a compute backend.
///
/// Returns as soon as the backend has accepted the invocation. The outcome of
/// the action arrives later as an inbound event.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Dispatches `action` with a snapshot of `state`.
    async fn invoke(
        &self,
        action: SagaAction,
        state: &SagaState,
    ) -> Result<InvocationReceipt, DispatchError>;
}

#[async_trait]
impl<T: ActionInvoker + ?Sized> ActionInvoker for Arc<T> {
    async fn invoke(
        &self,
        action: SagaAction,
        state: &SagaState,
    ) -> Result<InvocationReceipt, DispatchError> {
        (**self).invoke(action, state).await
    }
}

/// Accepted dispatches kept for inspection; older ones are dropped.
pub const MAX_RECORDED_DISPATCHES: usize = 1024;

#[derive(Debug, Default)]
struct InMemoryInvokerState {
    dispatches: VecDeque<(SagaAction, SagaId)>,
    dispatched: usize,
    attempts: usize,
    latency: Duration,
    unreachable: bool,
    failures_remaining: usize,
}

/// In-memory action invoker for testing and local mode.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActionInvoker {
    state: Arc<RwLock<InMemoryInvokerState>>,
}

impl InMemoryActionInvoker {
    /// Creates a new in-memory action invoker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every dispatch fail as if the backend were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Makes the next `count` dispatch attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.state.write().unwrap().failures_remaining = count;
    }

    /// Delays every dispatch attempt by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.write().unwrap().latency = latency;
    }

    /// Returns the most recent accepted dispatches in order.
    pub fn dispatches(&self) -> Vec<(SagaAction, SagaId)> {
        self.state.read().unwrap().dispatches.iter().cloned().collect()
    }

    /// Returns the number of accepted dispatches, including dropped ones.
    pub fn dispatch_count(&self) -> usize {
        self.state.read().unwrap().dispatched
    }

    /// Returns the number of dispatch attempts, accepted or not.
    pub fn attempt_count(&self) -> usize {
        self.state.read().unwrap().attempts
    }

    /// Returns the accepted dispatches for one saga.
    pub fn actions_for(&self, saga_id: &SagaId) -> Vec<SagaAction> {
        self.state
            .read()
            .unwrap()
            .dispatches
            .iter()
            .filter(|(_, id)| id == saga_id)
            .map(|(action, _)| *action)
            .collect()
    }
}

#[async_trait]
impl ActionInvoker for InMemoryActionInvoker {
    async fn invoke(
        &self,
        action: SagaAction,
        state: &SagaState,
    ) -> Result<InvocationReceipt, DispatchError> {
        let latency = self.state.read().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.state.write().unwrap();
        inner.attempts += 1;

        if inner.unreachable {
            return Err(DispatchError::Unreachable(
                "compute backend is down".to_string(),
            ));
        }

        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(DispatchError::Rejected {
                status: 503,
                body: "busy".to_string(),
            });
        }

        if inner.dispatches.len() == MAX_RECORDED_DISPATCHES {
            inner.dispatches.pop_front();
        }
        inner.dispatches.push_back((action, state.saga_id().clone()));
        inner.dispatched += 1;
        Ok(InvocationReceipt::generated(action))
    }
}
