//! Inbound port of the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use domain::{OrderFacts, SagaState, SagaStatus};
use serde::Serialize;

use crate::error::Result;

/// The transition an inbound event caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub saga_id: SagaId,
    pub previous: SagaStatus,
    pub status: SagaStatus,
}

/// Reacts to saga starts and to the outcome events of dispatched actions.
///
/// Every `on_*` call fails with `SagaNotFound` for an unknown saga and with
/// `InvalidTransition` when the event does not match the saga's current
/// status; neither changes any state.
#[async_trait]
pub trait SagaEventHandler: Send + Sync {
    /// Records a new saga at `STARTED` and dispatches inventory reservation.
    async fn start_saga(&self, order: OrderFacts) -> Result<SagaState>;

    async fn on_inventory_reserved(&self, saga_id: &SagaId) -> Result<TransitionOutcome>;

    async fn on_inventory_reservation_failed(&self, saga_id: &SagaId)
    -> Result<TransitionOutcome>;

    async fn on_shipping_generated(
        &self,
        saga_id: &SagaId,
        shipping_order_id: &str,
    ) -> Result<TransitionOutcome>;

    /// Moves the saga to `SHIPPING_FAILED` and runs inventory compensation.
    async fn on_shipping_generation_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome>;

    async fn on_notification_sent(&self, saga_id: &SagaId) -> Result<TransitionOutcome>;

    /// Notification is best effort: a failure still completes the saga.
    async fn on_notification_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome>;
}

#[async_trait]
impl<T: SagaEventHandler + ?Sized> SagaEventHandler for Arc<T> {
    async fn start_saga(&self, order: OrderFacts) -> Result<SagaState> {
        (**self).start_saga(order).await
    }

    async fn on_inventory_reserved(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        (**self).on_inventory_reserved(saga_id).await
    }

    async fn on_inventory_reservation_failed(
        &self,
        saga_id: &SagaId,
    ) -> Result<TransitionOutcome> {
        (**self).on_inventory_reservation_failed(saga_id).await
    }

    async fn on_shipping_generated(
        &self,
        saga_id: &SagaId,
        shipping_order_id: &str,
    ) -> Result<TransitionOutcome> {
        (**self)
            .on_shipping_generated(saga_id, shipping_order_id)
            .await
    }

    async fn on_shipping_generation_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        (**self).on_shipping_generation_failed(saga_id).await
    }

    async fn on_notification_sent(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        (**self).on_notification_sent(saga_id).await
    }

    async fn on_notification_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        (**self).on_notification_failed(saga_id).await
    }
}
