//! Saga domain events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::state::SagaState;

/// Source name stamped on every event the orchestrator emits.
pub const ORCHESTRATOR_SOURCE: &str = "SagaOrchestrator";

/// The fixed vocabulary of saga progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaEventType {
    /// Inventory reservation was dispatched (saga started).
    InventoryReservationInitiated,
    /// Inventory could not be reserved; the saga ended.
    InventoryReservationFailed,
    /// Shipment generation was dispatched.
    ShippingGenerationInitiated,
    /// Shipment generation failed; compensation follows.
    ShippingGenerationFailed,
    /// Customer notification was dispatched.
    CustomNotificationInitiated,
    /// The inventory reservation was released.
    InventoryCompensated,
    /// Releasing the inventory reservation failed.
    InventoryCompensationFailed,
    /// The saga finished successfully.
    SagaCompleted,
    /// A saga needs an operator (emitted under the paging policy).
    OperatorAlertRaised,
}

impl SagaEventType {
    /// Returns the event type name in its wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEventType::InventoryReservationInitiated => "INVENTORY_RESERVATION_INITIATED",
            SagaEventType::InventoryReservationFailed => "INVENTORY_RESERVATION_FAILED",
            SagaEventType::ShippingGenerationInitiated => "SHIPPING_GENERATION_INITIATED",
            SagaEventType::ShippingGenerationFailed => "SHIPPING_GENERATION_FAILED",
            SagaEventType::CustomNotificationInitiated => "CUSTOM_NOTIFICATION_INITIATED",
            SagaEventType::InventoryCompensated => "INVENTORY_COMPENSATED",
            SagaEventType::InventoryCompensationFailed => "INVENTORY_COMPENSATION_FAILED",
            SagaEventType::SagaCompleted => "SAGA_COMPLETED",
            SagaEventType::OperatorAlertRaised => "OPERATOR_ALERT_RAISED",
        }
    }

    /// Returns true for the events that announce a dispatched action.
    pub fn is_initiation(&self) -> bool {
        matches!(
            self,
            SagaEventType::InventoryReservationInitiated
                | SagaEventType::ShippingGenerationInitiated
                | SagaEventType::CustomNotificationInitiated
        )
    }

    /// Returns true for the events that report a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SagaEventType::InventoryReservationFailed
                | SagaEventType::ShippingGenerationFailed
                | SagaEventType::InventoryCompensationFailed
        )
    }
}

impl std::fmt::Display for SagaEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published saga progress event. Never persisted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaDomainEvent {
    pub event_id: Uuid,
    pub saga_id: SagaId,
    pub event_type: SagaEventType,
    /// JSON snapshot of the [`SagaState`] at emission time.
    pub payload: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl SagaDomainEvent {
    /// Creates an event carrying a snapshot of `state`.
    pub fn new(
        event_type: SagaEventType,
        state: &SagaState,
        source: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            saga_id: state.saga_id().clone(),
            event_type,
            payload: state.snapshot()?,
            source: source.into(),
            timestamp: Utc::now(),
        })
    }

    /// Creates an event stamped with the orchestrator as its source.
    pub fn from_orchestrator(
        event_type: SagaEventType,
        state: &SagaState,
    ) -> Result<Self, DomainError> {
        Self::new(event_type, state, ORCHESTRATOR_SOURCE)
    }

    /// Routing metadata published alongside the body so consumers can
    /// filter without deserializing it.
    pub fn attributes(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("eventType", self.event_type.as_str().to_string()),
            ("sagaId", self.saga_id.to_string()),
            ("source", self.source.clone()),
        ])
    }

    /// Decodes the state snapshot carried in the payload.
    pub fn state(&self) -> Result<SagaState, DomainError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
