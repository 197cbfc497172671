//! Order fulfillment saga constants and action names.

use domain::SagaEventType;
use serde::{Deserialize, Serialize};

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "OrderFulfillment";

/// The remote actions the saga dispatches, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaAction {
    /// Reserve inventory for the order.
    InventoryReservation,
    /// Create the shipment for the reserved order.
    ShipmentGeneration,
    /// Notify the customer (best effort).
    Notification,
}

impl SagaAction {
    /// Returns the logical action name used to key dispatches.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaAction::InventoryReservation => "inventory-reservation",
            SagaAction::ShipmentGeneration => "shipment-generation",
            SagaAction::Notification => "notification",
        }
    }

    /// Returns the event published once this action has been dispatched.
    pub fn initiated_event(&self) -> SagaEventType {
        match self {
            SagaAction::InventoryReservation => SagaEventType::InventoryReservationInitiated,
            SagaAction::ShipmentGeneration => SagaEventType::ShippingGenerationInitiated,
            SagaAction::Notification => SagaEventType::CustomNotificationInitiated,
        }
    }
}

impl std::fmt::Display for SagaAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
