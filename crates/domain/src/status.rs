//! Saga status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The cause of a status transition.
///
/// Each variant corresponds to one inbound outcome report, except the two
/// compensation variants, which the orchestrator produces itself after calling
/// the inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaTrigger {
    InventoryReserved,
    InventoryReservationFailed,
    ShippingGenerated,
    ShippingGenerationFailed,
    NotificationSent,
    NotificationFailed,
    CompensationSucceeded,
    CompensationFailed,
}

impl SagaTrigger {
    /// Returns the trigger name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaTrigger::InventoryReserved => "INVENTORY_RESERVED",
            SagaTrigger::InventoryReservationFailed => "INVENTORY_RESERVATION_FAILED",
            SagaTrigger::ShippingGenerated => "SHIPPING_GENERATED",
            SagaTrigger::ShippingGenerationFailed => "SHIPPING_GENERATION_FAILED",
            SagaTrigger::NotificationSent => "NOTIFICATION_SENT",
            SagaTrigger::NotificationFailed => "NOTIFICATION_FAILED",
            SagaTrigger::CompensationSucceeded => "COMPENSATION_SUCCEEDED",
            SagaTrigger::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl std::fmt::Display for SagaTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of an order-fulfillment saga.
///
/// State transitions:
/// ```text
/// Started ──┬──► InventoryReserved ──┬──► ShippingGenerated ──► Completed
///           │                        │
///           │                        └──► ShippingFailed ──┬──► Compensated
///           │                                              └──► Failed
///           └──► InventoryFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Inventory reservation has been dispatched.
    #[default]
    Started,

    /// Inventory is held; shipment generation has been dispatched.
    InventoryReserved,

    /// Inventory could not be reserved (terminal state, nothing to undo).
    InventoryFailed,

    /// Shipment exists; the customer notification has been dispatched.
    ShippingGenerated,

    /// Shipment generation failed; inventory compensation is in progress.
    ShippingFailed,

    /// The order was fulfilled (terminal state).
    Completed,

    /// The inventory reservation was released after a shipping failure (terminal state).
    Compensated,

    /// Compensation itself failed; needs an operator (terminal state).
    Failed,
}

impl SagaStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SagaStatus; 8] = [
        SagaStatus::Started,
        SagaStatus::InventoryReserved,
        SagaStatus::InventoryFailed,
        SagaStatus::ShippingGenerated,
        SagaStatus::ShippingFailed,
        SagaStatus::Completed,
        SagaStatus::Compensated,
        SagaStatus::Failed,
    ];

    /// Returns the successor status for `trigger`, or `None` if the trigger is
    /// not a valid outgoing edge from this status.
    pub fn next(self, trigger: SagaTrigger) -> Option<SagaStatus> {
        match (self, trigger) {
            (SagaStatus::Started, SagaTrigger::InventoryReserved) => {
                Some(SagaStatus::InventoryReserved)
            }
            (SagaStatus::Started, SagaTrigger::InventoryReservationFailed) => {
                Some(SagaStatus::InventoryFailed)
            }
            (SagaStatus::InventoryReserved, SagaTrigger::ShippingGenerated) => {
                Some(SagaStatus::ShippingGenerated)
            }
            (SagaStatus::InventoryReserved, SagaTrigger::ShippingGenerationFailed) => {
                Some(SagaStatus::ShippingFailed)
            }
            (
                SagaStatus::ShippingGenerated,
                SagaTrigger::NotificationSent | SagaTrigger::NotificationFailed,
            ) => Some(SagaStatus::Completed),
            (SagaStatus::ShippingFailed, SagaTrigger::CompensationSucceeded) => {
                Some(SagaStatus::Compensated)
            }
            (SagaStatus::ShippingFailed, SagaTrigger::CompensationFailed) => {
                Some(SagaStatus::Failed)
            }
            _ => None,
        }
    }

    /// Like [`SagaStatus::next`], but reports a rejected trigger as an error.
    pub fn transition(self, trigger: SagaTrigger) -> Result<SagaStatus, DomainError> {
        self.next(trigger)
            .ok_or(DomainError::InvalidTransition {
                from: self,
                trigger,
            })
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::InventoryFailed
                | SagaStatus::Completed
                | SagaStatus::Compensated
                | SagaStatus::Failed
        )
    }

    /// Returns true if the saga ended in a state an operator has to look at.
    pub fn needs_operator(&self) -> bool {
        matches!(self, SagaStatus::Failed)
    }

    /// Returns the status name in its wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InventoryReserved => "INVENTORY_RESERVED",
            SagaStatus::InventoryFailed => "INVENTORY_FAILED",
            SagaStatus::ShippingGenerated => "SHIPPING_GENERATED",
            SagaStatus::ShippingFailed => "SHIPPING_FAILED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SagaStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGERS: [SagaTrigger; 8] = [
        SagaTrigger::InventoryReserved,
        SagaTrigger::InventoryReservationFailed,
        SagaTrigger::ShippingGenerated,
        SagaTrigger::ShippingGenerationFailed,
        SagaTrigger::NotificationSent,
        SagaTrigger::NotificationFailed,
        SagaTrigger::CompensationSucceeded,
        SagaTrigger::CompensationFailed,
    ];

    #[test]
    fn test_default_status_is_started() {
        assert_eq!(SagaStatus::default(), SagaStatus::Started);
    }

    #[test]
    fn test_happy_path_edges() {
        let reserved = SagaStatus::Started
            .next(SagaTrigger::InventoryReserved)
            .unwrap();
        assert_eq!(reserved, SagaStatus::InventoryReserved);

        let shipped = reserved.next(SagaTrigger::ShippingGenerated).unwrap();
        assert_eq!(shipped, SagaStatus::ShippingGenerated);

        let done = shipped.next(SagaTrigger::NotificationSent).unwrap();
        assert_eq!(done, SagaStatus::Completed);
    }

    #[test]
    fn test_notification_failure_still_completes() {
        assert_eq!(
            SagaStatus::ShippingGenerated.next(SagaTrigger::NotificationFailed),
            Some(SagaStatus::Completed)
        );
    }

    #[test]
    fn test_failure_branches() {
        assert_eq!(
            SagaStatus::Started.next(SagaTrigger::InventoryReservationFailed),
            Some(SagaStatus::InventoryFailed)
        );
        assert_eq!(
            SagaStatus::InventoryReserved.next(SagaTrigger::ShippingGenerationFailed),
            Some(SagaStatus::ShippingFailed)
        );
        assert_eq!(
            SagaStatus::ShippingFailed.next(SagaTrigger::CompensationSucceeded),
            Some(SagaStatus::Compensated)
        );
        assert_eq!(
            SagaStatus::ShippingFailed.next(SagaTrigger::CompensationFailed),
            Some(SagaStatus::Failed)
        );
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for status in SagaStatus::ALL.into_iter().filter(SagaStatus::is_terminal) {
            for trigger in TRIGGERS {
                assert_eq!(status.next(trigger), None, "{status} --{trigger}-->");
            }
        }
    }

    #[test]
    fn test_compensation_only_reachable_from_shipping_failed() {
        for status in SagaStatus::ALL {
            let reachable = status.next(SagaTrigger::CompensationSucceeded).is_some()
                || status.next(SagaTrigger::CompensationFailed).is_some();
            assert_eq!(reachable, status == SagaStatus::ShippingFailed);
        }
    }

    #[test]
    fn test_out_of_order_events_are_rejected() {
        assert!(SagaStatus::Started.next(SagaTrigger::ShippingGenerated).is_none());
        assert!(SagaStatus::Started.next(SagaTrigger::NotificationSent).is_none());
        assert!(
            SagaStatus::InventoryReserved
                .next(SagaTrigger::InventoryReserved)
                .is_none()
        );
        assert!(
            SagaStatus::ShippingGenerated
                .next(SagaTrigger::ShippingGenerationFailed)
                .is_none()
        );
    }

    #[test]
    fn test_transition_error_names_status_and_trigger() {
        let err = SagaStatus::Completed
            .transition(SagaTrigger::NotificationSent)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: SagaStatus::Completed,
                trigger: SagaTrigger::NotificationSent,
            }
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Started.is_terminal());
        assert!(!SagaStatus::InventoryReserved.is_terminal());
        assert!(!SagaStatus::ShippingGenerated.is_terminal());
        assert!(!SagaStatus::ShippingFailed.is_terminal());
        assert!(SagaStatus::InventoryFailed.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
    }

    #[test]
    fn test_wire_form_matches_serde() {
        for status in SagaStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<SagaStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "SHIPPED".parse::<SagaStatus>().unwrap_err();
        assert!(matches!(err, DomainError::UnknownStatus(s) if s == "SHIPPED"));
    }
}
