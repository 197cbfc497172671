//! Saga state model for order fulfillment.
//!
//! This crate holds the pure, I/O-free parts of the order-fulfillment saga:
//! - `SagaStatus` and the transition table driven by `SagaTrigger`
//! - `SagaState`, the per-order record, and `OrderFacts`, its immutable input
//! - `SagaDomainEvent`, the progress event published after each transition

pub mod error;
pub mod events;
pub mod state;
pub mod status;

pub use error::DomainError;
pub use events::{ORCHESTRATOR_SOURCE, SagaDomainEvent, SagaEventType};
pub use state::{OrderFacts, SagaState};
pub use status::{SagaStatus, SagaTrigger};
