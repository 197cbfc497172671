//! Order fulfillment saga orchestrator.
//!
//! Coordinates inventory reservation, shipment generation and customer
//! notification across independently failing services:
//! 1. Reserve inventory
//! 2. Generate a shipment
//! 3. Notify the customer
//!
//! Each step is dispatched fire-and-forget and its outcome arrives later as an
//! inbound event. A failed shipment releases the reserved inventory; a failed
//! release leaves the saga `FAILED` for an operator.

pub mod config;
pub mod error;
pub mod handler;
pub mod locks;
pub mod orchestrator;
pub mod order_fulfillment;
pub mod remote;
pub mod services;
pub mod simulator;

pub use config::{CompensationFailurePolicy, OrchestratorConfig, RetryPolicy};
pub use error::{DispatchError, PublishError, SagaError};
pub use handler::{SagaEventHandler, TransitionOutcome};
pub use locks::SagaLocks;
pub use orchestrator::{DynSagaOrchestrator, SagaOrchestrator};
pub use order_fulfillment::SagaAction;
pub use remote::{
    HttpActionInvoker, HttpCompensationAdapter, HttpEventPublisher, RemoteConfigError,
};
pub use services::{
    ActionInvoker, BroadcastEventPublisher, CompensationAdapter, EventPublisher,
    InMemoryActionInvoker, InMemoryCompensationAdapter, InMemoryEventPublisher,
    InvocationReceipt, MessageId,
};
pub use simulator::{EventSimulator, SimulatorConfig};
