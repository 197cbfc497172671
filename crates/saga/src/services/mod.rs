//! Outbound ports of the orchestrator and their in-memory implementations.

pub mod actions;
pub mod compensation;
pub mod publisher;

pub use actions::{ActionInvoker, InMemoryActionInvoker, InvocationReceipt};
pub use compensation::{CompensationAdapter, InMemoryCompensationAdapter};
pub use publisher::{BroadcastEventPublisher, EventPublisher, InMemoryEventPublisher, MessageId};
