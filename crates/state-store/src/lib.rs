//! Keyed state store for order-fulfillment sagas.
//!
//! Sagas are held for their entire lifetime under their `SagaId`. The store
//! never deletes a saga that has progressed past its first dispatch; retention
//! of terminal sagas is an external policy.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use store::{SagaStore, SagaStoreExt};
