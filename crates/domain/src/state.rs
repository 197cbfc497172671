//! The per-order saga state record.

use chrono::{DateTime, Utc};
use common::{CustomerId, ProductId, SagaId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::{SagaStatus, SagaTrigger};

/// The immutable order facts a saga is started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFacts {
    pub saga_id: SagaId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderFacts {
    /// Creates a new set of order facts.
    pub fn new(
        saga_id: impl Into<SagaId>,
        customer_id: impl Into<CustomerId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Self {
        Self {
            saga_id: saga_id.into(),
            customer_id: customer_id.into(),
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Rejects blank identifiers and a zero quantity.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.saga_id.is_blank() {
            return Err(DomainError::InvalidOrder("sagaId is required".to_string()));
        }
        if self.customer_id.is_blank() {
            return Err(DomainError::InvalidOrder(
                "customerId is required".to_string(),
            ));
        }
        if self.product_id.is_blank() {
            return Err(DomainError::InvalidOrder("productId is required".to_string()));
        }
        if self.quantity == 0 {
            return Err(DomainError::InvalidOrder(
                "quantity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One saga per order, keyed by `saga_id`.
///
/// Only `status` and `last_updated` change after construction, and they
/// only change together through [`SagaState::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaState {
    saga_id: SagaId,
    customer_id: CustomerId,
    product_id: ProductId,
    quantity: u32,
    status: SagaStatus,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl SagaState {
    /// Creates the initial `STARTED` record for an order.
    pub fn start(order: OrderFacts) -> Result<Self, DomainError> {
        order.validate()?;
        let now = Utc::now();
        Ok(Self {
            saga_id: order.saga_id,
            customer_id: order.customer_id,
            product_id: order.product_id,
            quantity: order.quantity,
            status: SagaStatus::Started,
            created_at: now,
            last_updated: now,
        })
    }

    /// Rebuilds a record from storage without validating the lifecycle.
    pub fn restore(
        order: OrderFacts,
        status: SagaStatus,
        created_at: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id: order.saga_id,
            customer_id: order.customer_id,
            product_id: order.product_id,
            quantity: order.quantity,
            status,
            created_at,
            last_updated,
        }
    }

    /// Applies `trigger`, moving to the successor status and stamping
    /// `last_updated`. Leaves the record untouched if the edge does not exist.
    pub fn apply(&mut self, trigger: SagaTrigger) -> Result<SagaStatus, DomainError> {
        let next = self.status.transition(trigger)?;
        self.status = next;
        self.last_updated = Utc::now();
        Ok(next)
    }

    /// Returns the JSON snapshot carried in events and action dispatches.
    pub fn snapshot(&self) -> Result<String, DomainError> {
        Ok(serde_json::to_string(self)?)
    }
}

// Query methods
impl SagaState {
    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the most recent transition, for staleness diagnostics.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Returns the order facts this saga was started with.
    pub fn order(&self) -> OrderFacts {
        OrderFacts {
            saga_id: self.saga_id.clone(),
            customer_id: self.customer_id.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
        }
    }
}
