//! HTTP compensation adapter for the inventory and shipping services.

use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, ProductId, SagaId};
use domain::SagaState;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{RemoteConfigError, excerpt, numeric_env, required_env};
use crate::services::CompensationAdapter;

/// Reason sent with a compensation request.
const SHIPPING_FAILURE_REASON: &str = "SHIPPING_FAILURE";

/// Compensation adapter configuration.
#[derive(Debug, Clone)]
pub struct HttpCompensationConfig {
    /// Base URL of the inventory service.
    pub inventory_url: String,
    /// Base URL of the shipping service.
    pub shipping_url: String,
    /// Upper bound for every call.
    pub timeout: Duration,
}

impl Default for HttpCompensationConfig {
    fn default() -> Self {
        Self {
            inventory_url: String::new(),
            shipping_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpCompensationConfig {
    /// Create config from environment variables.
    ///
    /// - `INVENTORY_SERVICE_URL`: Required
    /// - `SHIPPING_SERVICE_URL`: Required
    /// - `EXTERNAL_CALL_TIMEOUT_SECS`: Optional timeout in seconds (default: 30)
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Ok(Self {
            inventory_url: required_env("INVENTORY_SERVICE_URL")?,
            shipping_url: required_env("SHIPPING_SERVICE_URL")?,
            timeout: Duration::from_secs(numeric_env("EXTERNAL_CALL_TIMEOUT_SECS").unwrap_or(30)),
        })
    }

    /// Set both service URLs.
    pub fn with_urls(
        mut self,
        inventory_url: impl Into<String>,
        shipping_url: impl Into<String>,
    ) -> Self {
        self.inventory_url = inventory_url.into();
        self.shipping_url = shipping_url.into();
        self
    }

    /// Set the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceRequest<'a> {
    saga_id: &'a SagaId,
    product_id: &'a ProductId,
    quantity: u32,
    customer_id: &'a CustomerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl<'a> ServiceRequest<'a> {
    fn for_state(state: &'a SagaState, reason: Option<&'static str>) -> Self {
        Self {
            saga_id: state.saga_id(),
            product_id: state.product_id(),
            quantity: state.quantity(),
            customer_id: state.customer_id(),
            reason,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    shipping_order_id: Option<String>,
}

/// Compensation adapter calling the inventory and shipping services over HTTP.
///
/// Every failure (transport, non-2xx, undecodable body, timeout) becomes a
/// negative answer and is logged.
pub struct HttpCompensationAdapter {
    client: Client,
    config: HttpCompensationConfig,
}

impl HttpCompensationAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: HttpCompensationConfig) -> Result<Self, RemoteConfigError> {
        if config.inventory_url.is_empty() {
            return Err(RemoteConfigError::Missing("INVENTORY_SERVICE_URL"));
        }
        if config.shipping_url.is_empty() {
            return Err(RemoteConfigError::Missing("SHIPPING_SERVICE_URL"));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Self::new(HttpCompensationConfig::from_env()?)
    }

    async fn call(&self, url: String, request: ServiceRequest<'_>) -> Option<ServiceResponse> {
        let saga_id = request.saga_id.clone();

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                error!(url = %url, saga_id = %saga_id, error = %err, "External service call failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                url = %url,
                saga_id = %saga_id,
                status = %status,
                body = %excerpt(&body),
                "External service returned an error"
            );
            return None;
        }

        match response.json::<ServiceResponse>().await {
            Ok(body) => Some(body),
            Err(err) => {
                error!(url = %url, saga_id = %saga_id, error = %err, "Undecodable external service response");
                None
            }
        }
    }

    fn inventory_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.inventory_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CompensationAdapter for HttpCompensationAdapter {
    async fn reserve_inventory(&self, state: &SagaState) -> bool {
        let url = self.inventory_endpoint("/api/inventory/reserve");
        let success = self
            .call(url, ServiceRequest::for_state(state, None))
            .await
            .is_some_and(|r| r.success);

        info!(saga_id = %state.saga_id(), success, "Inventory reservation answered");
        success
    }

    async fn generate_shipment(&self, state: &SagaState) -> Option<String> {
        let url = format!(
            "{}/api/shipping/create",
            self.config.shipping_url.trim_end_matches('/')
        );
        let shipment = self
            .call(url, ServiceRequest::for_state(state, None))
            .await
            .and_then(|r| r.shipping_order_id)
            .filter(|id| !id.trim().is_empty());

        info!(saga_id = %state.saga_id(), shipment = ?shipment, "Shipment generation answered");
        shipment
    }

    async fn compensate_inventory(&self, state: &SagaState) -> bool {
        let url = self.inventory_endpoint("/api/inventory/compensate");
        let success = self
            .call(
                url,
                ServiceRequest::for_state(state, Some(SHIPPING_FAILURE_REASON)),
            )
            .await
            .is_some_and(|r| r.success);

        info!(saga_id = %state.saga_id(), success, "Inventory compensation answered");
        success
    }
}
