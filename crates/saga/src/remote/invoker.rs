//! Compute-backend action invoker.
//!
//! Dispatches each saga action as an asynchronous function invocation:
//! `POST {base}/functions/{name}/invocations` with `X-Invocation-Type: Event`.
//! The backend answers `202 Accepted` once the invocation is queued.

use std::time::Duration;

use async_trait::async_trait;
use domain::SagaState;
use reqwest::Client;
use tracing::{debug, warn};

use super::{RemoteConfigError, excerpt, numeric_env, required_env};
use crate::error::DispatchError;
use crate::order_fulfillment::SagaAction;
use crate::services::{ActionInvoker, InvocationReceipt};

/// Compute-backend invoker configuration.
#[derive(Debug, Clone)]
pub struct HttpInvokerConfig {
    /// Base URL of the compute backend.
    pub base_url: String,
    pub inventory_function: String,
    pub shipping_function: String,
    pub notification_function: String,
    /// Timeout for one dispatch request.
    pub timeout: Duration,
}

impl Default for HttpInvokerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            inventory_function: "inventory-reservation-fn".to_string(),
            shipping_function: "shipping-generation-fn".to_string(),
            notification_function: "notification-fn".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl HttpInvokerConfig {
    /// Create config from environment variables.
    ///
    /// - `COMPUTE_BACKEND_URL`: Required base URL
    /// - `INVENTORY_FUNCTION_NAME`, `SHIPPING_FUNCTION_NAME`,
    ///   `NOTIFICATION_FUNCTION_NAME`: Optional function names
    /// - `DISPATCH_TIMEOUT_MS`: Optional timeout in milliseconds (default: 5000)
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        let defaults = Self::default();
        let function = |name: &str, default: String| std::env::var(name).unwrap_or(default);

        Ok(Self {
            base_url: required_env("COMPUTE_BACKEND_URL")?,
            inventory_function: function("INVENTORY_FUNCTION_NAME", defaults.inventory_function),
            shipping_function: function("SHIPPING_FUNCTION_NAME", defaults.shipping_function),
            notification_function: function(
                "NOTIFICATION_FUNCTION_NAME",
                defaults.notification_function,
            ),
            timeout: numeric_env("DISPATCH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the function that implements `action`.
    pub fn function_for(&self, action: SagaAction) -> &str {
        match action {
            SagaAction::InventoryReservation => &self.inventory_function,
            SagaAction::ShipmentGeneration => &self.shipping_function,
            SagaAction::Notification => &self.notification_function,
        }
    }
}

/// Action invoker backed by an asynchronous compute backend.
///
/// Performs a single attempt per call; retry is up to the orchestrator.
pub struct HttpActionInvoker {
    client: Client,
    config: HttpInvokerConfig,
}

impl HttpActionInvoker {
    /// Create a new invoker with the given configuration.
    pub fn new(config: HttpInvokerConfig) -> Result<Self, RemoteConfigError> {
        if config.base_url.is_empty() {
            return Err(RemoteConfigError::Missing("COMPUTE_BACKEND_URL"));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Self::new(HttpInvokerConfig::from_env()?)
    }

    fn invocation_url(&self, action: SagaAction) -> String {
        format!(
            "{}/functions/{}/invocations",
            self.config.base_url.trim_end_matches('/'),
            self.config.function_for(action)
        )
    }
}

#[async_trait]
impl ActionInvoker for HttpActionInvoker {
    async fn invoke(
        &self,
        action: SagaAction,
        state: &SagaState,
    ) -> Result<InvocationReceipt, DispatchError> {
        let url = self.invocation_url(action);

        let response = self
            .client
            .post(&url)
            .header("X-Invocation-Type", "Event")
            .json(state)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DispatchError::Timeout(self.config.timeout)
                } else {
                    DispatchError::Unreachable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                url = %url,
                saga_id = %state.saga_id(),
                status = %status,
                body = %excerpt(&body),
                "Compute backend refused invocation"
            );
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let receipt = match response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
        {
            Some(request_id) => InvocationReceipt {
                action,
                request_id: request_id.to_string(),
            },
            None => InvocationReceipt::generated(action),
        };

        debug!(
            saga_id = %state.saga_id(),
            action = %action,
            request_id = %receipt.request_id,
            "Action dispatched"
        );
        Ok(receipt)
    }
}
