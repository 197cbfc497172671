//! HTTP event publisher for a push-style topic endpoint.

use std::time::Duration;

use async_trait::async_trait;
use domain::SagaDomainEvent;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{RemoteConfigError, excerpt, numeric_env, required_env};
use crate::error::PublishError;
use crate::services::{EventPublisher, MessageId};

/// Topic publisher configuration.
#[derive(Debug, Clone)]
pub struct HttpPublisherConfig {
    /// Topic endpoint URL.
    pub topic_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for HttpPublisherConfig {
    fn default() -> Self {
        Self {
            topic_url: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpPublisherConfig {
    /// Create config from environment variables.
    ///
    /// - `EVENT_TOPIC_URL`: Required topic endpoint
    /// - `EVENT_TOPIC_TIMEOUT_SECS`: Optional timeout in seconds (default: 10)
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Ok(Self {
            topic_url: required_env("EVENT_TOPIC_URL")?,
            timeout: Duration::from_secs(numeric_env("EVENT_TOPIC_TIMEOUT_SECS").unwrap_or(10)),
        })
    }

    /// Set the topic URL.
    pub fn with_topic_url(mut self, topic_url: impl Into<String>) -> Self {
        self.topic_url = topic_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: Option<String>,
}

/// Event publisher posting each event to a topic endpoint.
///
/// Routing attributes travel as `x-event-type`, `x-saga-id` and
/// `x-event-source` headers next to the JSON body.
pub struct HttpEventPublisher {
    client: Client,
    config: HttpPublisherConfig,
}

impl HttpEventPublisher {
    /// Create a new publisher with the given configuration.
    pub fn new(config: HttpPublisherConfig) -> Result<Self, RemoteConfigError> {
        if config.topic_url.is_empty() {
            return Err(RemoteConfigError::Missing("EVENT_TOPIC_URL"));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Self::new(HttpPublisherConfig::from_env()?)
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: &SagaDomainEvent) -> Result<MessageId, PublishError> {
        let body = serde_json::to_string(event)?;

        let response = self
            .client
            .post(&self.config.topic_url)
            .header("Content-Type", "application/json")
            .header("x-event-type", event.event_type.as_str())
            .header("x-saga-id", event.saga_id.as_str())
            .header("x-event-source", event.source.as_str())
            .body(body)
            .send()
            .await
            .map_err(|err| PublishError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let message_id = response
            .json::<PublishResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id)
            .unwrap_or_else(|| event.event_id.to_string());

        debug!(
            saga_id = %event.saga_id,
            event_type = %event.event_type,
            message_id = %message_id,
            "Event published"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{OrderFacts, SagaEventType, SagaState};

    fn event() -> SagaDomainEvent {
        let state = SagaState::start(OrderFacts::new("S1", "C1", "P1", 1)).unwrap();
        SagaDomainEvent::from_orchestrator(SagaEventType::InventoryReservationInitiated, &state)
            .unwrap()
    }

    fn publisher(url: String) -> HttpEventPublisher {
        HttpEventPublisher::new(HttpPublisherConfig::default().with_topic_url(url)).unwrap()
    }

    #[test]
    fn test_empty_topic_url_fails() {
        assert!(HttpEventPublisher::new(HttpPublisherConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_publish_sends_routing_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-event-type", "INVENTORY_RESERVATION_INITIATED")
            .match_header("x-saga-id", "S1")
            .match_header("x-event-source", "SagaOrchestrator")
            .with_status(200)
            .with_body(r#"{"messageId": "msg-7"}"#)
            .create_async()
            .await;

        let id = publisher(server.url()).publish(&event()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(id, "msg-7");
    }

    #[tokio::test]
    async fn test_message_id_falls_back_to_event_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(204)
            .create_async()
            .await;

        let event = event();
        let id = publisher(server.url()).publish(&event).await.unwrap();
        assert_eq!(id, event.event_id.to_string());
    }

    #[tokio::test]
    async fn test_rejected_publish() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let err = publisher(server.url()).publish(&event()).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 403, .. }));
    }
}
