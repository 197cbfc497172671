//! Event publisher trait and in-process implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{SagaDomainEvent, SagaEventType};
use tokio::sync::broadcast;

use crate::error::PublishError;

/// Identifier the topic assigned to a published message.
pub type MessageId = String;

/// Publishes saga progress events onto a pub/sub topic.
///
/// Delivery is at-least-once; consumers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `event` and returns the topic's message id.
    async fn publish(&self, event: &SagaDomainEvent) -> Result<MessageId, PublishError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, event: &SagaDomainEvent) -> Result<MessageId, PublishError> {
        (**self).publish(event).await
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    events: Vec<SagaDomainEvent>,
    fail_on_publish: bool,
}

/// In-memory event publisher that records every event, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryEventPublisher {
    /// Creates a new in-memory event publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject every event.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns all published events in order.
    pub fn events(&self) -> Vec<SagaDomainEvent> {
        self.state.read().unwrap().events.clone()
    }

    /// Returns the published event types in order.
    pub fn event_types(&self) -> Vec<SagaEventType> {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Returns the number of published events of `event_type`.
    pub fn count_of(&self, event_type: SagaEventType) -> usize {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Returns the number of published events.
    pub fn event_count(&self) -> usize {
        self.state.read().unwrap().events.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &SagaDomainEvent) -> Result<MessageId, PublishError> {
        let mut inner = self.state.write().unwrap();

        if inner.fail_on_publish {
            return Err(PublishError::Unavailable("topic is down".to_string()));
        }

        inner.events.push(event.clone());
        Ok(event.event_id.to_string())
    }
}

/// In-process topic over a tokio broadcast channel.
///
/// Publishing with no subscribers succeeds; the event is simply dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<SagaDomainEvent>,
}

impl BroadcastEventPublisher {
    /// Creates a topic buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SagaDomainEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: &SagaDomainEvent) -> Result<MessageId, PublishError> {
        // A send error only means there is no subscriber right now.
        let _ = self.sender.send(event.clone());
        Ok(event.event_id.to_string())
    }
}
