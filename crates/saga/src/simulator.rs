//! Local stand-in for the remote actions.
//!
//! Listens to the orchestrator's own topic and, for every dispatched action,
//! reports an outcome back after a delay, the way the real functions would.

use std::sync::Arc;
use std::time::Duration;

use domain::{SagaDomainEvent, SagaEventType};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::handler::SagaEventHandler;
use crate::services::CompensationAdapter;

/// Delays before each simulated outcome is reported.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub inventory_delay: Duration,
    pub shipping_delay: Duration,
    pub notification_delay: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            inventory_delay: Duration::from_secs(2),
            shipping_delay: Duration::from_secs(3),
            notification_delay: Duration::from_secs(1),
        }
    }
}

impl SimulatorConfig {
    /// Uses the same delay for every action.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            inventory_delay: delay,
            shipping_delay: delay,
            notification_delay: delay,
        }
    }

    fn delay_for(&self, event_type: SagaEventType) -> Option<Duration> {
        if !event_type.is_initiation() {
            return None;
        }
        Some(match event_type {
            SagaEventType::InventoryReservationInitiated => self.inventory_delay,
            SagaEventType::ShippingGenerationInitiated => self.shipping_delay,
            _ => self.notification_delay,
        })
    }
}

/// Feeds simulated action outcomes back into a [`SagaEventHandler`].
///
/// Reservation and shipment outcomes are decided by a
/// [`CompensationAdapter`]; notifications always succeed.
pub struct EventSimulator<H: ?Sized, C: ?Sized> {
    handler: Arc<H>,
    services: Arc<C>,
    config: SimulatorConfig,
}

impl<H, C> EventSimulator<H, C>
where
    H: SagaEventHandler + ?Sized + 'static,
    C: CompensationAdapter + ?Sized + 'static,
{
    pub fn new(handler: Arc<H>, services: Arc<C>, config: SimulatorConfig) -> Self {
        Self {
            handler,
            services,
            config,
        }
    }

    /// Runs the simulator on its own task until the topic closes.
    pub fn spawn(self, events: broadcast::Receiver<SagaDomainEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Consumes `events` until the topic closes.
    pub async fn run(self, mut events: broadcast::Receiver<SagaDomainEvent>) {
        info!("event simulator started");
        loop {
            match events.recv().await {
                Ok(event) => self.react(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event simulator lagged behind the topic");
                }
                Err(RecvError::Closed) => {
                    info!("event topic closed, simulator stopping");
                    break;
                }
            }
        }
    }

    fn react(&self, event: SagaDomainEvent) {
        let Some(delay) = self.config.delay_for(event.event_type) else {
            return;
        };

        let state = match event.state() {
            Ok(state) => state,
            Err(err) => {
                warn!(saga_id = %event.saga_id, error = %err, "undecodable event payload");
                return;
            }
        };

        let handler = Arc::clone(&self.handler);
        let services = Arc::clone(&self.services);
        let event_type = event.event_type;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let saga_id = state.saga_id().clone();

            let result = match event_type {
                SagaEventType::InventoryReservationInitiated => {
                    if services.reserve_inventory(&state).await {
                        handler.on_inventory_reserved(&saga_id).await
                    } else {
                        handler.on_inventory_reservation_failed(&saga_id).await
                    }
                }
                SagaEventType::ShippingGenerationInitiated => {
                    match services.generate_shipment(&state).await {
                        Some(shipping_order_id) => {
                            handler
                                .on_shipping_generated(&saga_id, &shipping_order_id)
                                .await
                        }
                        None => handler.on_shipping_generation_failed(&saga_id).await,
                    }
                }
                _ => handler.on_notification_sent(&saga_id).await,
            };

            match result {
                Ok(outcome) => debug!(
                    saga_id = %saga_id,
                    status = %outcome.status,
                    "simulated outcome applied"
                ),
                Err(err) => warn!(
                    saga_id = %saga_id,
                    event_type = %event_type,
                    error = %err,
                    "simulated outcome not applied"
                ),
            }
        });
    }
}
