//! The order fulfillment state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backon::Retryable;
use chrono::{TimeDelta, Utc};
use common::SagaId;
use domain::{OrderFacts, SagaDomainEvent, SagaEventType, SagaState, SagaStatus, SagaTrigger};
use state_store::{SagaStore, StoreError};
use tracing::{debug, error, info, warn};

use crate::config::{CompensationFailurePolicy, OrchestratorConfig};
use crate::error::{DispatchError, Result, SagaError};
use crate::handler::{SagaEventHandler, TransitionOutcome};
use crate::locks::SagaLocks;
use crate::order_fulfillment::{SAGA_TYPE, SagaAction};
use crate::services::{ActionInvoker, CompensationAdapter, EventPublisher, InvocationReceipt};

/// An orchestrator whose backends are chosen at runtime.
pub type DynSagaOrchestrator = SagaOrchestrator<
    Arc<dyn SagaStore>,
    Arc<dyn ActionInvoker>,
    Arc<dyn CompensationAdapter>,
    Arc<dyn EventPublisher>,
>;

/// Drives order fulfillment sagas from their inbound events.
///
/// Each handler holds the saga's lock stripe for the whole
/// load, validate, write, act and publish sequence. A forward transition is
/// claimed in the store before its action is dispatched, so an instance that
/// loses the compare-and-swap never sends the action. A dispatch that never
/// succeeds rolls the claim back and the event can be redelivered.
pub struct SagaOrchestrator<S, A, C, P>
where
    S: SagaStore,
    A: ActionInvoker,
    C: CompensationAdapter,
    P: EventPublisher,
{
    store: S,
    invoker: A,
    compensation: C,
    publisher: P,
    locks: SagaLocks,
    config: OrchestratorConfig,
}

impl<S, A, C, P> SagaOrchestrator<S, A, C, P>
where
    S: SagaStore,
    A: ActionInvoker,
    C: CompensationAdapter,
    P: EventPublisher,
{
    /// Creates an orchestrator with the default configuration.
    pub fn new(store: S, invoker: A, compensation: C, publisher: P) -> Self {
        Self::with_config(
            store,
            invoker,
            compensation,
            publisher,
            OrchestratorConfig::default(),
        )
    }

    /// Creates an orchestrator with an explicit configuration.
    pub fn with_config(
        store: S,
        invoker: A,
        compensation: C,
        publisher: P,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            compensation,
            publisher,
            locks: SagaLocks::new(config.lock_stripes),
            config,
        }
    }

    /// Returns the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Starts a saga for `order`.
    ///
    /// Fails with `AlreadyStarted` if the saga id is taken, and with
    /// `Dispatch` if inventory reservation could not be dispatched, in which
    /// case nothing is recorded and the caller may retry the whole start.
    #[tracing::instrument(skip(self, order), fields(saga_type = SAGA_TYPE, saga_id = %order.saga_id))]
    pub async fn start_saga(&self, order: OrderFacts) -> Result<SagaState> {
        let state = SagaState::start(order)?;
        let saga_id = state.saga_id().clone();
        let _guard = self.locks.lock(&saga_id).await;

        match self.store.insert(state.clone()).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(id)) => return Err(SagaError::AlreadyStarted(id)),
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = self
            .dispatch(SagaAction::InventoryReservation, &state)
            .await
        {
            if let Err(discard_err) = self.store.discard(&saga_id).await {
                error!(
                    saga_id = %saga_id,
                    error = %discard_err,
                    "could not discard saga whose first dispatch failed"
                );
            }
            return Err(err);
        }

        metrics::counter!("saga_started_total").increment(1);
        info!(
            customer_id = %state.customer_id(),
            product_id = %state.product_id(),
            quantity = state.quantity(),
            "saga started"
        );
        self.emit(SagaEventType::InventoryReservationInitiated, &state)
            .await;
        Ok(state)
    }

    /// Inventory was reserved: dispatch shipment generation.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_inventory_reserved(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        self.advance(
            saga_id,
            SagaTrigger::InventoryReserved,
            SagaAction::ShipmentGeneration,
        )
        .await
    }

    /// Inventory could not be reserved: the saga ends, nothing to roll back.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_inventory_reservation_failed(
        &self,
        saga_id: &SagaId,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.lock(saga_id).await;
        let trigger = SagaTrigger::InventoryReservationFailed;

        let (current, failed) = self.load_for(saga_id, trigger).await?;
        let previous = current.status();
        self.commit(&failed, previous, trigger).await?;
        self.emit(SagaEventType::InventoryReservationFailed, &failed)
            .await;

        Ok(outcome(previous, &failed))
    }

    /// A shipment was generated: dispatch the customer notification.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_shipping_generated(
        &self,
        saga_id: &SagaId,
        shipping_order_id: &str,
    ) -> Result<TransitionOutcome> {
        let outcome = self
            .advance(
                saga_id,
                SagaTrigger::ShippingGenerated,
                SagaAction::Notification,
            )
            .await?;
        info!(saga_id = %saga_id, shipping_order_id, "shipment recorded");
        Ok(outcome)
    }

    /// Shipment generation failed: release the reserved inventory.
    ///
    /// The saga settles in `COMPENSATED` or, if the release itself fails,
    /// in `FAILED` for an operator. Compensation is attempted exactly once;
    /// the settling write is retried on transient store errors.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_shipping_generation_failed(
        &self,
        saga_id: &SagaId,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.lock(saga_id).await;
        let trigger = SagaTrigger::ShippingGenerationFailed;

        let (current, failed) = self.load_for(saga_id, trigger).await?;
        let previous = current.status();
        self.commit(&failed, previous, trigger).await?;
        self.emit(SagaEventType::ShippingGenerationFailed, &failed)
            .await;

        let released = self.compensation.compensate_inventory(&failed).await;
        let settle = if released {
            SagaTrigger::CompensationSucceeded
        } else {
            SagaTrigger::CompensationFailed
        };

        let mut settled = failed.clone();
        settled.apply(settle)?;
        self.settle(&settled, failed.status(), settle).await?;

        if released {
            metrics::counter!("saga_compensated_total").increment(1);
            self.emit(SagaEventType::InventoryCompensated, &settled)
                .await;
        } else {
            self.emit(SagaEventType::InventoryCompensationFailed, &settled)
                .await;
            self.raise_alarm(&settled).await;
        }

        Ok(outcome(previous, &settled))
    }

    /// The customer was notified: the saga is complete.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_notification_sent(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        self.complete(saga_id, SagaTrigger::NotificationSent).await
    }

    /// Notification failed: the saga still completes.
    #[tracing::instrument(skip(self), fields(saga_type = SAGA_TYPE))]
    pub async fn on_notification_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        self.complete(saga_id, SagaTrigger::NotificationFailed)
            .await
    }

    /// Retrieves a saga by id.
    pub async fn get_saga(&self, saga_id: &SagaId) -> Result<SagaState> {
        self.store
            .get(saga_id)
            .await?
            .ok_or_else(|| SagaError::SagaNotFound(saga_id.clone()))
    }

    /// Lists the sagas currently in one of `statuses`, oldest update first.
    pub async fn sagas_with_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaState>> {
        Ok(self.store.find_by_status(statuses).await?)
    }

    /// Lists non-terminal sagas that have not moved for at least `older_than`.
    pub async fn stale_sagas(&self, older_than: Duration) -> Result<Vec<SagaState>> {
        let age = TimeDelta::from_std(older_than).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(Vec::new());
        };

        let open: Vec<SagaStatus> = SagaStatus::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .collect();

        Ok(self
            .store
            .find_by_status(&open)
            .await?
            .into_iter()
            .filter(|s| s.last_updated() <= cutoff)
            .collect())
    }

    /// Applies a forward transition whose follow-up is a dispatched action.
    async fn advance(
        &self,
        saga_id: &SagaId,
        trigger: SagaTrigger,
        action: SagaAction,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.lock(saga_id).await;

        let (current, next) = self.load_for(saga_id, trigger).await?;
        let previous = current.status();
        self.commit(&next, previous, trigger).await?;

        if let Err(err) = self.dispatch(action, &next).await {
            self.roll_back(&current, next.status()).await;
            return Err(err);
        }
        self.emit(action.initiated_event(), &next).await;

        Ok(outcome(previous, &next))
    }

    async fn complete(&self, saga_id: &SagaId, trigger: SagaTrigger) -> Result<TransitionOutcome> {
        let _guard = self.locks.lock(saga_id).await;

        let (current, completed) = self.load_for(saga_id, trigger).await?;
        let previous = current.status();
        self.commit(&completed, previous, trigger).await?;
        metrics::counter!("saga_completed_total").increment(1);
        self.emit(SagaEventType::SagaCompleted, &completed).await;

        Ok(outcome(previous, &completed))
    }

    /// Loads the saga and applies `trigger` to a copy of it.
    ///
    /// Returns the stored record and the advanced copy. Nothing is written.
    async fn load_for(
        &self,
        saga_id: &SagaId,
        trigger: SagaTrigger,
    ) -> Result<(SagaState, SagaState)> {
        let Some(current) = self.store.get(saga_id).await? else {
            warn!(saga_id = %saga_id, trigger = %trigger, "event for unknown saga");
            return Err(SagaError::SagaNotFound(saga_id.clone()));
        };

        let mut next = current.clone();
        if next.apply(trigger).is_err() {
            return Err(self.reject(saga_id, current.status(), trigger));
        }
        Ok((current, next))
    }

    /// Writes `next` if the stored status is still `expected`.
    async fn commit(
        &self,
        next: &SagaState,
        expected: SagaStatus,
        trigger: SagaTrigger,
    ) -> Result<()> {
        let written = self.store.compare_and_swap(next, expected).await;
        self.record(written, next, expected, trigger)
    }

    /// Writes the status a compensated saga settles in.
    ///
    /// Compensation has already run and is not repeated, so transient store
    /// errors are retried and a write that still fails raises an alarm.
    async fn settle(
        &self,
        settled: &SagaState,
        expected: SagaStatus,
        trigger: SagaTrigger,
    ) -> Result<()> {
        let written = (|| async { self.store.compare_and_swap(settled, expected).await })
            .retry(self.config.retry.backoff())
            .when(StoreError::is_transient)
            .notify(|err: &StoreError, delay: Duration| {
                warn!(
                    saga_id = %settled.saga_id(),
                    status = %settled.status(),
                    error = %err,
                    retry_in = ?delay,
                    "settling write failed, retrying"
                );
            })
            .await;

        if let Err(err) = &written {
            metrics::counter!("saga_settle_failures_total").increment(1);
            error!(
                alarm = true,
                saga_id = %settled.saga_id(),
                status = %settled.status(),
                error = %err,
                "compensation ran but the settled status could not be written"
            );
        }
        self.record(written, settled, expected, trigger)
    }

    /// Restores `current` after the claimed transition's dispatch failed.
    async fn roll_back(&self, current: &SagaState, claimed: SagaStatus) {
        match self.store.compare_and_swap(current, claimed).await {
            Ok(()) => {
                metrics::counter!("saga_rollbacks_total").increment(1);
                info!(
                    saga_id = %current.saga_id(),
                    from = %claimed,
                    status = %current.status(),
                    "claimed transition rolled back"
                );
            }
            Err(err) => {
                error!(
                    alarm = true,
                    saga_id = %current.saga_id(),
                    claimed = %claimed,
                    error = %err,
                    "could not roll back a transition whose dispatch failed"
                );
            }
        }
    }

    fn record(
        &self,
        written: std::result::Result<(), StoreError>,
        next: &SagaState,
        expected: SagaStatus,
        trigger: SagaTrigger,
    ) -> Result<()> {
        match written {
            Ok(()) => {
                metrics::counter!("saga_transitions_total", "to" => next.status().as_str())
                    .increment(1);
                info!(
                    saga_id = %next.saga_id(),
                    from = %expected,
                    status = %next.status(),
                    trigger = %trigger,
                    "saga transitioned"
                );
                Ok(())
            }
            Err(StoreError::Conflict { actual, .. }) => {
                Err(self.reject(next.saga_id(), actual, trigger))
            }
            Err(StoreError::NotFound(id)) => Err(SagaError::SagaNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Reports an event that does not fit the saga's current status.
    fn reject(&self, saga_id: &SagaId, from: SagaStatus, trigger: SagaTrigger) -> SagaError {
        metrics::counter!("saga_rejected_events_total", "trigger" => trigger.as_str())
            .increment(1);
        warn!(
            saga_id = %saga_id,
            status = %from,
            trigger = %trigger,
            "rejected event: not a valid transition from current status"
        );
        SagaError::InvalidTransition {
            saga_id: saga_id.clone(),
            from,
            trigger,
        }
    }

    /// Dispatches `action`, retrying transient failures with backoff.
    async fn dispatch(&self, action: SagaAction, state: &SagaState) -> Result<InvocationReceipt> {
        let timeout = self.config.dispatch_timeout;
        let started = Instant::now();

        let result = (|| async {
            match tokio::time::timeout(timeout, self.invoker.invoke(action, state)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout(timeout)),
            }
        })
        .retry(self.config.retry.backoff())
        .when(DispatchError::is_retryable)
        .notify(|err: &DispatchError, delay: Duration| {
            warn!(
                saga_id = %state.saga_id(),
                action = %action,
                error = %err,
                retry_in = ?delay,
                "dispatch failed, retrying"
            );
        })
        .await;

        metrics::histogram!("saga_dispatch_duration_seconds", "action" => action.as_str())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(receipt) => {
                debug!(
                    saga_id = %state.saga_id(),
                    action = %action,
                    request_id = %receipt.request_id,
                    "action dispatched"
                );
                Ok(receipt)
            }
            Err(source) => {
                metrics::counter!("saga_dispatch_failures_total", "action" => action.as_str())
                    .increment(1);
                error!(
                    saga_id = %state.saga_id(),
                    action = %action,
                    error = %source,
                    "dispatch failed, saga not advanced"
                );
                Err(SagaError::Dispatch {
                    saga_id: state.saga_id().clone(),
                    action,
                    source,
                })
            }
        }
    }

    /// Publishes an event for `state`. Failures are logged, never returned.
    async fn emit(&self, event_type: SagaEventType, state: &SagaState) {
        let event = match SagaDomainEvent::from_orchestrator(event_type, state) {
            Ok(event) => event,
            Err(err) => {
                warn!(saga_id = %state.saga_id(), event_type = %event_type, error = %err, "could not build event");
                return;
            }
        };

        if event_type.is_failure() {
            metrics::counter!("saga_failure_events_total", "event_type" => event_type.as_str())
                .increment(1);
        }

        match self.publisher.publish(&event).await {
            Ok(message_id) => {
                debug!(
                    saga_id = %state.saga_id(),
                    event_type = %event_type,
                    message_id = %message_id,
                    "event published"
                );
            }
            Err(err) => {
                metrics::counter!("saga_publish_failures_total", "event_type" => event_type.as_str())
                    .increment(1);
                warn!(
                    saga_id = %state.saga_id(),
                    event_type = %event_type,
                    error = %err,
                    "event publication failed"
                );
            }
        }
    }

    /// Surfaces a saga whose compensation failed.
    async fn raise_alarm(&self, state: &SagaState) {
        if !state.status().needs_operator() {
            return;
        }

        metrics::counter!("saga_compensation_failures_total").increment(1);
        error!(
            alarm = true,
            saga_id = %state.saga_id(),
            product_id = %state.product_id(),
            quantity = state.quantity(),
            "inventory compensation failed, saga needs manual intervention"
        );

        if self.config.failure_policy == CompensationFailurePolicy::Page {
            self.emit(SagaEventType::OperatorAlertRaised, state).await;
        }
    }
}

fn outcome(previous: SagaStatus, state: &SagaState) -> TransitionOutcome {
    TransitionOutcome {
        saga_id: state.saga_id().clone(),
        previous,
        status: state.status(),
    }
}

#[async_trait]
impl<S, A, C, P> SagaEventHandler for SagaOrchestrator<S, A, C, P>
where
    S: SagaStore,
    A: ActionInvoker,
    C: CompensationAdapter,
    P: EventPublisher,
{
    async fn start_saga(&self, order: OrderFacts) -> Result<SagaState> {
        SagaOrchestrator::start_saga(self, order).await
    }

    async fn on_inventory_reserved(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_inventory_reserved(self, saga_id).await
    }

    async fn on_inventory_reservation_failed(
        &self,
        saga_id: &SagaId,
    ) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_inventory_reservation_failed(self, saga_id).await
    }

    async fn on_shipping_generated(
        &self,
        saga_id: &SagaId,
        shipping_order_id: &str,
    ) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_shipping_generated(self, saga_id, shipping_order_id).await
    }

    async fn on_shipping_generation_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_shipping_generation_failed(self, saga_id).await
    }

    async fn on_notification_sent(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_notification_sent(self, saga_id).await
    }

    async fn on_notification_failed(&self, saga_id: &SagaId) -> Result<TransitionOutcome> {
        SagaOrchestrator::on_notification_failed(self, saga_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::services::{InMemoryActionInvoker, InMemoryCompensationAdapter, InMemoryEventPublisher};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use state_store::InMemorySagaStore;

    type TestOrchestrator = SagaOrchestrator<
        InMemorySagaStore,
        InMemoryActionInvoker,
        InMemoryCompensationAdapter,
        InMemoryEventPublisher,
    >;

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            dispatch_timeout: Duration::from_millis(200),
            ..OrchestratorConfig::default()
        }
    }

    fn setup_with(
        config: OrchestratorConfig,
    ) -> (
        TestOrchestrator,
        InMemorySagaStore,
        InMemoryActionInvoker,
        InMemoryCompensationAdapter,
        InMemoryEventPublisher,
    ) {
        let store = InMemorySagaStore::new();
        let invoker = InMemoryActionInvoker::new();
        let compensation = InMemoryCompensationAdapter::new();
        let publisher = InMemoryEventPublisher::new();

        let orchestrator = SagaOrchestrator::with_config(
            store.clone(),
            invoker.clone(),
            compensation.clone(),
            publisher.clone(),
            config,
        );

        (orchestrator, store, invoker, compensation, publisher)
    }

    fn setup() -> (
        TestOrchestrator,
        InMemorySagaStore,
        InMemoryActionInvoker,
        InMemoryCompensationAdapter,
        InMemoryEventPublisher,
    ) {
        setup_with(fast_config())
    }

    fn order(saga_id: &str) -> OrderFacts {
        OrderFacts::new(saga_id, "C1", "P1", 2)
    }

    /// Store whose writes from one status fail with a connection error.
    #[derive(Clone)]
    struct FlakyStore {
        inner: InMemorySagaStore,
        failing_from: SagaStatus,
        failures_remaining: Arc<AtomicUsize>,
    }

    impl FlakyStore {
        fn new(failing_from: SagaStatus, failures: usize) -> Self {
            Self {
                inner: InMemorySagaStore::new(),
                failing_from,
                failures_remaining: Arc::new(AtomicUsize::new(failures)),
            }
        }
    }

    #[async_trait]
    impl SagaStore for FlakyStore {
        async fn insert(&self, state: SagaState) -> state_store::Result<()> {
            self.inner.insert(state).await
        }

        async fn get(&self, saga_id: &SagaId) -> state_store::Result<Option<SagaState>> {
            self.inner.get(saga_id).await
        }

        async fn compare_and_swap(
            &self,
            state: &SagaState,
            expected: SagaStatus,
        ) -> state_store::Result<()> {
            let fail = expected == self.failing_from
                && self
                    .failures_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if fail {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.compare_and_swap(state, expected).await
        }

        async fn discard(&self, saga_id: &SagaId) -> state_store::Result<bool> {
            self.inner.discard(saga_id).await
        }

        async fn find_by_status(
            &self,
            statuses: &[SagaStatus],
        ) -> state_store::Result<Vec<SagaState>> {
            self.inner.find_by_status(statuses).await
        }
    }

    fn setup_flaky(
        store: FlakyStore,
    ) -> (
        SagaOrchestrator<
            FlakyStore,
            InMemoryActionInvoker,
            InMemoryCompensationAdapter,
            InMemoryEventPublisher,
        >,
        InMemoryCompensationAdapter,
        InMemoryEventPublisher,
    ) {
        let compensation = InMemoryCompensationAdapter::new();
        let publisher = InMemoryEventPublisher::new();
        let orchestrator = SagaOrchestrator::with_config(
            store,
            InMemoryActionInvoker::new(),
            compensation.clone(),
            publisher.clone(),
            fast_config(),
        );
        (orchestrator, compensation, publisher)
    }

    #[tokio::test]
    async fn test_start_records_and_dispatches() {
        let (orchestrator, store, invoker, _, publisher) = setup();

        let state = orchestrator.start_saga(order("S1")).await.unwrap();
        assert_eq!(state.status(), SagaStatus::Started);

        let stored = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::Started);
        assert_eq!(
            invoker.actions_for(&SagaId::new("S1")),
            vec![SagaAction::InventoryReservation]
        );
        assert_eq!(
            publisher.event_types(),
            vec![SagaEventType::InventoryReservationInitiated]
        );
    }

    #[tokio::test]
    async fn test_duplicate_start_is_rejected() {
        let (orchestrator, _, invoker, _, _) = setup();

        orchestrator.start_saga(order("S1")).await.unwrap();
        let result = orchestrator.start_saga(order("S1")).await;

        assert!(matches!(result, Err(SagaError::AlreadyStarted(_))));
        assert_eq!(invoker.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected() {
        let (orchestrator, store, invoker, _, _) = setup();

        let result = orchestrator
            .start_saga(OrderFacts::new("S1", "C1", "P1", 0))
            .await;

        assert!(matches!(result, Err(SagaError::InvalidOrder(_))));
        assert!(store.is_empty().await);
        assert_eq!(invoker.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_start_with_unreachable_backend_leaves_nothing() {
        let (orchestrator, store, invoker, _, publisher) = setup();
        invoker.set_unreachable(true);

        let result = orchestrator.start_saga(order("S1")).await;

        assert!(matches!(
            result,
            Err(SagaError::Dispatch {
                action: SagaAction::InventoryReservation,
                ..
            })
        ));
        assert!(store.is_empty().await);
        assert_eq!(invoker.attempt_count(), 3);
        assert_eq!(publisher.event_count(), 0);

        // The caller can retry the whole start once the backend is back.
        invoker.set_unreachable(false);
        assert!(orchestrator.start_saga(order("S1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_transient_dispatch_failure_is_retried() {
        let (orchestrator, _, invoker, _, _) = setup();
        invoker.fail_next(2);

        orchestrator.start_saga(order("S1")).await.unwrap();

        assert_eq!(invoker.attempt_count(), 3);
        assert_eq!(invoker.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_forward_dispatch_leaves_state_unchanged() {
        let (orchestrator, store, invoker, _, publisher) = setup();
        orchestrator.start_saga(order("S1")).await.unwrap();
        invoker.set_unreachable(true);

        let result = orchestrator.on_inventory_reserved(&SagaId::new("S1")).await;
        assert!(matches!(
            result,
            Err(SagaError::Dispatch {
                action: SagaAction::ShipmentGeneration,
                ..
            })
        ));

        let stored = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::Started);
        assert_eq!(publisher.event_count(), 1);

        // Redelivery succeeds once the backend recovers.
        invoker.set_unreachable(false);
        let outcome = orchestrator
            .on_inventory_reserved(&SagaId::new("S1"))
            .await
            .unwrap();
        assert_eq!(outcome.status, SagaStatus::InventoryReserved);
    }

    #[tokio::test]
    async fn test_unknown_saga_is_reported() {
        let (orchestrator, _, _, compensation, _) = setup();

        let result = orchestrator
            .on_shipping_generation_failed(&SagaId::new("missing"))
            .await;

        assert!(matches!(result, Err(SagaError::SagaNotFound(id)) if id.as_str() == "missing"));
        assert_eq!(compensation.compensation_calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_event_is_rejected() {
        let (orchestrator, store, invoker, _, _) = setup();
        orchestrator.start_saga(order("S1")).await.unwrap();

        let result = orchestrator
            .on_shipping_generated(&SagaId::new("S1"), "SHIP-1")
            .await;

        assert!(matches!(
            result,
            Err(SagaError::InvalidTransition {
                from: SagaStatus::Started,
                trigger: SagaTrigger::ShippingGenerated,
                ..
            })
        ));
        let stored = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::Started);
        assert_eq!(invoker.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_shipping_failure_compensates() {
        let (orchestrator, _, _, compensation, publisher) = setup();
        let id = SagaId::new("S3");
        orchestrator.start_saga(order("S3")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();

        let outcome = orchestrator.on_shipping_generation_failed(&id).await.unwrap();

        assert_eq!(outcome.previous, SagaStatus::InventoryReserved);
        assert_eq!(outcome.status, SagaStatus::Compensated);
        assert_eq!(compensation.compensated_sagas(), vec![id.clone()]);
        assert_eq!(
            publisher.event_types(),
            vec![
                SagaEventType::InventoryReservationInitiated,
                SagaEventType::ShippingGenerationInitiated,
                SagaEventType::ShippingGenerationFailed,
                SagaEventType::InventoryCompensated,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_compensation_under_manual_policy() {
        let (orchestrator, _, _, compensation, publisher) = setup();
        compensation.set_compensation_result(false);
        let id = SagaId::new("S3");
        orchestrator.start_saga(order("S3")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();

        let outcome = orchestrator.on_shipping_generation_failed(&id).await.unwrap();

        assert_eq!(outcome.status, SagaStatus::Failed);
        assert_eq!(compensation.compensation_calls(), 1);
        assert_eq!(publisher.count_of(SagaEventType::InventoryCompensationFailed), 1);
        assert_eq!(publisher.count_of(SagaEventType::OperatorAlertRaised), 0);
    }

    #[tokio::test]
    async fn test_failed_compensation_under_paging_policy() {
        let (orchestrator, _, _, compensation, publisher) = setup_with(OrchestratorConfig {
            failure_policy: CompensationFailurePolicy::Page,
            ..fast_config()
        });
        compensation.set_compensation_result(false);
        let id = SagaId::new("S3");
        orchestrator.start_saga(order("S3")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();

        orchestrator.on_shipping_generation_failed(&id).await.unwrap();

        assert_eq!(publisher.count_of(SagaEventType::OperatorAlertRaised), 1);
        assert_eq!(
            publisher.event_types().last(),
            Some(&SagaEventType::OperatorAlertRaised)
        );
    }

    #[tokio::test]
    async fn test_failed_notification_still_completes() {
        let (orchestrator, _, _, compensation, publisher) = setup();
        let id = SagaId::new("S1");
        orchestrator.start_saga(order("S1")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();
        orchestrator.on_shipping_generated(&id, "SHIP-1").await.unwrap();

        let outcome = orchestrator.on_notification_failed(&id).await.unwrap();

        assert_eq!(outcome.status, SagaStatus::Completed);
        assert_eq!(compensation.compensation_calls(), 0);
        assert_eq!(publisher.count_of(SagaEventType::SagaCompleted), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_transition() {
        let (orchestrator, store, _, _, publisher) = setup();
        publisher.set_fail_on_publish(true);

        orchestrator.start_saga(order("S1")).await.unwrap();
        orchestrator
            .on_inventory_reservation_failed(&SagaId::new("S1"))
            .await
            .unwrap();

        let stored = store.get(&SagaId::new("S1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::InventoryFailed);
    }

    #[tokio::test]
    async fn test_get_saga_and_status_queries() {
        let (orchestrator, _, _, _, _) = setup();
        orchestrator.start_saga(order("S1")).await.unwrap();
        orchestrator.start_saga(order("S2")).await.unwrap();
        orchestrator
            .on_inventory_reservation_failed(&SagaId::new("S2"))
            .await
            .unwrap();

        let saga = orchestrator.get_saga(&SagaId::new("S1")).await.unwrap();
        assert_eq!(saga.status(), SagaStatus::Started);
        assert!(matches!(
            orchestrator.get_saga(&SagaId::new("nope")).await,
            Err(SagaError::SagaNotFound(_))
        ));

        let failed = orchestrator
            .sagas_with_status(&[SagaStatus::InventoryFailed])
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].saga_id().as_str(), "S2");
    }

    #[tokio::test]
    async fn test_stale_sagas_skip_terminal_and_recent() {
        let (orchestrator, _, _, _, _) = setup();
        orchestrator.start_saga(order("S1")).await.unwrap();
        orchestrator.start_saga(order("S2")).await.unwrap();
        orchestrator
            .on_inventory_reservation_failed(&SagaId::new("S2"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let stale = orchestrator
            .stale_sagas(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].saga_id().as_str(), "S1");

        assert!(
            orchestrator
                .stale_sagas(Duration::from_secs(3600))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            orchestrator
                .stale_sagas(Duration::MAX)
                .await
                .unwrap()
                .is_empty()
        );
    }
    #[tokio::test]
    async fn test_lost_claim_is_rejected_with_stored_status() {
        let (orchestrator, store, _, _, _) = setup();
        let id = SagaId::new("S1");
        orchestrator.start_saga(order("S1")).await.unwrap();
        let (_, reserved) = orchestrator
            .load_for(&id, SagaTrigger::InventoryReserved)
            .await
            .unwrap();

        // Another writer moves the saga after it was loaded.
        orchestrator.on_inventory_reservation_failed(&id).await.unwrap();

        let result = orchestrator
            .commit(&reserved, SagaStatus::Started, SagaTrigger::InventoryReserved)
            .await;
        assert!(matches!(
            result,
            Err(SagaError::InvalidTransition {
                from: SagaStatus::InventoryFailed,
                trigger: SagaTrigger::InventoryReserved,
                ..
            })
        ));
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::InventoryFailed);
    }

    #[tokio::test]
    async fn test_failed_dispatch_rolls_back_claim() {
        let (orchestrator, store, invoker, _, _) = setup();
        let id = SagaId::new("S1");
        orchestrator.start_saga(order("S1")).await.unwrap();
        let before = store.get(&id).await.unwrap().unwrap();
        invoker.set_unreachable(true);

        assert!(orchestrator.on_inventory_reserved(&id).await.is_err());

        assert_eq!(store.get(&id).await.unwrap().unwrap(), before);
        // With the claim undone the failure outcome still applies.
        let outcome = orchestrator.on_inventory_reservation_failed(&id).await.unwrap();
        assert_eq!(outcome.status, SagaStatus::InventoryFailed);
    }

    #[tokio::test]
    async fn test_transient_settle_failure_is_retried() {
        let (orchestrator, compensation, publisher) =
            setup_flaky(FlakyStore::new(SagaStatus::ShippingFailed, 1));
        let id = SagaId::new("S3");
        orchestrator.start_saga(order("S3")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();

        let outcome = orchestrator.on_shipping_generation_failed(&id).await.unwrap();

        assert_eq!(outcome.status, SagaStatus::Compensated);
        assert_eq!(orchestrator.get_saga(&id).await.unwrap().status(), SagaStatus::Compensated);
        assert_eq!(compensation.compensation_calls(), 1);
        assert_eq!(publisher.count_of(SagaEventType::InventoryCompensated), 1);
    }

    #[tokio::test]
    async fn test_persistent_settle_failure_is_reported() {
        let (orchestrator, compensation, publisher) =
            setup_flaky(FlakyStore::new(SagaStatus::ShippingFailed, usize::MAX));
        let id = SagaId::new("S3");
        orchestrator.start_saga(order("S3")).await.unwrap();
        orchestrator.on_inventory_reserved(&id).await.unwrap();

        let result = orchestrator.on_shipping_generation_failed(&id).await;

        assert!(matches!(result, Err(SagaError::Store(_))));
        assert_eq!(compensation.compensation_calls(), 1);
        assert_eq!(publisher.count_of(SagaEventType::InventoryCompensated), 0);

        // The stuck saga is visible to operators.
        let stale = orchestrator.stale_sagas(Duration::ZERO).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status(), SagaStatus::ShippingFailed);
    }
}
