//! HTTP surface for the order fulfillment saga orchestrator.
//!
//! Accepts saga starts and the outcome events of dispatched actions, exposes
//! saga queries for operators, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    ActionInvoker, BroadcastEventPublisher, CompensationAdapter, DynSagaOrchestrator,
    EventPublisher, EventSimulator, HttpActionInvoker, HttpCompensationAdapter,
    HttpEventPublisher, InMemoryActionInvoker, InMemoryCompensationAdapter,
    InMemoryEventPublisher, OrchestratorConfig, SagaOrchestrator, SimulatorConfig,
    remote::HttpInvokerConfig,
};
use state_store::{InMemorySagaStore, PostgresSagaStore, SagaStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Backend, Config};
use error::StartupError;
use routes::saga::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let events = Router::new()
        .route(
            "/inventory-reserved",
            post(routes::saga::inventory_reserved),
        )
        .route(
            "/inventory-reservation-failed",
            post(routes::saga::inventory_reservation_failed),
        )
        .route(
            "/shipping-generated",
            post(routes::saga::shipping_generated),
        )
        .route(
            "/shipping-generation-failed",
            post(routes::saga::shipping_generation_failed),
        )
        .route("/notification-sent", post(routes::saga::notification_sent))
        .route(
            "/notification-failed",
            post(routes::saga::notification_failed),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/saga", get(routes::saga::list))
        .route("/api/saga/start", post(routes::saga::start))
        .route("/api/saga/stale", get(routes::saga::stale))
        .route("/api/saga/{id}", get(routes::saga::get))
        .nest("/api/saga/events", events)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state with in-memory ports and no simulator.
///
/// Published events are recorded in the returned publisher.
pub fn create_default_state(config: OrchestratorConfig) -> (Arc<AppState>, InMemoryEventPublisher) {
    let publisher = InMemoryEventPublisher::new();
    let orchestrator = SagaOrchestrator::with_config(
        Arc::new(InMemorySagaStore::new()) as Arc<dyn SagaStore>,
        Arc::new(InMemoryActionInvoker::new()) as Arc<dyn ActionInvoker>,
        Arc::new(InMemoryCompensationAdapter::new()) as Arc<dyn CompensationAdapter>,
        Arc::new(publisher.clone()) as Arc<dyn EventPublisher>,
        config,
    );

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
    });
    (state, publisher)
}

/// Builds application state from configuration.
///
/// Selects the state store (`DATABASE_URL`) and the port backend. In mock
/// mode the event simulator is spawned on the current runtime when enabled.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let store: Arc<dyn SagaStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresSagaStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using Postgres state store");
            Arc::new(store)
        }
        None => {
            tracing::info!("using in-memory state store");
            Arc::new(InMemorySagaStore::new())
        }
    };

    let orchestrator_config = config.orchestrator();

    let state = match config.backend {
        Backend::Remote => {
            let invoker_config =
                HttpInvokerConfig::from_env()?.with_timeout(orchestrator_config.dispatch_timeout);
            let orchestrator: DynSagaOrchestrator = SagaOrchestrator::with_config(
                store,
                Arc::new(HttpActionInvoker::new(invoker_config)?) as Arc<dyn ActionInvoker>,
                Arc::new(HttpCompensationAdapter::from_env()?) as Arc<dyn CompensationAdapter>,
                Arc::new(HttpEventPublisher::from_env()?) as Arc<dyn EventPublisher>,
                orchestrator_config,
            );
            tracing::info!("using remote saga backend");
            AppState {
                orchestrator: Arc::new(orchestrator),
            }
        }
        Backend::Mock => {
            let topic = BroadcastEventPublisher::default();
            let services = Arc::new(InMemoryCompensationAdapter::new());
            let orchestrator: Arc<DynSagaOrchestrator> =
                Arc::new(SagaOrchestrator::with_config(
                    store,
                    Arc::new(InMemoryActionInvoker::new()) as Arc<dyn ActionInvoker>,
                    services.clone() as Arc<dyn CompensationAdapter>,
                    Arc::new(topic.clone()) as Arc<dyn EventPublisher>,
                    orchestrator_config,
                ));

            if config.simulator_enabled {
                EventSimulator::new(orchestrator.clone(), services, SimulatorConfig::default())
                    .spawn(topic.subscribe());
                tracing::info!("using mock saga backend with event simulator");
            } else {
                tracing::info!("using mock saga backend");
            }

            AppState { orchestrator }
        }
    };

    Ok(Arc::new(state))
}
