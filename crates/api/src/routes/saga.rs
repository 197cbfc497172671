//! Saga start, inbound event and query endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::SagaId;
use domain::{OrderFacts, SagaState, SagaStatus};
use saga::{DynSagaOrchestrator, TransitionOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Age after which a non-terminal saga is listed as stale by default.
const DEFAULT_STALE_SECS: u64 = 300;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Arc<DynSagaOrchestrator>,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSagaRequest {
    pub saga_id: Option<String>,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaEventRequest {
    pub saga_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingGeneratedRequest {
    pub saga_id: String,
    pub shipping_order_id: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    /// Comma-separated statuses, e.g. `FAILED,SHIPPING_FAILED`.
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleQuery {
    pub older_than_secs: Option<u64>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSagaResponse {
    pub saga_id: SagaId,
    pub status: SagaStatus,
}

// -- Handlers --

/// POST /api/saga/start — records a saga and dispatches inventory reservation.
#[tracing::instrument(skip(state, req))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSagaRequest>,
) -> Result<(StatusCode, Json<StartSagaResponse>), ApiError> {
    let saga_id = req
        .saga_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let order = OrderFacts::new(saga_id, req.customer_id, req.product_id, req.quantity);
    let saga = state.orchestrator.start_saga(order).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSagaResponse {
            saga_id: saga.saga_id().clone(),
            status: saga.status(),
        }),
    ))
}

/// POST /api/saga/events/inventory-reserved
#[tracing::instrument(skip(state, req))]
pub async fn inventory_reserved(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SagaEventRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_inventory_reserved(&SagaId::new(req.saga_id))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/saga/events/inventory-reservation-failed
#[tracing::instrument(skip(state, req))]
pub async fn inventory_reservation_failed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SagaEventRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_inventory_reservation_failed(&SagaId::new(req.saga_id))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/saga/events/shipping-generated
#[tracing::instrument(skip(state, req))]
pub async fn shipping_generated(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShippingGeneratedRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_shipping_generated(&SagaId::new(req.saga_id), &req.shipping_order_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/saga/events/shipping-generation-failed
#[tracing::instrument(skip(state, req))]
pub async fn shipping_generation_failed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SagaEventRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_shipping_generation_failed(&SagaId::new(req.saga_id))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/saga/events/notification-sent
#[tracing::instrument(skip(state, req))]
pub async fn notification_sent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SagaEventRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_notification_sent(&SagaId::new(req.saga_id))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/saga/events/notification-failed
#[tracing::instrument(skip(state, req))]
pub async fn notification_failed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SagaEventRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_notification_failed(&SagaId::new(req.saga_id))
        .await?;
    Ok(Json(outcome))
}

/// GET /api/saga/{id} — returns the saga state.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaState>, ApiError> {
    let saga = state.orchestrator.get_saga(&SagaId::new(id)).await?;
    Ok(Json(saga))
}

/// GET /api/saga?status=... — lists sagas, all of them when no status is given.
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SagaState>>, ApiError> {
    let statuses = match query.status.as_deref() {
        Some(raw) => parse_statuses(raw)?,
        None => SagaStatus::ALL.to_vec(),
    };

    let sagas = state.orchestrator.sagas_with_status(&statuses).await?;
    Ok(Json(sagas))
}

/// GET /api/saga/stale?olderThanSecs=N — lists non-terminal sagas that stopped moving.
#[tracing::instrument(skip(state, query))]
pub async fn stale(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<Vec<SagaState>>, ApiError> {
    let older_than = Duration::from_secs(query.older_than_secs.unwrap_or(DEFAULT_STALE_SECS));
    let sagas = state.orchestrator.stale_sagas(older_than).await?;
    Ok(Json(sagas))
}

fn parse_statuses(raw: &str) -> Result<Vec<SagaStatus>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SagaStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .collect()
}
