use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch::request_assignment;
use crate::engine::lifecycle::{apply_action, DeliveryAction};
use crate::error::AppError;
use crate::models::delivery::{CustomerInfo, Delivery, PackageInfo, Priority, Stop};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", post(assign_delivery))
        .route("/deliveries/:id/accept", post(accept_delivery))
        .route("/deliveries/:id/reject", post(reject_delivery))
        .route("/deliveries/:id/start", post(start_delivery))
        .route("/deliveries/:id/transit", post(mark_in_transit))
        .route("/deliveries/:id/arrive", post(mark_arrived))
        .route("/deliveries/:id/complete", post(complete_delivery))
        .route("/deliveries/:id/cancel", post(cancel_delivery))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub pickup: Stop,
    pub dropoff: Stop,
    pub customer: CustomerInfo,
    pub package: PackageInfo,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub estimated_duration_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
}

#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    pub notes: Option<String>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.customer.name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "customer name cannot be empty".to_string(),
        ));
    }
    if payload.customer.email.trim().is_empty() {
        return Err(AppError::BadRequest(
            "customer email cannot be empty".to_string(),
        ));
    }
    if payload.package.weight_kg <= 0.0 {
        return Err(AppError::BadRequest("weight_kg must be > 0".to_string()));
    }
    if matches!(payload.estimated_duration_minutes, Some(minutes) if minutes <= 0) {
        return Err(AppError::BadRequest(
            "estimated_duration_minutes must be > 0".to_string(),
        ));
    }

    let delivery = Delivery::new(
        payload.pickup,
        payload.dropoff,
        payload.customer,
        payload.package,
        payload.priority.unwrap_or(Priority::Normal),
        payload.estimated_duration_minutes,
    );

    state.deliveries.insert(delivery.id, delivery.clone());
    Ok(Json(delivery))
}

async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    let deliveries = state
        .deliveries
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(deliveries)
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(delivery.value().clone()))
}

/// The only entry point that attaches a driver and vehicle. Validation and
/// the pending -> assigned commit happen atomically inside the dispatch
/// engine; a validation failure mutates nothing and returns every violated
/// rule.
async fn assign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = request_assignment(&state, id, payload.driver_id, payload.vehicle_id).await?;
    Ok(Json(delivery))
}

async fn accept_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(apply_action(&state, id, DeliveryAction::Accept, None)?))
}

async fn reject_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<Delivery>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(apply_action(
        &state,
        id,
        DeliveryAction::Reject,
        reason,
    )?))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(apply_action(&state, id, DeliveryAction::Start, None)?))
}

async fn mark_in_transit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(apply_action(
        &state,
        id,
        DeliveryAction::MarkInTransit,
        None,
    )?))
}

async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(apply_action(
        &state,
        id,
        DeliveryAction::MarkArrived,
        None,
    )?))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Delivery>, AppError> {
    let notes = payload.and_then(|Json(body)| body.notes);
    Ok(Json(apply_action(
        &state,
        id,
        DeliveryAction::Complete,
        notes,
    )?))
}

async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(apply_action(&state, id, DeliveryAction::Cancel, None)?))
}
