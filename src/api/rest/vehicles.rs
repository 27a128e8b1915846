use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", post(create_vehicle).get(list_vehicles))
        .route("/vehicles/:id", get(get_vehicle).delete(delete_vehicle))
        .route("/vehicles/:id/status", patch(override_vehicle_status))
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub vehicle_type: VehicleType,
    pub capacity_kg: u32,
}

#[derive(Deserialize)]
pub struct OverrideStatusRequest {
    pub status: VehicleStatus,
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    if payload.capacity_kg == 0 {
        return Err(AppError::BadRequest("capacity_kg must be > 0".to_string()));
    }

    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        vehicle_type: payload.vehicle_type,
        capacity_kg: payload.capacity_kg,
        status: VehicleStatus::Available,
        assigned_driver: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    state.vehicles.insert(vehicle.id, vehicle.clone());
    Ok(Json(vehicle))
}

async fn list_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<Vehicle>> {
    let vehicles = state
        .vehicles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(vehicles)
}

async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    let vehicle = state
        .vehicles
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    Ok(Json(vehicle.value().clone()))
}

/// Admin override. Routine status changes belong to the dispatch engine;
/// this endpoint exists for maintenance flags and manual correction.
async fn override_vehicle_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OverrideStatusRequest>,
) -> Result<Json<Vehicle>, AppError> {
    let mut vehicle = state
        .vehicles
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    vehicle.status = payload.status;
    vehicle.updated_at = Utc::now();

    Ok(Json(vehicle.clone()))
}

async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    let referenced = state.deliveries.iter().any(|entry| {
        let delivery = entry.value();
        delivery.status.is_active() && delivery.vehicle_id == Some(id)
    });
    if referenced {
        return Err(AppError::Conflict(format!(
            "vehicle {id} is committed to an active delivery"
        )));
    }

    let (_, vehicle) = state
        .vehicles
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    Ok(Json(vehicle))
}
