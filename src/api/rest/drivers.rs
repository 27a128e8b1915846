use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::delivery::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::relay::{DriverPosition, RelayEvent};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route(
            "/drivers/:id/location",
            post(publish_driver_location).get(get_driver_location),
        )
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct LocationUpdateRequest {
    pub position: GeoPoint,
    /// Event time at the device; defaults to arrival time when absent.
    pub recorded_at: Option<DateTime<Utc>>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.license_number.trim().is_empty() {
        return Err(AppError::BadRequest(
            "license_number cannot be empty".to_string(),
        ));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        license_number: payload.license_number,
        status: DriverStatus::Available,
        assigned_vehicle: None,
        rating: payload.rating.unwrap_or(0.0).clamp(0.0, 5.0),
        completed_trips: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(driver.value().clone()))
}

/// Drivers and admins may only toggle Available/Offline here; Busy is set
/// by the dispatch engine when a delivery is assigned.
async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.status == DriverStatus::Busy {
        return Err(AppError::BadRequest(
            "busy is owned by the dispatch engine".to_string(),
        ));
    }

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.status = payload.status;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

/// Accepts a position report and relays it to subscribers. Out-of-order
/// reports (timestamp not newer than the recorded one) are dropped
/// silently; the response always carries the currently recorded position.
async fn publish_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationUpdateRequest>,
) -> Result<Json<DriverPosition>, AppError> {
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    // Tag the event with the driver's active delivery, if any, so customer
    // subscriptions can see it and the remaining distance can be reported.
    let active = state.deliveries.iter().find_map(|entry| {
        let delivery = entry.value();
        if delivery.status.is_active() && delivery.driver_id == Some(id) {
            Some((
                delivery.id,
                delivery.customer.email.clone(),
                delivery.dropoff.coords,
            ))
        } else {
            None
        }
    });

    let position = payload.position;
    let recorded_at = payload.recorded_at.unwrap_or_else(Utc::now);
    let remaining_km = active
        .as_ref()
        .and_then(|(_, _, dropoff)| dropoff.as_ref())
        .map(|dropoff| haversine_km(&position, dropoff));

    let event = RelayEvent::DriverLocation {
        driver_id: id,
        delivery_id: active.as_ref().map(|(delivery_id, _, _)| *delivery_id),
        customer_email: active.as_ref().map(|(_, email, _)| email.clone()),
        position,
        remaining_km,
        recorded_at,
    };

    if state.relay.publish(event) {
        // Echo the fix onto the delivery's own channel while a job is live.
        if let Some((delivery_id, customer_email, _)) = active {
            state.relay.publish(RelayEvent::DeliveryLocation {
                delivery_id,
                customer_email,
                position,
                recorded_at,
            });
        }
    } else {
        state.metrics.stale_position_drops.inc();
    }

    let current = state
        .relay
        .last_position(id)
        .ok_or_else(|| AppError::Internal(format!("no position recorded for driver {id}")))?;

    Ok(Json(current))
}

async fn get_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverPosition>, AppError> {
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound(format!("driver {id} not found")));
    }

    let position = state
        .relay
        .last_position(id)
        .ok_or_else(|| AppError::NotFound(format!("no position recorded for driver {id}")))?;

    Ok(Json(position))
}
