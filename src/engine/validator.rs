use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::availability::{check_availability, ResourceKind};
use crate::models::driver::DriverStatus;
use crate::models::vehicle::VehicleStatus;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ProposedAssignment {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub pickup_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Runs every assignment rule and collects all violations so the caller
/// sees the complete picture, not just the first failure. Performs no
/// mutation.
pub fn validate(
    state: &AppState,
    proposal: &ProposedAssignment,
    exclude: Option<Uuid>,
) -> ValidationReport {
    let mut errors = Vec::new();

    match state.drivers.get(&proposal.driver_id) {
        None => errors.push(format!("driver {} not found", proposal.driver_id)),
        Some(driver) if driver.status == DriverStatus::Offline => {
            errors.push(format!("driver {} is offline", driver.name));
        }
        Some(_) => {}
    }

    match state.vehicles.get(&proposal.vehicle_id) {
        None => errors.push(format!("vehicle {} not found", proposal.vehicle_id)),
        Some(vehicle) if vehicle.status == VehicleStatus::Maintenance => {
            errors.push(format!("vehicle {} is under maintenance", vehicle.id));
        }
        Some(_) => {}
    }

    let driver_report = check_availability(
        &state.deliveries,
        proposal.driver_id,
        proposal.pickup_at,
        ResourceKind::Driver,
        exclude,
    );
    for conflict in &driver_report.conflicts {
        errors.push(format!(
            "driver {} is committed to delivery {} at {} ({} min, customer {})",
            proposal.driver_id,
            conflict.delivery_id,
            conflict.scheduled_at.to_rfc3339(),
            conflict.estimated_duration_minutes,
            conflict.customer_name,
        ));
    }

    let vehicle_report = check_availability(
        &state.deliveries,
        proposal.vehicle_id,
        proposal.pickup_at,
        ResourceKind::Vehicle,
        exclude,
    );
    for conflict in &vehicle_report.conflicts {
        errors.push(format!(
            "vehicle {} is committed to delivery {} at {} ({} min, customer {})",
            proposal.vehicle_id,
            conflict.delivery_id,
            conflict.scheduled_at.to_rfc3339(),
            conflict.estimated_duration_minutes,
            conflict.customer_name,
        ));
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
