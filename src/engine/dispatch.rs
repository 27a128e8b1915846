use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::validator::{validate, ProposedAssignment};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, DriverContact};
use crate::models::driver::DriverStatus;
use crate::models::vehicle::VehicleStatus;
use crate::relay::RelayEvent;
use crate::state::AppState;

pub struct AssignmentRequest {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    reply: oneshot::Sender<Result<Delivery, AppError>>,
}

/// Submits an assignment to the dispatch engine and waits for the outcome.
/// Every request funnels through the single consumer task, so the
/// validate-then-commit sequence can never interleave with another
/// assignment and double-book a resource.
pub async fn request_assignment(
    state: &AppState,
    delivery_id: Uuid,
    driver_id: Uuid,
    vehicle_id: Uuid,
) -> Result<Delivery, AppError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .assignment_tx
        .send(AssignmentRequest {
            delivery_id,
            driver_id,
            vehicle_id,
            reply: reply_tx,
        })
        .await
        .map_err(|err| AppError::Internal(format!("dispatch queue send failed: {err}")))?;

    reply_rx
        .await
        .map_err(|err| AppError::Internal(format!("dispatch engine dropped request: {err}")))?
}

pub async fn run_dispatch_engine(
    state: Arc<AppState>,
    mut request_rx: mpsc::Receiver<AssignmentRequest>,
) {
    info!("dispatch engine started");

    while let Some(request) = request_rx.recv().await {
        let start = Instant::now();
        let result = process_assignment(&state, &request);

        let outcome = if result.is_ok() { "success" } else { "error" };
        let elapsed = start.elapsed().as_secs_f64();
        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        state
            .metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();

        if let Err(err) = &result {
            warn!(delivery_id = %request.delivery_id, error = %err, "assignment rejected");
        }
        if request.reply.send(result).is_err() {
            warn!(
                delivery_id = %request.delivery_id,
                "assignment caller went away before the reply"
            );
        }
    }

    warn!("dispatch engine stopped: request channel closed");
}

/// Validates and, only if every rule passes, commits the
/// pending -> assigned transition plus the resource flips. On any failure
/// nothing is mutated.
fn process_assignment(
    state: &AppState,
    request: &AssignmentRequest,
) -> Result<Delivery, AppError> {
    let pickup_at = {
        let delivery = state.deliveries.get(&request.delivery_id).ok_or_else(|| {
            AppError::NotFound(format!("delivery {} not found", request.delivery_id))
        })?;
        if delivery.status != DeliveryStatus::Pending {
            return Err(AppError::IllegalTransition {
                status: delivery.status,
                action: "assign",
            });
        }
        delivery.pickup.scheduled_at.unwrap_or(delivery.created_at)
    };

    let proposal = ProposedAssignment {
        delivery_id: request.delivery_id,
        driver_id: request.driver_id,
        vehicle_id: request.vehicle_id,
        pickup_at,
    };

    let report = validate(state, &proposal, Some(request.delivery_id));
    if !report.valid {
        return Err(AppError::Validation(report.errors));
    }

    commit_assignment(state, &proposal)
}

fn commit_assignment(state: &AppState, proposal: &ProposedAssignment) -> Result<Delivery, AppError> {
    let now = Utc::now();

    let (contact, driver_name) = {
        let driver = state.drivers.get(&proposal.driver_id).ok_or_else(|| {
            AppError::NotFound(format!("driver {} not found", proposal.driver_id))
        })?;
        (
            DriverContact {
                name: driver.name.clone(),
                phone: driver.phone.clone(),
                vehicle_id: proposal.vehicle_id,
            },
            driver.name.clone(),
        )
    };

    let updated = {
        let mut entry = state
            .deliveries
            .get_mut(&proposal.delivery_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("delivery {} not found", proposal.delivery_id))
            })?;
        let delivery = entry.value_mut();

        // Lifecycle actions do not pass through this engine, so the status
        // may have moved (e.g. a cancel) since the pre-validation read.
        // Re-check under the entry guard; a terminal delivery must never
        // come back as assigned.
        if delivery.status != DeliveryStatus::Pending {
            return Err(AppError::IllegalTransition {
                status: delivery.status,
                action: "assign",
            });
        }

        delivery.status = DeliveryStatus::Assigned;
        delivery.driver_id = Some(proposal.driver_id);
        delivery.vehicle_id = Some(proposal.vehicle_id);
        delivery.driver_contact = Some(contact);
        delivery.assigned_at = Some(now);
        let updated = delivery.clone();

        // Published under the guard so subscribers see this delivery's
        // events in commit order.
        state.relay.publish(RelayEvent::DriverAssigned {
            delivery_id: updated.id,
            customer_email: updated.customer.email.clone(),
            driver_id: proposal.driver_id,
            vehicle_id: proposal.vehicle_id,
            driver_name,
            occurred_at: now,
        });

        updated
    };

    if let Some(mut driver) = state.drivers.get_mut(&proposal.driver_id) {
        driver.status = DriverStatus::Busy;
        driver.assigned_vehicle = Some(proposal.vehicle_id);
        driver.updated_at = now;
    }
    if let Some(mut vehicle) = state.vehicles.get_mut(&proposal.vehicle_id) {
        vehicle.status = VehicleStatus::InUse;
        vehicle.assigned_driver = Some(proposal.driver_id);
        vehicle.updated_at = now;
    }

    state.metrics.active_deliveries.inc();
    state
        .metrics
        .transitions_total
        .with_label_values(&[DeliveryStatus::Assigned.as_str()])
        .inc();

    info!(
        delivery_id = %updated.id,
        driver_id = %proposal.driver_id,
        vehicle_id = %proposal.vehicle_id,
        "delivery assigned"
    );

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    use super::{process_assignment, AssignmentRequest};
    use crate::error::AppError;
    use crate::models::delivery::{
        CustomerInfo, Delivery, DeliveryStatus, PackageInfo, Priority, Stop,
    };
    use crate::models::driver::{Driver, DriverStatus};
    use crate::models::vehicle::{Vehicle, VehicleStatus, VehicleType};
    use crate::state::AppState;

    fn seeded_state() -> (AppState, Uuid, Uuid, Uuid) {
        let (state, _rx) = AppState::new(8, 8);

        let driver = Driver {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: "555-0101".to_string(),
            license_number: "D-4411".to_string(),
            status: DriverStatus::Available,
            assigned_vehicle: None,
            rating: 4.6,
            completed_trips: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            vehicle_type: VehicleType::Van,
            capacity_kg: 800,
            status: VehicleStatus::Available,
            assigned_driver: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let delivery = Delivery::new(
            Stop {
                address: "12 Dock Rd".to_string(),
                coords: None,
                scheduled_at: Some(Utc::now()),
            },
            Stop {
                address: "3 Hill St".to_string(),
                coords: None,
                scheduled_at: None,
            },
            CustomerInfo {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: "555-0100".to_string(),
            },
            PackageInfo {
                description: "crate of parts".to_string(),
                weight_kg: 4.0,
                declared_value: None,
                handling_instructions: None,
            },
            Priority::Normal,
            None,
        );

        let ids = (driver.id, vehicle.id, delivery.id);
        state.drivers.insert(driver.id, driver);
        state.vehicles.insert(vehicle.id, vehicle);
        state.deliveries.insert(delivery.id, delivery);
        (state, ids.0, ids.1, ids.2)
    }

    fn request(delivery_id: Uuid, driver_id: Uuid, vehicle_id: Uuid) -> AssignmentRequest {
        let (reply, _rx) = oneshot::channel();
        AssignmentRequest {
            delivery_id,
            driver_id,
            vehicle_id,
            reply,
        }
    }

    #[test]
    fn successful_assignment_flips_both_resources() {
        let (state, driver_id, vehicle_id, delivery_id) = seeded_state();

        let assigned =
            process_assignment(&state, &request(delivery_id, driver_id, vehicle_id)).unwrap();

        assert_eq!(assigned.status, DeliveryStatus::Assigned);
        assert_eq!(assigned.driver_id, Some(driver_id));
        assert_eq!(assigned.vehicle_id, Some(vehicle_id));
        let contact = assigned.driver_contact.unwrap();
        assert_eq!(contact.name, "Alice");
        assert_eq!(contact.vehicle_id, vehicle_id);

        assert_eq!(
            state.drivers.get(&driver_id).unwrap().status,
            DriverStatus::Busy
        );
        assert_eq!(
            state.vehicles.get(&vehicle_id).unwrap().status,
            VehicleStatus::InUse
        );
    }

    #[test]
    fn assigning_a_non_pending_delivery_is_illegal() {
        let (state, driver_id, vehicle_id, delivery_id) = seeded_state();

        process_assignment(&state, &request(delivery_id, driver_id, vehicle_id)).unwrap();
        let err = process_assignment(&state, &request(delivery_id, driver_id, vehicle_id))
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::IllegalTransition {
                status: DeliveryStatus::Assigned,
                ..
            }
        ));
    }

    #[test]
    fn cancel_landing_after_validation_cannot_resurrect_the_delivery() {
        let (state, driver_id, vehicle_id, delivery_id) = seeded_state();

        // A cancel slips in after the engine's pre-validation read. The
        // commit must notice the status moved and refuse.
        crate::engine::lifecycle::apply_action(
            &state,
            delivery_id,
            crate::engine::lifecycle::DeliveryAction::Cancel,
            None,
        )
        .unwrap();

        let stale_proposal = crate::engine::validator::ProposedAssignment {
            delivery_id,
            driver_id,
            vehicle_id,
            pickup_at: Utc::now(),
        };
        let err = super::commit_assignment(&state, &stale_proposal).unwrap_err();
        assert!(matches!(
            err,
            AppError::IllegalTransition {
                status: DeliveryStatus::Cancelled,
                ..
            }
        ));

        let delivery = state.deliveries.get(&delivery_id).unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Cancelled);
        assert!(delivery.driver_id.is_none());
    }

    #[test]
    fn validation_failure_mutates_nothing() {
        let (state, driver_id, vehicle_id, delivery_id) = seeded_state();
        state.drivers.get_mut(&driver_id).unwrap().status = DriverStatus::Offline;

        let err = process_assignment(&state, &request(delivery_id, driver_id, vehicle_id))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let delivery = state.deliveries.get(&delivery_id).unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert!(delivery.driver_id.is_none());
        assert_eq!(
            state.vehicles.get(&vehicle_id).unwrap().status,
            VehicleStatus::Available
        );
    }
}
