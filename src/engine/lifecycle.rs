use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::relay::RelayEvent;
use crate::state::AppState;

/// Driver/admin actions on an existing delivery. Assignment is not an
/// action here; it goes through the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAction {
    Accept,
    Reject,
    Start,
    MarkInTransit,
    MarkArrived,
    Complete,
    Cancel,
}

impl DeliveryAction {
    pub fn name(self) -> &'static str {
        match self {
            DeliveryAction::Accept => "accept",
            DeliveryAction::Reject => "reject",
            DeliveryAction::Start => "start",
            DeliveryAction::MarkInTransit => "mark in-transit",
            DeliveryAction::MarkArrived => "mark arrived",
            DeliveryAction::Complete => "complete",
            DeliveryAction::Cancel => "cancel",
        }
    }

    /// The single source of truth for legal transitions. `None` means the
    /// action is not permitted from the current status.
    fn target(self, current: DeliveryStatus) -> Option<DeliveryStatus> {
        use DeliveryStatus::{
            Accepted, Arrived, Assigned, Cancelled, Delivered, InTransit, Rejected, Started,
        };

        match (current, self) {
            (Assigned, DeliveryAction::Accept) => Some(Accepted),
            (Assigned | Accepted, DeliveryAction::Reject) => Some(Rejected),
            (Accepted, DeliveryAction::Start) => Some(Started),
            (Started, DeliveryAction::MarkInTransit) => Some(InTransit),
            (InTransit, DeliveryAction::MarkArrived) => Some(Arrived),
            (Arrived, DeliveryAction::Complete) => Some(Delivered),
            (current, DeliveryAction::Cancel) if !current.is_terminal() => Some(Cancelled),
            _ => None,
        }
    }
}

/// Applies a lifecycle action to a delivery. The current-status check and
/// the write happen under the delivery's map entry guard, so concurrent
/// actions on the same record serialize and exactly one wins any given
/// transition; losers get `IllegalTransition` and mutate nothing.
pub fn apply_action(
    state: &AppState,
    delivery_id: Uuid,
    action: DeliveryAction,
    note: Option<String>,
) -> Result<Delivery, AppError> {
    let previous;
    let updated = {
        let mut entry = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;
        let delivery = entry.value_mut();

        let Some(next) = action.target(delivery.status) else {
            return Err(AppError::IllegalTransition {
                status: delivery.status,
                action: action.name(),
            });
        };

        previous = delivery.status;
        let now = Utc::now();
        delivery.status = next;
        match next {
            DeliveryStatus::Accepted => delivery.accepted_at = Some(now),
            DeliveryStatus::Started => delivery.started_at = Some(now),
            DeliveryStatus::Arrived => delivery.arrived_at = Some(now),
            DeliveryStatus::Delivered => {
                delivery.delivered_at = Some(now);
                delivery.delivery_notes = note;
            }
            DeliveryStatus::Rejected => {
                delivery.rejected_at = Some(now);
                delivery.rejection_reason = note;
            }
            DeliveryStatus::Cancelled => delivery.cancelled_at = Some(now),
            _ => {}
        }

        let updated = delivery.clone();

        // Published while the entry guard is still held: broadcast send is
        // synchronous, so subscribers observe one delivery's transitions in
        // commit order even when actions land back to back.
        state.relay.publish(RelayEvent::DeliveryStatusChanged {
            delivery_id: updated.id,
            customer_email: updated.customer.email.clone(),
            status: updated.status,
            occurred_at: now,
        });
        if updated.status == DeliveryStatus::Delivered {
            if let Some(driver_id) = updated.driver_id {
                state.relay.publish(RelayEvent::DeliveryCompleted {
                    delivery_id: updated.id,
                    customer_email: updated.customer.email.clone(),
                    driver_id,
                    occurred_at: now,
                });
            }
        }

        updated
    };

    // Only the one winning Arrived -> Delivered transition reaches this
    // increment; retries fail above and never re-count.
    if updated.status == DeliveryStatus::Delivered {
        if let Some(driver_id) = updated.driver_id {
            if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
                driver.completed_trips += 1;
                driver.updated_at = Utc::now();
            }
        }
    }

    if previous.is_active() && !updated.status.is_active() {
        state.metrics.active_deliveries.dec();
    }
    state
        .metrics
        .transitions_total
        .with_label_values(&[updated.status.as_str()])
        .inc();

    info!(
        delivery_id = %updated.id,
        from = %previous,
        to = %updated.status,
        "delivery transition applied"
    );

    Ok(updated)
}
