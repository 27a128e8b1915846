use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::models::delivery::Delivery;

/// Drivers need more turnaround slack than vehicles.
pub const DRIVER_BUFFER_MINUTES: i64 = 30;
pub const VEHICLE_BUFFER_MINUTES: i64 = 15;
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Driver,
    Vehicle,
}

impl ResourceKind {
    fn buffer(self) -> Duration {
        match self {
            ResourceKind::Driver => Duration::minutes(DRIVER_BUFFER_MINUTES),
            ResourceKind::Vehicle => Duration::minutes(VEHICLE_BUFFER_MINUTES),
        }
    }
}

/// Diagnostic detail for one colliding commitment.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConflict {
    pub delivery_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub estimated_duration_minutes: i64,
    pub customer_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<ScheduleConflict>,
}

/// Scans committed deliveries for time-window collisions with a proposed
/// start. Only deliveries in the active status set occupy their resources;
/// pending and finished ones never conflict. Each commitment occupies
/// `[anchor, anchor + duration]` with the duration defaulting to 60
/// minutes; the proposed instant expands by the per-kind buffer on both
/// sides. Policy: a delivery with no explicit pickup time anchors at its
/// creation timestamp, so an assigned-but-unscheduled job still blocks its
/// resources instead of escaping conflict detection.
///
/// `exclude` removes a delivery from its own scan when re-validating it.
pub fn check_availability(
    deliveries: &DashMap<Uuid, Delivery>,
    resource_id: Uuid,
    proposed_start: DateTime<Utc>,
    kind: ResourceKind,
    exclude: Option<Uuid>,
) -> AvailabilityReport {
    let buffer = kind.buffer();
    let proposed = (proposed_start - buffer, proposed_start + buffer);

    let conflicts: Vec<ScheduleConflict> = deliveries
        .iter()
        .filter_map(|entry| {
            let delivery = entry.value();
            if Some(delivery.id) == exclude || !delivery.status.is_active() {
                return None;
            }

            let committed = match kind {
                ResourceKind::Driver => delivery.driver_id,
                ResourceKind::Vehicle => delivery.vehicle_id,
            };
            if committed != Some(resource_id) {
                return None;
            }

            let anchor = delivery.pickup.scheduled_at.unwrap_or(delivery.created_at);
            let duration = delivery
                .estimated_duration_minutes
                .unwrap_or(DEFAULT_DURATION_MINUTES);
            let occupied = (anchor, anchor + Duration::minutes(duration));

            if overlaps(proposed, occupied) {
                Some(ScheduleConflict {
                    delivery_id: delivery.id,
                    scheduled_at: anchor,
                    estimated_duration_minutes: duration,
                    customer_name: delivery.customer.name.clone(),
                })
            } else {
                None
            }
        })
        .collect();

    AvailabilityReport {
        available: conflicts.is_empty(),
        conflicts,
    }
}

fn overlaps(a: (DateTime<Utc>, DateTime<Utc>), b: (DateTime<Utc>, DateTime<Utc>)) -> bool {
    a.0 < b.1 && b.0 < a.1
}
