use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::engine::dispatch::AssignmentRequest;
use crate::models::delivery::Delivery;
use crate::models::driver::Driver;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;
use crate::relay::PositionRelay;

/// The entity store plus the service's moving parts. Constructed explicitly
/// and passed by `Arc`; tests build a fresh one each, never a global.
pub struct AppState {
    pub vehicles: DashMap<Uuid, Vehicle>,
    pub drivers: DashMap<Uuid, Driver>,
    pub deliveries: DashMap<Uuid, Delivery>,
    pub assignment_tx: mpsc::Sender<AssignmentRequest>,
    pub relay: PositionRelay,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        assignment_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<AssignmentRequest>) {
        let (assignment_tx, assignment_rx) = mpsc::channel(assignment_queue_size);

        (
            Self {
                vehicles: DashMap::new(),
                drivers: DashMap::new(),
                deliveries: DashMap::new(),
                assignment_tx,
                relay: PositionRelay::new(event_buffer_size),
                metrics: Metrics::new(),
            },
            assignment_rx,
        )
    }
}
