use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use crate::models::delivery::{DeliveryStatus, GeoPoint};

/// Events fanned out to live subscribers. `channel` in the serialized form
/// names the pub/sub channel the event belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum RelayEvent {
    DriverLocation {
        driver_id: Uuid,
        delivery_id: Option<Uuid>,
        customer_email: Option<String>,
        position: GeoPoint,
        /// Straight-line distance to the drop-off, when its coordinates
        /// are known.
        remaining_km: Option<f64>,
        recorded_at: DateTime<Utc>,
    },
    DeliveryLocation {
        delivery_id: Uuid,
        customer_email: String,
        position: GeoPoint,
        recorded_at: DateTime<Utc>,
    },
    DeliveryStatusChanged {
        delivery_id: Uuid,
        customer_email: String,
        status: DeliveryStatus,
        occurred_at: DateTime<Utc>,
    },
    DriverAssigned {
        delivery_id: Uuid,
        customer_email: String,
        driver_id: Uuid,
        vehicle_id: Uuid,
        driver_name: String,
        occurred_at: DateTime<Utc>,
    },
    DeliveryCompleted {
        delivery_id: Uuid,
        customer_email: String,
        driver_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl RelayEvent {
    fn customer_email(&self) -> Option<&str> {
        match self {
            RelayEvent::DriverLocation { customer_email, .. } => customer_email.as_deref(),
            RelayEvent::DeliveryLocation { customer_email, .. }
            | RelayEvent::DeliveryStatusChanged { customer_email, .. }
            | RelayEvent::DriverAssigned { customer_email, .. }
            | RelayEvent::DeliveryCompleted { customer_email, .. } => Some(customer_email),
        }
    }
}

/// Narrows a subscription to the events the subscriber is entitled to see.
/// Drivers are publishers in this model, so there is no driver-keyed filter.
#[derive(Debug, Clone)]
pub enum RelayFilter {
    /// Dispatch view: every event.
    Dispatcher,
    /// Only events tagged with this customer's email.
    Customer(String),
}

impl RelayFilter {
    pub fn matches(&self, event: &RelayEvent) -> bool {
        match self {
            RelayFilter::Dispatcher => true,
            RelayFilter::Customer(email) => event.customer_email() == Some(email.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DriverPosition {
    pub position: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

/// Fan-out hub for live events. Holds no history: a subscriber that
/// connects after an event was published never receives it.
pub struct PositionRelay {
    events_tx: broadcast::Sender<RelayEvent>,
    positions: DashMap<Uuid, DriverPosition>,
}

impl PositionRelay {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            events_tx,
            positions: DashMap::new(),
        }
    }

    /// Publishes an event to all live subscribers. Driver positions are
    /// last-write-wins per driver: an event whose timestamp is not newer
    /// than the recorded one is dropped and `false` is returned. The
    /// compare-and-write happens under the driver's map entry guard, so
    /// updates for one driver apply in increasing-timestamp order while
    /// different drivers proceed in parallel.
    pub fn publish(&self, event: RelayEvent) -> bool {
        if let RelayEvent::DriverLocation {
            driver_id,
            position,
            recorded_at,
            ..
        } = &event
        {
            match self.positions.entry(*driver_id) {
                Entry::Occupied(mut slot) => {
                    if *recorded_at <= slot.get().recorded_at {
                        debug!(driver_id = %driver_id, "dropping stale position update");
                        return false;
                    }
                    slot.insert(DriverPosition {
                        position: *position,
                        recorded_at: *recorded_at,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(DriverPosition {
                        position: *position,
                        recorded_at: *recorded_at,
                    });
                }
            }
        }

        // Send fails only when no subscriber is connected; best-effort.
        let _ = self.events_tx.send(event);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events_tx.subscribe()
    }

    /// Subscription as a filtered stream. Lagged slots (subscriber slower
    /// than the buffer) are skipped, matching at-most-once delivery. The
    /// stream owns its receiver and filter, so it captures no lifetime and
    /// can outlive the relay handle it was created from.
    pub fn stream(&self, filter: RelayFilter) -> impl Stream<Item = RelayEvent> + use<> {
        BroadcastStream::new(self.events_tx.subscribe()).filter_map(move |item| {
            futures::future::ready(match item {
                Ok(event) if filter.matches(&event) => Some(event),
                _ => None,
            })
        })
    }

    pub fn last_position(&self, driver_id: Uuid) -> Option<DriverPosition> {
        self.positions.get(&driver_id).map(|slot| *slot.value())
    }
}
