use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleType {
    Van,
    Truck,
    Motorcycle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleStatus {
    Available,
    InUse,
    Maintenance,
}

/// Fleet vehicle. Status is owned by the dispatch engine once the vehicle
/// is committed to a delivery; the admin status endpoint can override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub vehicle_type: VehicleType,
    pub capacity_kg: u32,
    pub status: VehicleStatus,
    pub assigned_driver: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
