use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// Delivery driver. Available/Busy toggling belongs to the dispatch engine;
/// Offline is set by the driver or an admin and excludes the driver from
/// assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    pub status: DriverStatus,
    pub assigned_vehicle: Option<Uuid>,
    /// Running average, clamped to [0, 5].
    pub rating: f64,
    pub completed_trips: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
