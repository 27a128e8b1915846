use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Wire form matches `as_str()` and the error messages ("in-transit", not
/// "InTransit"), so the API speaks one vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    Accepted,
    Started,
    InTransit,
    Arrived,
    Delivered,
    Rejected,
    Cancelled,
}

impl DeliveryStatus {
    /// Statuses during which the delivery occupies its driver and vehicle
    /// for conflict-checking purposes.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned
                | DeliveryStatus::Accepted
                | DeliveryStatus::Started
                | DeliveryStatus::InTransit
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Rejected | DeliveryStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::Started => "started",
            DeliveryStatus::InTransit => "in-transit",
            DeliveryStatus::Arrived => "arrived",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Rejected => "rejected",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pickup or drop-off point. Coordinates are supplied already resolved by
/// the caller; this engine never geocodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub address: String,
    pub coords: Option<GeoPoint>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Email doubles as the ownership key for live-update filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub description: String,
    pub weight_kg: f64,
    pub declared_value: Option<f64>,
    pub handling_instructions: Option<String>,
}

/// Snapshot of the assigned driver's public contact details, recorded at
/// assignment time so reads never need a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverContact {
    pub name: String,
    pub phone: String,
    pub vehicle_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub pickup: Stop,
    pub dropoff: Stop,
    pub customer: CustomerInfo,
    pub package: PackageInfo,
    pub priority: Priority,
    pub status: DeliveryStatus,
    /// Immutable once set by a successful assignment.
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub driver_contact: Option<DriverContact>,
    pub estimated_duration_minutes: Option<i64>,
    pub rejection_reason: Option<String>,
    pub delivery_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn new(
        pickup: Stop,
        dropoff: Stop,
        customer: CustomerInfo,
        package: PackageInfo,
        priority: Priority,
        estimated_duration_minutes: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pickup,
            dropoff,
            customer,
            package,
            priority,
            status: DeliveryStatus::Pending,
            driver_id: None,
            vehicle_id: None,
            driver_contact: None,
            estimated_duration_minutes,
            rejection_reason: None,
            delivery_notes: None,
            created_at: Utc::now(),
            assigned_at: None,
            accepted_at: None,
            started_at: None,
            arrived_at: None,
            delivered_at: None,
            rejected_at: None,
            cancelled_at: None,
        }
    }
}
