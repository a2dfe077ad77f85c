use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    Assigned,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub number_plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub capacity: u32,
    pub status: VehicleStatus,
    pub updated_at: DateTime<Utc>,
}
