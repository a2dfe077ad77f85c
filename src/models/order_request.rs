use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub pickup_location: String,
    pub drop_location: String,
    pub vehicle_type: String,
    pub pickup_time: DateTime<Utc>,
    pub drop_time: Option<DateTime<Utc>>,
    pub pickup_coords: Option<GeoPoint>,
    pub drop_coords: Option<GeoPoint>,
    pub status: OrderRequestStatus,
    pub delivery_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OrderRequest {
    pub fn is_pending(&self) -> bool {
        self.status == OrderRequestStatus::Pending
    }
}
