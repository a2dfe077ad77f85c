use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::conflict::Interval;
use crate::models::principal::{Principal, Role};
use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    OnRoute,
    Delivered,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::OnRoute => 1,
            DeliveryStatus::Delivered => 2,
        }
    }

    /// Status only moves forward; skipping `on_route` is allowed.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::OnRoute => "on_route",
            DeliveryStatus::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_coords: GeoPoint,
    pub drop_coords: GeoPoint,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub order_request_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub fare: f64,
    pub pickup_time: DateTime<Utc>,
    pub drop_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.pickup_time,
            end: self.drop_time,
        }
    }

    /// Admins see everything; drivers and customers only their own deliveries.
    pub fn visible_to(&self, principal: &Principal) -> bool {
        match principal.role {
            Role::Admin => true,
            Role::Driver => self.driver_id == principal.id,
            Role::Customer => self.customer_id == Some(principal.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus;

    #[test]
    fn status_only_advances() {
        assert!(DeliveryStatus::Pending.can_advance_to(DeliveryStatus::OnRoute));
        assert!(DeliveryStatus::Pending.can_advance_to(DeliveryStatus::Delivered));
        assert!(DeliveryStatus::OnRoute.can_advance_to(DeliveryStatus::Delivered));

        assert!(!DeliveryStatus::OnRoute.can_advance_to(DeliveryStatus::Pending));
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::OnRoute));
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::Delivered));
    }
}
