use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order_request::OrderRequest;
use crate::models::tracking::GeoPoint;

/// Subscriber group for scoped broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Delivery(Uuid),
    OrderRequests,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Delivery(id) => write!(f, "delivery:{id}"),
            Room::OrderRequests => f.write_str("orderRequests"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub pickup_location: String,
    pub drop_location: String,
    pub distance_km: f64,
    pub scheduled_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDelivered {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub customer_name: String,
    pub fare: f64,
    pub route: RouteSummary,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPaid {
    pub delivery_id: Uuid,
    pub fare: f64,
    pub paid_at: DateTime<Utc>,
}

/// Live driver position. Coordinates are `None` when the ping carried
/// non-numeric values; the update is still relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLocationUpdate {
    pub delivery_id: Uuid,
    pub customer_id: Uuid,
    pub coords: GeoPoint,
    pub captured_at: DateTime<Utc>,
}

/// Closed catalog of events the bus carries. Serialized as
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    OrderRequestCreated(OrderRequest),
    OrderRequestStatusChanged(OrderRequest),
    DeliveryDelivered(DeliveryDelivered),
    DeliveryPaid(DeliveryPaid),
    LocationUpdate(LocationUpdate),
    CustomerLocationUpdate(CustomerLocationUpdate),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderRequestCreated(_) => "orderRequestCreated",
            Event::OrderRequestStatusChanged(_) => "orderRequestStatusChanged",
            Event::DeliveryDelivered(_) => "deliveryDelivered",
            Event::DeliveryPaid(_) => "deliveryPaid",
            Event::LocationUpdate(_) => "locationUpdate",
            Event::CustomerLocationUpdate(_) => "customerLocationUpdate",
        }
    }

    /// Sent to every connection, not only to members of its room.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Event::DeliveryDelivered(_))
    }

    /// The only room this event may be published to.
    pub fn room(&self) -> Room {
        match self {
            Event::OrderRequestCreated(_) | Event::OrderRequestStatusChanged(_) => {
                Room::OrderRequests
            }
            Event::DeliveryDelivered(payload) => Room::Delivery(payload.delivery_id),
            Event::DeliveryPaid(payload) => Room::Delivery(payload.delivery_id),
            Event::LocationUpdate(payload) => Room::Delivery(payload.delivery_id),
            Event::CustomerLocationUpdate(payload) => Room::Delivery(payload.delivery_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_name_envelope() {
        let delivery_id = Uuid::new_v4();
        let event = Event::DeliveryPaid(DeliveryPaid {
            delivery_id,
            fare: 12.5,
            paid_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "deliveryPaid");
        assert_eq!(json["data"]["deliveryId"], delivery_id.to_string());
        assert_eq!(json["event"], event.name());
    }

    #[test]
    fn delivery_events_route_to_their_own_room() {
        let delivery_id = Uuid::new_v4();
        let event = Event::LocationUpdate(LocationUpdate {
            delivery_id,
            driver_id: Uuid::new_v4(),
            lat: None,
            lng: None,
            captured_at: Utc::now(),
        });

        assert_eq!(event.room(), Room::Delivery(delivery_id));
        assert_eq!(event.room().to_string(), format!("delivery:{delivery_id}"));
    }
}
