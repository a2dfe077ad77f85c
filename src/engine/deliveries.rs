use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::conflict::Interval;
use crate::engine::pricing::route_distance_km;
use crate::engine::scheduler::{schedule_delivery, DeliveryDraft};
use crate::error::AppError;
use crate::events::catalog::{DeliveryDelivered, DeliveryPaid, Event, RouteSummary};
use crate::models::delivery::{Delivery, DeliveryStatus, PaymentStatus};
use crate::models::principal::Principal;
use crate::models::tracking::GeoPoint;
use crate::models::vehicle::VehicleStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_coords: GeoPoint,
    pub drop_coords: GeoPoint,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub pickup_time: DateTime<Utc>,
    pub drop_time: DateTime<Utc>,
}

pub async fn create(state: &AppState, input: NewDelivery) -> Result<Delivery, AppError> {
    for (field, value) in [
        ("pickupLocation", &input.pickup_location),
        ("dropLocation", &input.drop_location),
        ("customerName", &input.customer_name),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::validation(field, "cannot be empty"));
        }
    }
    if !input.pickup_coords.is_valid() {
        return Err(AppError::validation("pickupCoords", "out of range"));
    }
    if !input.drop_coords.is_valid() {
        return Err(AppError::validation("dropCoords", "out of range"));
    }

    let interval = Interval::new(input.pickup_time, input.drop_time)?;

    schedule_delivery(
        state,
        DeliveryDraft {
            pickup_location: input.pickup_location.trim().to_string(),
            drop_location: input.drop_location.trim().to_string(),
            pickup_coords: input.pickup_coords,
            drop_coords: input.drop_coords,
            driver_id: input.driver_id,
            vehicle_id: input.vehicle_id,
            customer_id: input.customer_id,
            customer_name: input.customer_name.trim().to_string(),
            order_request_id: None,
            interval,
        },
    )
    .await
}

/// Moves a delivery forward. Only its own driver may do this.
///
/// Reaching `delivered` frees the vehicle and emits `deliveryDelivered`
/// once; `delivered` is terminal so the event cannot repeat.
pub fn update_status(
    state: &AppState,
    driver_id: Uuid,
    delivery_id: Uuid,
    next: DeliveryStatus,
) -> Result<Delivery, AppError> {
    let updated = {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if delivery.driver_id != driver_id {
            return Err(AppError::Forbidden(format!(
                "delivery {delivery_id} is not assigned to this driver"
            )));
        }
        if !delivery.status.can_advance_to(next) {
            return Err(AppError::InvalidTransition {
                from: delivery.status.to_string(),
                to: next.to_string(),
            });
        }

        delivery.status = next;
        if next == DeliveryStatus::Delivered {
            delivery.delivered_at = Some(Utc::now());
        }
        delivery.clone()
    };

    info!(delivery_id = %delivery_id, status = %next, "delivery status updated");

    if next == DeliveryStatus::Delivered {
        release_vehicle(state, updated.vehicle_id);
        state.events.emit(Event::DeliveryDelivered(delivered_event(&updated)));
    }

    Ok(updated)
}

/// Called by the payment collaborator once the fare has been captured.
pub fn confirm_payment(state: &AppState, delivery_id: Uuid) -> Result<Delivery, AppError> {
    let updated = {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if delivery.payment_status == PaymentStatus::Paid {
            return Err(AppError::AlreadyProcessed(format!(
                "delivery {delivery_id} is already paid"
            )));
        }
        if delivery.status != DeliveryStatus::Delivered {
            return Err(AppError::InvalidTransition {
                from: delivery.status.to_string(),
                to: "paid".to_string(),
            });
        }

        delivery.payment_status = PaymentStatus::Paid;
        delivery.paid_at = Some(Utc::now());
        delivery.clone()
    };

    info!(delivery_id = %delivery_id, fare = updated.fare, "delivery paid");

    state.events.emit(Event::DeliveryPaid(DeliveryPaid {
        delivery_id,
        fare: updated.fare,
        paid_at: updated.paid_at.unwrap_or_else(Utc::now),
    }));

    Ok(updated)
}

pub fn list_for(state: &AppState, principal: &Principal) -> Vec<Delivery> {
    let mut deliveries: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|entry| entry.value().visible_to(principal))
        .map(|entry| entry.value().clone())
        .collect();

    deliveries.sort_by(|a, b| a.pickup_time.cmp(&b.pickup_time));
    deliveries
}

pub fn get_for(state: &AppState, principal: &Principal, delivery_id: Uuid) -> Result<Delivery, AppError> {
    let delivery = state
        .deliveries
        .get(&delivery_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if delivery.visible_to(principal) {
        Ok(delivery)
    } else {
        Err(AppError::Forbidden(format!(
            "delivery {delivery_id} belongs to someone else"
        )))
    }
}

fn release_vehicle(state: &AppState, vehicle_id: Uuid) {
    match state.vehicles.get_mut(&vehicle_id) {
        Some(mut vehicle) => {
            if vehicle.status == VehicleStatus::Assigned {
                vehicle.status = VehicleStatus::Available;
                vehicle.updated_at = Utc::now();
            }
        }
        None => warn!(vehicle_id = %vehicle_id, "delivered vehicle no longer exists"),
    }
}

fn delivered_event(delivery: &Delivery) -> DeliveryDelivered {
    DeliveryDelivered {
        delivery_id: delivery.id,
        driver_id: delivery.driver_id,
        customer_name: delivery.customer_name.clone(),
        fare: delivery.fare,
        route: RouteSummary {
            pickup_location: delivery.pickup_location.clone(),
            drop_location: delivery.drop_location.clone(),
            distance_km: route_distance_km(&delivery.pickup_coords, &delivery.drop_coords),
            scheduled_minutes: delivery.interval().minutes(),
        },
        delivered_at: delivery.delivered_at.unwrap_or_else(Utc::now),
    }
}
