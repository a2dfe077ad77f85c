use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::conflict::{check_conflict, Interval, ResourceKey};
use crate::engine::pricing::compute_fare;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, PaymentStatus};
use crate::models::tracking::GeoPoint;
use crate::models::vehicle::VehicleStatus;
use crate::state::AppState;

/// Everything needed to book a driver and a vehicle for one window.
#[derive(Debug, Clone)]
pub struct DeliveryDraft {
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_coords: GeoPoint,
    pub drop_coords: GeoPoint,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub order_request_id: Option<Uuid>,
    pub interval: Interval,
}

/// Books the draft's driver and vehicle and stores the new delivery.
///
/// Both resource locks are held from the conflict scan until the insert, so
/// two overlapping drafts for the same driver or vehicle cannot both pass.
pub async fn schedule_delivery(state: &AppState, draft: DeliveryDraft) -> Result<Delivery, AppError> {
    draft.interval.validate()?;

    let driver = ResourceKey::driver(draft.driver_id);
    let vehicle = ResourceKey::vehicle(draft.vehicle_id);
    let _guards = state.resource_locks.lock_all(&[driver, vehicle]).await;

    {
        let vehicle_entry = state
            .vehicles
            .get(&draft.vehicle_id)
            .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", draft.vehicle_id)))?;
        if vehicle_entry.status == VehicleStatus::Maintenance {
            return Err(AppError::validation(
                "vehicleId",
                format!("vehicle {} is under maintenance", draft.vehicle_id),
            ));
        }
    }

    for resource in [driver, vehicle] {
        let bookings = state.bookings_for(resource);
        let check = check_conflict(resource, &draft.interval, &bookings)?;
        if let Err(err) = check.into_result() {
            state
                .metrics
                .scheduling_conflicts_total
                .with_label_values(&[&resource.kind.to_string()])
                .inc();
            warn!(
                resource = %resource,
                conflicting_delivery = ?check.conflicting_delivery,
                "scheduling conflict"
            );
            return Err(err);
        }
    }

    let delivery = Delivery {
        id: Uuid::new_v4(),
        fare: compute_fare(&state.fare, &draft.pickup_coords, &draft.drop_coords),
        pickup_location: draft.pickup_location,
        drop_location: draft.drop_location,
        pickup_coords: draft.pickup_coords,
        drop_coords: draft.drop_coords,
        driver_id: draft.driver_id,
        vehicle_id: draft.vehicle_id,
        customer_id: draft.customer_id,
        customer_name: draft.customer_name,
        order_request_id: draft.order_request_id,
        status: DeliveryStatus::Pending,
        payment_status: PaymentStatus::Pending,
        pickup_time: draft.interval.start,
        drop_time: draft.interval.end,
        created_at: Utc::now(),
        delivered_at: None,
        paid_at: None,
    };

    state.deliveries.insert(delivery.id, delivery.clone());

    if let Some(mut vehicle) = state.vehicles.get_mut(&delivery.vehicle_id) {
        vehicle.status = VehicleStatus::Assigned;
        vehicle.updated_at = Utc::now();
    }

    info!(
        delivery_id = %delivery.id,
        driver_id = %delivery.driver_id,
        vehicle_id = %delivery.vehicle_id,
        pickup_time = %delivery.pickup_time,
        drop_time = %delivery.drop_time,
        "delivery scheduled"
    );

    Ok(delivery)
}
