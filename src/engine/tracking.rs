use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::catalog::{CustomerLocationUpdate, Event, LocationUpdate};
use crate::models::delivery::Delivery;
use crate::models::tracking::{GeoPoint, TrackingSample};
use crate::state::AppState;

/// Appends one sample to the delivery's series. Coordinates must be finite.
pub fn record(
    state: &AppState,
    delivery_id: Uuid,
    driver_id: Uuid,
    coords: GeoPoint,
) -> Result<TrackingSample, AppError> {
    if !coords.is_finite() {
        return Err(AppError::validation("coords", "lat and lng must be numeric"));
    }

    let sample = TrackingSample {
        delivery_id,
        driver_id,
        coords,
        captured_at: Utc::now(),
    };

    state
        .tracking
        .entry(delivery_id)
        .or_default()
        .push(sample.clone());

    Ok(sample)
}

pub fn latest(state: &AppState, delivery_id: Uuid) -> Option<TrackingSample> {
    state
        .tracking
        .get(&delivery_id)
        .and_then(|samples| samples.last().cloned())
}

/// Handles a `driverLocation` ping from `driver_id`.
///
/// The ping must name a delivery assigned to that driver. Once it does, it is
/// always relayed as `locationUpdate`; it is stored only when both coordinates
/// are numeric, and a failed store is only logged.
pub fn ingest_driver_location(
    state: &AppState,
    driver_id: Uuid,
    payload: &Value,
) -> Result<LocationUpdate, AppError> {
    let delivery_id = uuid_field(payload, "deliveryId")?
        .ok_or_else(|| AppError::validation("deliveryId", "is required"))?;
    if let Some(claimed) = uuid_field(payload, "driverId")? {
        if claimed != driver_id {
            return Err(AppError::Forbidden(
                "driverId does not match the connected driver".to_string(),
            ));
        }
    }
    authorize_delivery(state, delivery_id, |delivery| delivery.driver_id == driver_id)?;

    let lat = numeric_field(payload, "lat");
    let lng = numeric_field(payload, "lng");

    match (lat, lng) {
        (Some(lat), Some(lng)) => {
            match record(state, delivery_id, driver_id, GeoPoint { lat, lng }) {
                Ok(_) => {
                    state
                        .metrics
                        .tracking_samples_total
                        .with_label_values(&["stored"])
                        .inc();
                }
                Err(err) => {
                    state
                        .metrics
                        .tracking_samples_total
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(delivery_id = %delivery_id, error = %err, "failed to store tracking sample");
                }
            }
        }
        _ => {
            state
                .metrics
                .tracking_samples_total
                .with_label_values(&["skipped"])
                .inc();
            warn!(
                delivery_id = %delivery_id,
                has_lat = lat.is_some(),
                has_lng = lng.is_some(),
                "incomplete location ping; not stored"
            );
        }
    }

    let update = LocationUpdate {
        delivery_id,
        driver_id,
        lat,
        lng,
        captured_at: Utc::now(),
    };
    state.events.emit(Event::LocationUpdate(update.clone()));
    debug!(delivery_id = %delivery_id, "location relayed");

    Ok(update)
}

/// Handles a `customerLocation` ping. Relayed only, never stored.
pub fn relay_customer_location(
    state: &AppState,
    customer_id: Uuid,
    payload: &Value,
) -> Result<CustomerLocationUpdate, AppError> {
    let delivery_id = uuid_field(payload, "deliveryId")?
        .ok_or_else(|| AppError::validation("deliveryId", "is required"))?;
    let lat = numeric_field(payload, "lat")
        .ok_or_else(|| AppError::validation("lat", "must be numeric"))?;
    let lng = numeric_field(payload, "lng")
        .ok_or_else(|| AppError::validation("lng", "must be numeric"))?;
    authorize_delivery(state, delivery_id, |delivery| {
        delivery.customer_id == Some(customer_id)
    })?;

    let update = CustomerLocationUpdate {
        delivery_id,
        customer_id,
        coords: GeoPoint { lat, lng },
        captured_at: Utc::now(),
    };
    state
        .events
        .emit(Event::CustomerLocationUpdate(update.clone()));

    Ok(update)
}

fn authorize_delivery<F>(state: &AppState, delivery_id: Uuid, allowed: F) -> Result<(), AppError>
where
    F: FnOnce(&Delivery) -> bool,
{
    let delivery = state
        .deliveries
        .get(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if allowed(&delivery) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "not a participant of delivery {delivery_id}"
        )))
    }
}

fn uuid_field(payload: &Value, field: &str) -> Result<Option<Uuid>, AppError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| AppError::validation(field, "must be a uuid")),
        Some(_) => Err(AppError::validation(field, "must be a uuid")),
    }
}

fn numeric_field(payload: &Value, field: &str) -> Option<f64> {
    payload
        .get(field)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::engine::pricing::FareSchedule;
    use crate::events::catalog::Room;
    use crate::models::delivery::{DeliveryStatus, PaymentStatus};

    struct Fixture {
        state: AppState,
        delivery_id: Uuid,
        driver_id: Uuid,
        customer_id: Uuid,
    }

    fn fixture() -> Fixture {
        let state = AppState::new(16, FareSchedule::default());
        let driver_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let point = GeoPoint {
            lat: 12.97,
            lng: 77.59,
        };
        let delivery = Delivery {
            id: Uuid::new_v4(),
            pickup_location: "Depot".to_string(),
            drop_location: "Market".to_string(),
            pickup_coords: point,
            drop_coords: point,
            driver_id,
            vehicle_id: Uuid::new_v4(),
            customer_id: Some(customer_id),
            customer_name: "Ravi".to_string(),
            order_request_id: None,
            status: DeliveryStatus::OnRoute,
            payment_status: PaymentStatus::Pending,
            fare: 3.0,
            pickup_time: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            drop_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            created_at: Utc::now(),
            delivered_at: None,
            paid_at: None,
        };
        let delivery_id = delivery.id;
        state.deliveries.insert(delivery_id, delivery);

        Fixture {
            state,
            delivery_id,
            driver_id,
            customer_id,
        }
    }

    #[tokio::test]
    async fn complete_ping_is_stored_and_relayed() {
        let f = fixture();
        let (watcher, mut rx) = f.state.events.connect();
        f.state
            .events
            .join(watcher, Room::Delivery(f.delivery_id))
            .unwrap();

        let update = ingest_driver_location(
            &f.state,
            f.driver_id,
            &json!({
                "deliveryId": f.delivery_id,
                "driverId": f.driver_id,
                "lat": 12.9716,
                "lng": 77.5946
            }),
        )
        .unwrap();

        assert_eq!(update.lat, Some(12.9716));
        let sample = latest(&f.state, f.delivery_id).unwrap();
        assert_eq!(sample.driver_id, f.driver_id);
        assert!(matches!(rx.recv().await, Some(Event::LocationUpdate(_))));
    }

    #[tokio::test]
    async fn non_numeric_lat_is_relayed_but_not_stored() {
        let f = fixture();
        let (watcher, mut rx) = f.state.events.connect();
        f.state
            .events
            .join(watcher, Room::Delivery(f.delivery_id))
            .unwrap();

        ingest_driver_location(
            &f.state,
            f.driver_id,
            &json!({
                "deliveryId": f.delivery_id,
                "lat": "north-ish",
                "lng": 77.5946
            }),
        )
        .unwrap();

        assert!(latest(&f.state, f.delivery_id).is_none());
        match rx.recv().await {
            Some(Event::LocationUpdate(update)) => {
                assert_eq!(update.delivery_id, f.delivery_id);
                assert_eq!(update.driver_id, f.driver_id);
                assert_eq!(update.lat, None);
                assert_eq!(update.lng, Some(77.5946));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ping_without_delivery_is_rejected() {
        let f = fixture();
        let err = ingest_driver_location(&f.state, f.driver_id, &json!({ "lat": 1.0, "lng": 2.0 }))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "deliveryId"));

        let err = ingest_driver_location(&f.state, f.driver_id, &json!({ "deliveryId": 42 }))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn pings_for_unknown_deliveries_leave_no_trace() {
        let f = fixture();
        let err = ingest_driver_location(
            &f.state,
            f.driver_id,
            &json!({ "deliveryId": Uuid::new_v4(), "lat": 1.0, "lng": 2.0 }),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(f.state.tracking.is_empty());
    }

    #[tokio::test]
    async fn foreign_driver_cannot_report_for_a_delivery() {
        let f = fixture();
        let (watcher, mut rx) = f.state.events.connect();
        f.state
            .events
            .join(watcher, Room::Delivery(f.delivery_id))
            .unwrap();
        let intruder = Uuid::new_v4();

        let err = ingest_driver_location(
            &f.state,
            intruder,
            &json!({ "deliveryId": f.delivery_id, "lat": 1.0, "lng": 2.0 }),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = ingest_driver_location(
            &f.state,
            intruder,
            &json!({
                "deliveryId": f.delivery_id,
                "driverId": f.driver_id,
                "lat": 1.0,
                "lng": 2.0
            }),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(f.state.tracking.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn samples_are_appended_in_arrival_order() {
        let f = fixture();

        record(&f.state, f.delivery_id, f.driver_id, GeoPoint { lat: 1.0, lng: 1.0 }).unwrap();
        record(&f.state, f.delivery_id, f.driver_id, GeoPoint { lat: 1.0, lng: 1.0 }).unwrap();
        record(&f.state, f.delivery_id, f.driver_id, GeoPoint { lat: 2.0, lng: 2.0 }).unwrap();

        assert_eq!(f.state.tracking.get(&f.delivery_id).unwrap().len(), 3);
        assert_eq!(latest(&f.state, f.delivery_id).unwrap().coords.lat, 2.0);
    }

    #[test]
    fn non_finite_coordinates_are_not_recorded() {
        let f = fixture();
        let result = record(
            &f.state,
            f.delivery_id,
            f.driver_id,
            GeoPoint {
                lat: f64::NAN,
                lng: 0.0,
            },
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn customer_location_is_relayed_not_stored() {
        let f = fixture();
        let (watcher, mut rx) = f.state.events.connect();
        f.state
            .events
            .join(watcher, Room::Delivery(f.delivery_id))
            .unwrap();

        relay_customer_location(
            &f.state,
            f.customer_id,
            &json!({ "deliveryId": f.delivery_id, "lat": 10.0, "lng": 20.0 }),
        )
        .unwrap();

        assert!(latest(&f.state, f.delivery_id).is_none());
        match rx.recv().await {
            Some(Event::CustomerLocationUpdate(update)) => {
                assert_eq!(update.customer_id, f.customer_id)
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(relay_customer_location(
            &f.state,
            f.customer_id,
            &json!({ "deliveryId": f.delivery_id, "lat": "x", "lng": 20.0 }),
        )
        .is_err());
    }

    #[test]
    fn other_customers_cannot_relay_into_a_delivery() {
        let f = fixture();
        let err = relay_customer_location(
            &f.state,
            Uuid::new_v4(),
            &json!({ "deliveryId": f.delivery_id, "lat": 10.0, "lng": 20.0 }),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
