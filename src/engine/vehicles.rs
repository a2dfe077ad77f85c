use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub number_plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub capacity: u32,
}

/// Registers a vehicle. Plates are compared uppercased and trimmed; the plate
/// is claimed through its index entry, so only one of two racing
/// registrations can win it.
pub fn register(state: &AppState, input: NewVehicle) -> Result<Vehicle, AppError> {
    if input.number_plate.trim().is_empty() {
        return Err(AppError::validation("numberPlate", "cannot be empty"));
    }
    if input.vehicle_type.trim().is_empty() {
        return Err(AppError::validation("type", "cannot be empty"));
    }
    if input.capacity == 0 {
        return Err(AppError::validation("capacity", "must be > 0"));
    }

    let number_plate = input.number_plate.trim().to_uppercase();
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        number_plate: number_plate.clone(),
        vehicle_type: input.vehicle_type.trim().to_string(),
        capacity: input.capacity,
        status: VehicleStatus::Available,
        updated_at: Utc::now(),
    };

    match state.vehicle_plates.entry(number_plate) {
        Entry::Occupied(taken) => {
            return Err(AppError::validation(
                "numberPlate",
                format!("{} is already registered", taken.key()),
            ));
        }
        Entry::Vacant(slot) => {
            slot.insert(vehicle.id);
            state.vehicles.insert(vehicle.id, vehicle.clone());
        }
    }

    info!(vehicle_id = %vehicle.id, number_plate = %vehicle.number_plate, "vehicle registered");
    Ok(vehicle)
}

pub fn list(state: &AppState) -> Vec<Vehicle> {
    let mut vehicles: Vec<Vehicle> = state
        .vehicles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    vehicles.sort_by(|a, b| a.number_plate.cmp(&b.number_plate));
    vehicles
}

pub fn set_status(state: &AppState, id: Uuid, status: VehicleStatus) -> Result<Vehicle, AppError> {
    let mut vehicle = state
        .vehicles
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("vehicle {id} not found")))?;

    vehicle.status = status;
    vehicle.updated_at = Utc::now();
    info!(vehicle_id = %id, status = ?status, "vehicle status set");

    Ok(vehicle.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::pricing::FareSchedule;

    fn van(plate: &str) -> NewVehicle {
        NewVehicle {
            number_plate: plate.to_string(),
            vehicle_type: "van".to_string(),
            capacity: 600,
        }
    }

    #[test]
    fn plates_are_normalized_and_unique() {
        let state = AppState::new(8, FareSchedule::default());

        let vehicle = register(&state, van("  dl-3c-4455 ")).unwrap();
        assert_eq!(vehicle.number_plate, "DL-3C-4455");
        assert_eq!(vehicle.status, VehicleStatus::Available);

        let err = register(&state, van("DL-3C-4455")).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "numberPlate"));
        assert_eq!(state.vehicles.len(), 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let state = AppState::new(8, FareSchedule::default());
        let mut input = van("HR-26-0001");
        input.capacity = 0;

        assert!(register(&state, input).is_err());
        assert!(state.vehicle_plates.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_registrations_claim_a_plate_once() {
        let state = Arc::new(AppState::new(8, FareSchedule::default()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                register(&state, van("KA-51-9999"))
            }));
        }

        let mut registered = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                registered += 1;
            }
        }

        assert_eq!(registered, 1);
        assert_eq!(state.vehicles.len(), 1);
    }

    #[test]
    fn status_update_on_unknown_vehicle_is_not_found() {
        let state = AppState::new(8, FareSchedule::default());
        let err = set_status(&state, Uuid::new_v4(), VehicleStatus::Maintenance).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
