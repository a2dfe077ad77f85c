use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::delivery::{DeliveryStatus, PaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverDuration {
    pub driver_id: Uuid,
    pub deliveries: usize,
    pub average_minutes: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleUtilization {
    pub vehicle_id: Uuid,
    pub number_plate: Option<String>,
    pub deliveries: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Revenue {
    pub paid_deliveries: usize,
    pub total: f64,
}

/// Average scheduled window per driver, over delivered deliveries only.
pub fn driver_durations(state: &AppState) -> Vec<DriverDuration> {
    let mut totals: HashMap<Uuid, (usize, f64)> = HashMap::new();

    for entry in state.deliveries.iter() {
        let delivery = entry.value();
        if delivery.status != DeliveryStatus::Delivered {
            continue;
        }
        let slot = totals.entry(delivery.driver_id).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += delivery.interval().minutes();
    }

    let mut report: Vec<DriverDuration> = totals
        .into_iter()
        .map(|(driver_id, (deliveries, minutes))| DriverDuration {
            driver_id,
            deliveries,
            average_minutes: minutes / deliveries as f64,
        })
        .collect();

    report.sort_by_key(|row| row.driver_id);
    report
}

/// Deliveries booked per vehicle, busiest first.
pub fn vehicle_utilization(state: &AppState) -> Vec<VehicleUtilization> {
    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for entry in state.deliveries.iter() {
        *counts.entry(entry.value().vehicle_id).or_insert(0) += 1;
    }

    let mut report: Vec<VehicleUtilization> = counts
        .into_iter()
        .map(|(vehicle_id, deliveries)| VehicleUtilization {
            vehicle_id,
            number_plate: state
                .vehicles
                .get(&vehicle_id)
                .map(|vehicle| vehicle.number_plate.clone()),
            deliveries,
        })
        .collect();

    report.sort_by(|a, b| {
        b.deliveries
            .cmp(&a.deliveries)
            .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
    });
    report
}

pub fn revenue(state: &AppState) -> Revenue {
    let (paid_deliveries, total) = state
        .deliveries
        .iter()
        .filter(|entry| entry.value().payment_status == PaymentStatus::Paid)
        .fold((0, 0.0), |(count, sum), entry| (count + 1, sum + entry.value().fare));

    Revenue {
        paid_deliveries,
        total: (total * 100.0).round() / 100.0,
    }
}
