use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareSchedule {
    pub base: f64,
    pub per_km: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base: 3.0,
            per_km: 1.5,
        }
    }
}

pub fn route_distance_km(pickup: &GeoPoint, drop: &GeoPoint) -> f64 {
    round2(haversine_km(pickup, drop))
}

pub fn compute_fare(schedule: &FareSchedule, pickup: &GeoPoint, drop: &GeoPoint) -> f64 {
    let distance_km = haversine_km(pickup, drop).max(0.0);
    round2(schedule.base + schedule.per_km * distance_km)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
