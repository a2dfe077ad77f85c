use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::reports::{self, DriverDuration, Revenue, VehicleUtilization};
use crate::error::AppError;
use crate::models::principal::{Principal, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reports/driver-durations", get(driver_durations))
        .route("/reports/vehicle-utilization", get(vehicle_utilization))
        .route("/reports/revenue", get(revenue))
}

async fn driver_durations(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DriverDuration>>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(reports::driver_durations(&state)))
}

async fn vehicle_utilization(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VehicleUtilization>>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(reports::vehicle_utilization(&state)))
}

async fn revenue(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Revenue>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(reports::revenue(&state)))
}
