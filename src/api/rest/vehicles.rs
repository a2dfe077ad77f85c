use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::vehicles::{self, NewVehicle};
use crate::error::AppError;
use crate::models::principal::{Principal, Role};
use crate::models::vehicle::{Vehicle, VehicleStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vehicles", post(create_vehicle).get(list_vehicles))
        .route("/vehicles/:id/status", patch(update_vehicle_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VehicleStatus,
}

async fn create_vehicle(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewVehicle>,
) -> Result<Json<Vehicle>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(vehicles::register(&state, payload)?))
}

async fn list_vehicles(
    _principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<Vehicle>> {
    Json(vehicles::list(&state))
}

async fn update_vehicle_status(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Vehicle>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(vehicles::set_status(&state, id, payload.status)?))
}
