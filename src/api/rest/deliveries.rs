use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::deliveries::{self, NewDelivery};
use crate::engine::tracking;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::principal::{Principal, Role};
use crate::models::tracking::TrackingSample;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", patch(update_delivery_status))
        .route("/deliveries/:id/payment", post(confirm_payment))
        .route("/deliveries/:id/tracking/latest", get(latest_tracking))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
}

async fn create_delivery(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDelivery>,
) -> Result<Json<Delivery>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(deliveries::create(&state, payload).await?))
}

async fn list_deliveries(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<Delivery>> {
    Json(deliveries::list_for(&state, &principal))
}

async fn get_delivery(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(deliveries::get_for(&state, &principal, id)?))
}

async fn update_delivery_status(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    principal.require(Role::Driver)?;
    let delivery = deliveries::update_status(&state, principal.id, id, payload.status)?;
    Ok(Json(delivery))
}

async fn confirm_payment(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(deliveries::confirm_payment(&state, id)?))
}

async fn latest_tracking(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSample>, AppError> {
    deliveries::get_for(&state, &principal, id)?;

    tracking::latest(&state, id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no tracking samples for delivery {id}")))
}
