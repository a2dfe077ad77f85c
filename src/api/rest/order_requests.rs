use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::order_requests::{self, Approval, ApprovalOutcome, NewOrderRequest};
use crate::error::AppError;
use crate::models::order_request::OrderRequest;
use crate::models::principal::{Principal, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/order-requests",
            post(create_order_request).get(list_order_requests),
        )
        .route("/order-requests/pending-count", get(pending_count))
        .route("/order-requests/:id/approve", post(approve_order_request))
        .route("/order-requests/:id/reject", post(reject_order_request))
}

#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Serialize)]
struct PendingCount {
    pending: usize,
}

async fn create_order_request(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrderRequest>,
) -> Result<Json<OrderRequest>, AppError> {
    principal.require(Role::Customer)?;
    let request = order_requests::create(&state, principal.id, payload)?;
    Ok(Json(request))
}

async fn list_order_requests(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderRequest>>, AppError> {
    Ok(Json(order_requests::list_for(&state, &principal)?))
}

async fn pending_count(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PendingCount>, AppError> {
    principal.require(Role::Admin)?;
    Ok(Json(PendingCount {
        pending: order_requests::pending_count(&state),
    }))
}

async fn approve_order_request(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Approval>,
) -> Result<Json<ApprovalOutcome>, AppError> {
    principal.require(Role::Admin)?;
    let outcome = order_requests::approve(&state, id, payload).await?;
    Ok(Json(outcome))
}

async fn reject_order_request(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<OrderRequest>, AppError> {
    principal.require(Role::Admin)?;
    let reason = payload.and_then(|Json(body)| body.reason);
    let request = order_requests::reject(&state, id, reason).await?;
    Ok(Json(request))
}
