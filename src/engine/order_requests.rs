use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::conflict::Interval;
use crate::engine::scheduler::{schedule_delivery, DeliveryDraft};
use crate::error::AppError;
use crate::events::catalog::Event;
use crate::models::delivery::Delivery;
use crate::models::order_request::{OrderRequest, OrderRequestStatus};
use crate::models::principal::{Principal, Role};
use crate::models::tracking::GeoPoint;
use crate::state::AppState;

pub const DEFAULT_REJECTION_REASON: &str = "Your request could not be fulfilled at this time";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderRequest {
    pub customer_name: String,
    pub pickup_location: String,
    pub drop_location: String,
    pub vehicle_type: String,
    pub pickup_time: DateTime<Utc>,
}

/// Admin input for approval. Every field is required; they are optional here
/// so a missing one surfaces as a field-level validation error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub pickup_coords: Option<GeoPoint>,
    pub drop_coords: Option<GeoPoint>,
    pub drop_time: Option<DateTime<Utc>>,
}

struct CheckedApproval {
    driver_id: Uuid,
    vehicle_id: Uuid,
    pickup_coords: GeoPoint,
    drop_coords: GeoPoint,
    drop_time: DateTime<Utc>,
}

impl Approval {
    fn check(self) -> Result<CheckedApproval, AppError> {
        let driver_id = self.driver_id.ok_or_else(|| required("driverId"))?;
        let vehicle_id = self.vehicle_id.ok_or_else(|| required("vehicleId"))?;
        let pickup_coords = self.pickup_coords.ok_or_else(|| required("pickupCoords"))?;
        let drop_coords = self.drop_coords.ok_or_else(|| required("dropCoords"))?;
        let drop_time = self.drop_time.ok_or_else(|| required("dropTime"))?;

        if !pickup_coords.is_valid() {
            return Err(AppError::validation("pickupCoords", "out of range"));
        }
        if !drop_coords.is_valid() {
            return Err(AppError::validation("dropCoords", "out of range"));
        }

        Ok(CheckedApproval {
            driver_id,
            vehicle_id,
            pickup_coords,
            drop_coords,
            drop_time,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub request: OrderRequest,
    pub delivery: Delivery,
}

fn required(field: &str) -> AppError {
    AppError::validation(field, "is required")
}

fn not_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::validation(field, "cannot be empty"))
    } else {
        Ok(())
    }
}

pub fn create(
    state: &AppState,
    customer_id: Uuid,
    input: NewOrderRequest,
) -> Result<OrderRequest, AppError> {
    not_blank("customerName", &input.customer_name)?;
    not_blank("pickupLocation", &input.pickup_location)?;
    not_blank("dropLocation", &input.drop_location)?;
    not_blank("vehicleType", &input.vehicle_type)?;

    let request = OrderRequest {
        id: Uuid::new_v4(),
        customer_id,
        customer_name: input.customer_name.trim().to_string(),
        pickup_location: input.pickup_location.trim().to_string(),
        drop_location: input.drop_location.trim().to_string(),
        vehicle_type: input.vehicle_type.trim().to_string(),
        pickup_time: input.pickup_time,
        drop_time: None,
        pickup_coords: None,
        drop_coords: None,
        status: OrderRequestStatus::Pending,
        delivery_id: None,
        rejection_reason: None,
        created_at: Utc::now(),
        processed_at: None,
    };

    state.order_requests.insert(request.id, request.clone());
    state
        .metrics
        .order_requests_total
        .with_label_values(&["created"])
        .inc();
    info!(request_id = %request.id, customer_id = %customer_id, "order request created");

    state.events.emit(Event::OrderRequestCreated(request.clone()));
    Ok(request)
}

/// Approves a pending request and books its delivery.
///
/// The request lock is held from the pending check to the commit, so
/// duplicate approvals resolve to one delivery; the loser sees
/// `AlreadyProcessed`.
pub async fn approve(
    state: &AppState,
    request_id: Uuid,
    approval: Approval,
) -> Result<ApprovalOutcome, AppError> {
    let start = Instant::now();
    let result = approve_locked(state, request_id, approval).await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .approval_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

async fn approve_locked(
    state: &AppState,
    request_id: Uuid,
    approval: Approval,
) -> Result<ApprovalOutcome, AppError> {
    ensure_exists(state, request_id)?;
    let _guard = state.request_locks.lock(request_id).await;

    let request = load_pending(state, request_id)?;
    let approval = approval.check()?;
    let interval = Interval::new(request.pickup_time, approval.drop_time)?;

    let delivery = schedule_delivery(
        state,
        DeliveryDraft {
            pickup_location: request.pickup_location.clone(),
            drop_location: request.drop_location.clone(),
            pickup_coords: approval.pickup_coords,
            drop_coords: approval.drop_coords,
            driver_id: approval.driver_id,
            vehicle_id: approval.vehicle_id,
            customer_id: Some(request.customer_id),
            customer_name: request.customer_name.clone(),
            order_request_id: Some(request.id),
            interval,
        },
    )
    .await?;

    let updated = commit(state, request_id, |request| {
        request.status = OrderRequestStatus::Approved;
        request.delivery_id = Some(delivery.id);
        request.drop_time = Some(approval.drop_time);
        request.pickup_coords = Some(approval.pickup_coords);
        request.drop_coords = Some(approval.drop_coords);
        request.processed_at = Some(Utc::now());
    })?;

    state
        .metrics
        .order_requests_total
        .with_label_values(&["approved"])
        .inc();
    info!(request_id = %request_id, delivery_id = %delivery.id, "order request approved");

    state
        .events
        .emit(Event::OrderRequestStatusChanged(updated.clone()));

    Ok(ApprovalOutcome {
        request: updated,
        delivery,
    })
}

pub async fn reject(
    state: &AppState,
    request_id: Uuid,
    reason: Option<String>,
) -> Result<OrderRequest, AppError> {
    ensure_exists(state, request_id)?;
    let _guard = state.request_locks.lock(request_id).await;

    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

    let updated = commit(state, request_id, |request| {
        request.status = OrderRequestStatus::Rejected;
        request.rejection_reason = Some(reason);
        request.processed_at = Some(Utc::now());
    })?;

    state
        .metrics
        .order_requests_total
        .with_label_values(&["rejected"])
        .inc();
    info!(request_id = %request_id, "order request rejected");

    state
        .events
        .emit(Event::OrderRequestStatusChanged(updated.clone()));
    Ok(updated)
}

pub fn pending_count(state: &AppState) -> usize {
    state
        .order_requests
        .iter()
        .filter(|entry| entry.value().is_pending())
        .count()
}

/// Admins see every request, customers their own. Newest first.
pub fn list_for(state: &AppState, principal: &Principal) -> Result<Vec<OrderRequest>, AppError> {
    let mut requests: Vec<OrderRequest> = match principal.role {
        Role::Admin => state
            .order_requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect(),
        Role::Customer => state
            .order_requests
            .iter()
            .filter(|entry| entry.value().customer_id == principal.id)
            .map(|entry| entry.value().clone())
            .collect(),
        Role::Driver => {
            return Err(AppError::Forbidden(
                "drivers cannot list order requests".to_string(),
            ));
        }
    };

    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(requests)
}

fn ensure_exists(state: &AppState, request_id: Uuid) -> Result<(), AppError> {
    if state.order_requests.contains_key(&request_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("order request {request_id} not found")))
    }
}

fn load_pending(state: &AppState, request_id: Uuid) -> Result<OrderRequest, AppError> {
    let request = state
        .order_requests
        .get(&request_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order request {request_id} not found")))?;

    ensure_pending(&request)?;
    Ok(request)
}

fn ensure_pending(request: &OrderRequest) -> Result<(), AppError> {
    if request.is_pending() {
        Ok(())
    } else {
        Err(AppError::AlreadyProcessed(format!(
            "order request {} is already {:?}",
            request.id, request.status
        )))
    }
}

/// Compare-and-swap out of `pending`.
fn commit<F>(state: &AppState, request_id: Uuid, apply: F) -> Result<OrderRequest, AppError>
where
    F: FnOnce(&mut OrderRequest),
{
    let mut entry = state
        .order_requests
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("order request {request_id} not found")))?;

    ensure_pending(&entry)?;
    apply(&mut entry);
    Ok(entry.clone())
}
