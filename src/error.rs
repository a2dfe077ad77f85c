use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::engine::conflict::ResourceKind;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    #[error("{resource} is already booked by delivery {delivery_id} in that window")]
    SchedulingConflict {
        resource: ResourceKind,
        delivery_id: Uuid,
    },

    #[error("interval start {start} must be before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, shared by HTTP bodies and websocket error frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::AlreadyProcessed(_) => "already_processed",
            AppError::SchedulingConflict { .. } => "scheduling_conflict",
            AppError::InvalidInterval { .. } => "invalid_interval",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::InvalidInterval { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AlreadyProcessed(_)
            | AppError::SchedulingConflict { .. }
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        match self {
            AppError::Validation { field, .. } => {
                body["field"] = json!(field);
            }
            AppError::SchedulingConflict {
                resource,
                delivery_id,
            } => {
                body["resource"] = json!(resource);
                body["deliveryId"] = json!(delivery_id);
            }
            _ => {}
        }

        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal error");
        }

        (self.status(), Json(self.to_body())).into_response()
    }
}
