use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("requested time overlaps booking {booking_id}")]
    OverlapSlot {
        booking_id: i64,
        busy_start: NaiveDateTime,
        busy_end: NaiveDateTime,
    },

    #[error("shift overlaps existing shift {shift_id}")]
    ShiftOverlap { shift_id: i64 },

    #[error("insufficient stock for part {part_id}: need {needed}, have {available}")]
    OutOfStock {
        part_id: i64,
        needed: i64,
        available: i64,
    },

    #[error("stock already deducted for this booking")]
    AlreadyDeducted,

    #[error("unknown or inactive services")]
    ServiceNotFound(Vec<i64>),

    #[error("service {0} has no default duration")]
    ServiceDurationMissing(i64),

    #[error("{0}")]
    Duplicate(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable error kind, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::OverlapSlot { .. } => "OVERLAP_SLOT",
            AppError::ShiftOverlap { .. } => "SHIFT_OVERLAP",
            AppError::OutOfStock { .. } => "OUT_OF_STOCK",
            AppError::AlreadyDeducted => "ALREADY_DEDUCTED",
            AppError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            AppError::ServiceDurationMissing(_) => "SERVICE_DURATION_MISSING",
            AppError::Duplicate(_) => "DUPLICATE",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidState(_)
            | AppError::ServiceNotFound(_)
            | AppError::ServiceDurationMissing(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::OverlapSlot { .. }
            | AppError::ShiftOverlap { .. }
            | AppError::OutOfStock { .. }
            | AppError::AlreadyDeducted
            | AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::OverlapSlot {
                booking_id,
                busy_start,
                busy_end,
            } => Some(serde_json::json!({
                "booking_id": booking_id,
                "busy_start": busy_start.format("%Y-%m-%d %H:%M:%S").to_string(),
                "busy_end": busy_end.format("%Y-%m-%d %H:%M:%S").to_string(),
            })),
            AppError::ShiftOverlap { shift_id } => {
                Some(serde_json::json!({ "shift_id": shift_id }))
            }
            AppError::OutOfStock {
                part_id,
                needed,
                available,
            } => Some(serde_json::json!({
                "part_id": part_id,
                "needed": needed,
                "available": available,
            })),
            AppError::ServiceNotFound(ids) => Some(serde_json::json!({ "service_ids": ids })),
            AppError::ServiceDurationMissing(id) => {
                Some(serde_json::json!({ "service_id": id }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({
            "code": self.code(),
            "error": self.to_string(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}
