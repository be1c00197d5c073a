pub mod admin;
pub mod bookings;
pub mod events;
pub mod health;
pub mod inventory;
pub mod mechanic;
pub mod slots;
pub mod workshifts;

use axum::http::HeaderMap;
use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::AppError;

/// Admin guard: `Authorization: Bearer <ADMIN_TOKEN>`.
pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Identity comes from an upstream auth proxy as an integer header.
fn require_id_header(headers: &HeaderMap, name: &str) -> Result<i64, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(AppError::Unauthorized)
}

pub(crate) fn require_customer(headers: &HeaderMap) -> Result<i64, AppError> {
    require_id_header(headers, "x-customer-id")
}

pub(crate) fn require_mechanic(headers: &HeaderMap) -> Result<i64, AppError> {
    require_id_header(headers, "x-mechanic-id")
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, AppError> {
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    Err(AppError::Validation(format!(
        "invalid datetime '{s}', expected YYYY-MM-DD HH:MM[:SS]"
    )))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date '{s}', expected YYYY-MM-DD")))
}
