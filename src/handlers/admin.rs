use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::handlers::{check_auth, parse_date};
use crate::models::BookingStatus;
use crate::services::lifecycle;
use crate::state::AppState;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub mechanic_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
pub struct BookingsPageResponse {
    pub items: Vec<BookingResponse>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<BookingsPageResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = match query.status.as_deref() {
        Some(s) => Some(BookingStatus::parse(s).ok_or_else(|| {
            AppError::Validation(format!("unknown booking status '{s}'"))
        })?),
        None => None,
    };
    let date_from = query.date_from.as_deref().map(parse_date).transpose()?;
    let date_to = query.date_to.as_deref().map(parse_date).transpose()?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * page_size;

    let (bookings, total) = {
        let db = state.db.lock().unwrap();
        queries::admin_list_bookings(
            &db,
            status,
            query.mechanic_id,
            date_from.as_ref(),
            date_to.as_ref(),
            page_size,
            offset,
        )?
    };

    let pages = (total + page_size - 1) / page_size;
    Ok(Json(BookingsPageResponse {
        items: bookings.into_iter().map(Into::into).collect(),
        total,
        page,
        pages,
    }))
}

// POST /api/admin/bookings/:id/approve
pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = lifecycle::approve(&state, id).await?;
    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/assign
#[derive(Deserialize)]
pub struct AssignRequest {
    pub mechanic_id: i64,
}

pub async fn assign_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = lifecycle::assign(&state, id, body.mechanic_id).await?;
    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/cancel
#[derive(Deserialize)]
pub struct AdminCancelRequest {
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<AdminCancelRequest>>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let reason = body.as_ref().and_then(|b| b.reason.as_deref());
    let booking = lifecycle::admin_cancel(&state, id, reason).await?;
    Ok(Json(booking.into()))
}
