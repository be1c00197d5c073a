use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::{parse_datetime, require_customer};
use crate::models::{Booking, BookingPartLine, BookingServiceLine};
use crate::services::lifecycle;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: i64,
    pub customer_id: i64,
    pub vehicle_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub start_dt: String,
    pub end_dt: Option<String>,
    pub status: String,
    pub notes_customer: Option<String>,
    pub notes_mechanic: Option<String>,
    pub stock_deducted: bool,
    pub total_services: Option<Decimal>,
    pub total_parts: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id,
            customer_id: b.customer_id,
            vehicle_id: b.vehicle_id,
            mechanic_id: b.mechanic_id,
            start_dt: b.start_dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_dt: b.end_dt.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            status: b.status.as_str().to_string(),
            notes_customer: b.notes_customer,
            notes_mechanic: b.notes_mechanic,
            stock_deducted: b.stock_deducted,
            total_services: b.total_services,
            total_parts: b.total_parts,
            total_amount: b.total_amount,
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct BookingDetailResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub service_lines: Vec<BookingServiceLine>,
    pub part_lines: Vec<BookingPartLine>,
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub vehicle_id: Option<i64>,
    pub service_ids: Vec<i64>,
    pub mechanic_id: Option<i64>,
    pub start: String,
    pub notes: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let customer_id = require_customer(&headers)?;
    let start = parse_datetime(&body.start)?;

    let input = lifecycle::CreateBooking {
        vehicle_id: body.vehicle_id,
        service_ids: body.service_ids,
        mechanic_id: body.mechanic_id,
        start,
        notes: body.notes,
    };
    let booking = lifecycle::create(&state, customer_id, &input).await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let customer_id = require_customer(&headers)?;

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_customer_bookings(&db, customer_id)?
    };

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BookingDetailResponse>, AppError> {
    let customer_id = require_customer(&headers)?;

    let (booking, service_lines, part_lines) = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, id)?
            .filter(|b| b.customer_id == customer_id)
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        let service_lines = queries::get_booking_service_lines(&db, id)?;
        let part_lines = queries::get_booking_part_lines(&db, id)?;
        (booking, service_lines, part_lines)
    };

    Ok(Json(BookingDetailResponse {
        booking: booking.into(),
        service_lines,
        part_lines,
    }))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<BookingResponse>, AppError> {
    let customer_id = require_customer(&headers)?;
    let reason = body.as_ref().and_then(|b| b.reason.as_deref());

    let booking = lifecycle::cancel(&state, id, customer_id, reason).await?;
    Ok(Json(booking.into()))
}
