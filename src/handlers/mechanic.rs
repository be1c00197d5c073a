use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::bookings::{BookingDetailResponse, BookingResponse};
use crate::handlers::require_mechanic;
use crate::models::PartRequirement;
use crate::services::lifecycle;
use crate::state::AppState;

// GET /api/mechanic/bookings
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingDetailResponse>>, AppError> {
    let mechanic_id = require_mechanic(&headers)?;

    let jobs = {
        let db = state.db.lock().unwrap();
        let bookings = queries::list_mechanic_bookings(&db, mechanic_id)?;
        let mut jobs = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let service_lines = queries::get_booking_service_lines(&db, booking.id)?;
            let part_lines = queries::get_booking_part_lines(&db, booking.id)?;
            jobs.push(BookingDetailResponse {
                booking: booking.into(),
                service_lines,
                part_lines,
            });
        }
        jobs
    };

    Ok(Json(jobs))
}

// POST /api/mechanic/bookings/:id/diagnose
#[derive(Deserialize)]
pub struct DiagnoseRequest {
    pub note: Option<String>,
    pub eta_min: Option<i64>,
    pub labor_est_min: Option<i64>,
    #[serde(default)]
    pub required_parts: Vec<PartRequirement>,
}

pub async fn diagnose_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<DiagnoseRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let mechanic_id = require_mechanic(&headers)?;

    let input = lifecycle::DiagnoseInput {
        note: body.note,
        eta_min: body.eta_min,
        labor_est_min: body.labor_est_min,
        required_parts: body.required_parts,
    };
    let booking = lifecycle::diagnose(&state, id, mechanic_id, &input).await?;

    Ok(Json(booking.into()))
}

// POST /api/mechanic/bookings/:id/start
pub async fn start_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    require_mechanic(&headers)?;

    let booking = lifecycle::start(&state, id).await?;
    Ok(Json(booking.into()))
}

// POST /api/mechanic/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    require_mechanic(&headers)?;

    let booking = lifecycle::complete(&state, id).await?;
    Ok(Json(booking.into()))
}

// GET /api/mechanic/bookings/:id/diagnosis
#[derive(Serialize)]
pub struct DiagnosisResponse {
    pub id: i64,
    pub booking_id: i64,
    pub note: Option<String>,
    pub eta_min: Option<i64>,
    pub labor_est_min: Option<i64>,
    pub required_parts: Vec<PartRequirement>,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn get_diagnosis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<DiagnosisResponse>, AppError> {
    require_mechanic(&headers)?;

    let diagnosis = {
        let db = state.db.lock().unwrap();
        queries::get_diagnosis(&db, id)?
            .ok_or_else(|| AppError::NotFound("diagnosis not found".to_string()))?
    };

    Ok(Json(DiagnosisResponse {
        id: diagnosis.id,
        booking_id: diagnosis.booking_id,
        note: diagnosis.note,
        eta_min: diagnosis.eta_min,
        labor_est_min: diagnosis.labor_est_min,
        required_parts: diagnosis.required_parts,
        created_at: diagnosis.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        updated_at: diagnosis.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}
