use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::{check_auth, parse_date};
use crate::models::WorkShift;
use crate::services::shifts;
use crate::state::AppState;

const DEFAULT_STEP_MIN: i64 = 15;

// GET /api/admin/workshifts
#[derive(Deserialize)]
pub struct ShiftsQuery {
    pub mechanic_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub async fn list_workshifts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ShiftsQuery>,
) -> Result<Json<Vec<WorkShift>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date_from = query.date_from.as_deref().map(parse_date).transpose()?;
    let date_to = query.date_to.as_deref().map(parse_date).transpose()?;

    let shifts = {
        let db = state.db.lock().unwrap();
        shifts::list(&db, query.mechanic_id, date_from.as_ref(), date_to.as_ref())?
    };

    Ok(Json(shifts))
}

// POST /api/admin/workshifts
#[derive(Deserialize)]
pub struct CreateShiftRequest {
    pub mechanic_id: i64,
    pub work_date: String,
    pub start_min: i64,
    pub end_min: i64,
    pub step_min: Option<i64>,
}

pub async fn create_workshift(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateShiftRequest>,
) -> Result<(StatusCode, Json<WorkShift>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let input = shifts::ShiftInput {
        mechanic_id: body.mechanic_id,
        work_date: parse_date(&body.work_date)?,
        start_min: body.start_min,
        end_min: body.end_min,
        step_min: body.step_min.unwrap_or(DEFAULT_STEP_MIN),
    };

    let shift = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;
        let shift = shifts::create(&tx, &input)?;
        tx.commit()?;
        shift
    };

    Ok((StatusCode::CREATED, Json(shift)))
}

// PUT /api/admin/workshifts/:id
#[derive(Deserialize)]
pub struct UpdateShiftRequest {
    pub mechanic_id: Option<i64>,
    pub work_date: Option<String>,
    pub start_min: Option<i64>,
    pub end_min: Option<i64>,
    pub step_min: Option<i64>,
}

pub async fn update_workshift(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateShiftRequest>,
) -> Result<Json<WorkShift>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let patch = shifts::ShiftPatch {
        mechanic_id: body.mechanic_id,
        work_date: body.work_date.as_deref().map(parse_date).transpose()?,
        start_min: body.start_min,
        end_min: body.end_min,
        step_min: body.step_min,
    };

    let shift = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;
        let shift = shifts::update(&tx, id, &patch)?;
        tx.commit()?;
        shift
    };

    Ok(Json(shift))
}

// DELETE /api/admin/workshifts/:id
pub async fn delete_workshift(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;
        shifts::remove(&tx, id)?;
        tx.commit()?;
    }

    Ok(Json(serde_json::json!({"ok": true})))
}
