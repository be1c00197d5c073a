use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::parse_date;
use crate::models::SlotsResult;
use crate::services::slots;
use crate::state::AppState;

// GET /api/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
    pub mechanic_id: Option<i64>,
    pub service_ids: Option<String>,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResult>, AppError> {
    let date = parse_date(&query.date)?;

    let mut service_ids = vec![];
    if let Some(raw) = query.service_ids.as_deref() {
        for piece in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id: i64 = piece.parse().map_err(|_| {
                AppError::Validation(format!("invalid service id '{piece}'"))
            })?;
            service_ids.push(id);
        }
    }

    let result = {
        let db = state.db.lock().unwrap();
        slots::compute_slots(
            &db,
            date,
            query.mechanic_id,
            &service_ids,
            state.config.fallback_block_min,
        )?
    };

    Ok(Json(result))
}
