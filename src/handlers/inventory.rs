use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{InventoryLevel, ReceiptItem, ServicePartMapping};
use crate::services::inventory;
use crate::state::AppState;

// GET /api/admin/inventory
pub async fn get_levels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<InventoryLevel>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let levels = {
        let db = state.db.lock().unwrap();
        inventory::levels(&db)?
    };

    Ok(Json(levels))
}

// POST /api/admin/inventory/receive
#[derive(Deserialize)]
pub struct ReceiveRequest {
    pub items: Vec<ReceiptItem>,
}

pub async fn receive_stock(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReceiveRequest>,
) -> Result<Json<Vec<InventoryLevel>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let levels = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;
        let levels = inventory::receive(&tx, &body.items)?;
        tx.commit()?;
        levels
    };

    Ok(Json(levels))
}

// GET /api/admin/service-parts
#[derive(Deserialize)]
pub struct ServicePartsQuery {
    pub service_id: Option<i64>,
}

pub async fn list_service_parts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ServicePartsQuery>,
) -> Result<Json<Vec<ServicePartMapping>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let mappings = {
        let db = state.db.lock().unwrap();
        inventory::list_service_parts(&db, query.service_id)?
    };

    Ok(Json(mappings))
}

// POST /api/admin/service-parts
#[derive(Deserialize)]
pub struct CreateServicePartRequest {
    pub service_id: i64,
    pub part_id: i64,
    pub qty_per_service: i64,
}

pub async fn create_service_part(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateServicePartRequest>,
) -> Result<(StatusCode, Json<ServicePartMapping>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let mapping = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;
        let mapping =
            inventory::add_service_part(&tx, body.service_id, body.part_id, body.qty_per_service)?;
        tx.commit()?;
        mapping
    };

    Ok((StatusCode::CREATED, Json(mapping)))
}

// DELETE /api/admin/service-parts/:id
pub async fn delete_service_part(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    {
        let db = state.db.lock().unwrap();
        inventory::remove_service_part(&db, id)?;
    }

    Ok(Json(serde_json::json!({"ok": true})))
}
