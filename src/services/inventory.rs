use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{InventoryLevel, PartRequirement, ReceiptItem, ServicePartMapping};

/// Verifies stock for every requirement, then deducts. Requirements are
/// checked in ascending part id so insufficient stock is always reported for
/// the same part regardless of input order. The caller supplies an open
/// transaction; on error nothing written here survives.
pub fn check_and_deduct(
    conn: &Connection,
    requirements: &[PartRequirement],
) -> Result<(), AppError> {
    let mut sorted: Vec<PartRequirement> = requirements.to_vec();
    sorted.sort_by_key(|req| req.part_id);

    for req in &sorted {
        let available = queries::get_stock_qty(conn, req.part_id)?.unwrap_or(0);
        if available < req.quantity {
            return Err(AppError::OutOfStock {
                part_id: req.part_id,
                needed: req.quantity,
                available,
            });
        }
    }

    for req in &sorted {
        queries::deduct_stock(conn, req.part_id, req.quantity)?;
    }
    Ok(())
}

/// Books received stock into inventory. Each item must name an existing part
/// and carry a positive quantity.
pub fn receive(conn: &Connection, items: &[ReceiptItem]) -> Result<Vec<InventoryLevel>, AppError> {
    if items.is_empty() {
        return Err(AppError::Validation(
            "receipt must contain at least one item".to_string(),
        ));
    }

    for item in items {
        if item.quantity < 1 {
            return Err(AppError::Validation(
                "receipt quantity must be at least 1".to_string(),
            ));
        }
        if queries::get_part(conn, item.part_id)?.is_none() {
            return Err(AppError::NotFound(format!("part {} not found", item.part_id)));
        }
    }

    for item in items {
        queries::add_stock(conn, item.part_id, item.quantity)?;
    }

    levels(conn)
}

pub fn levels(conn: &Connection) -> Result<Vec<InventoryLevel>, AppError> {
    Ok(queries::list_stock_levels(conn)?)
}

/// Registers a default part for a quick service. Repair services get their
/// parts from diagnosis, never from catalog defaults.
pub fn add_service_part(
    conn: &Connection,
    service_id: i64,
    part_id: i64,
    qty_per_service: i64,
) -> Result<ServicePartMapping, AppError> {
    if qty_per_service < 1 {
        return Err(AppError::Validation(
            "qty_per_service must be at least 1".to_string(),
        ));
    }

    let service = queries::get_service(conn, service_id)?
        .ok_or_else(|| AppError::NotFound("service not found".to_string()))?;
    if service.kind != crate::models::ServiceKind::Quick {
        return Err(AppError::Validation(
            "default parts can only be attached to quick services".to_string(),
        ));
    }
    if queries::get_part(conn, part_id)?.is_none() {
        return Err(AppError::NotFound("part not found".to_string()));
    }
    if queries::service_part_exists(conn, service_id, part_id)? {
        return Err(AppError::Duplicate(format!(
            "service {service_id} already has a default for part {part_id}"
        )));
    }

    let id = queries::insert_service_part(conn, service_id, part_id, qty_per_service)?;
    Ok(ServicePartMapping {
        id,
        service_id,
        part_id,
        qty_per_service,
    })
}

pub fn list_service_parts(
    conn: &Connection,
    service_id: Option<i64>,
) -> Result<Vec<ServicePartMapping>, AppError> {
    Ok(queries::list_service_parts(conn, service_id)?)
}

pub fn remove_service_part(conn: &Connection, id: i64) -> Result<(), AppError> {
    if !queries::delete_service_part(conn, id)? {
        return Err(AppError::NotFound("service part mapping not found".to_string()));
    }
    Ok(())
}
