use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, PartRequirement, ServiceKind, TransitionKind};
use crate::services::duration::{
    estimate_final, estimate_initial, load_active_services, snapshot_minutes,
    DIAGNOSIS_PLACEHOLDER_MIN,
};
use crate::services::inventory;
use crate::services::notify;
use crate::services::overlap::overlaps;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub vehicle_id: Option<i64>,
    pub service_ids: Vec<i64>,
    pub mechanic_id: Option<i64>,
    pub start: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiagnoseInput {
    pub note: Option<String>,
    pub eta_min: Option<i64>,
    pub labor_est_min: Option<i64>,
    pub required_parts: Vec<PartRequirement>,
}

/// Books a visit in `PENDING` with one immutable service line per selected
/// service. Prices and quick durations are captured here; later catalog edits
/// never reach this booking.
pub async fn create(
    state: &Arc<AppState>,
    customer_id: i64,
    input: &CreateBooking,
) -> Result<Booking, AppError> {
    if input.service_ids.is_empty() {
        return Err(AppError::Validation(
            "service_ids must not be empty".to_string(),
        ));
    }

    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        if queries::get_customer(&tx, customer_id)?.is_none() {
            return Err(AppError::NotFound("customer not found".to_string()));
        }
        if let Some(vehicle_id) = input.vehicle_id {
            queries::get_vehicle(&tx, vehicle_id)?
                .filter(|v| v.customer_id == customer_id)
                .ok_or_else(|| AppError::NotFound("vehicle not found".to_string()))?;
        }
        if let Some(mechanic_id) = input.mechanic_id {
            if queries::get_mechanic(&tx, mechanic_id)?.is_none() {
                return Err(AppError::NotFound("mechanic not found".to_string()));
            }
        }

        let services = load_active_services(&tx, &input.service_ids)?;
        let estimate = estimate_initial(&services)?;
        let end = input.start + Duration::minutes(estimate.minutes);

        if let Some(mechanic_id) = input.mechanic_id {
            check_overlap(
                &tx,
                mechanic_id,
                &input.start,
                &end,
                None,
                state.config.fallback_block_min,
            )?;
        }

        let booking_id = queries::insert_booking(
            &tx,
            customer_id,
            input.vehicle_id,
            input.mechanic_id,
            &input.start,
            Some(&end),
            input.notes.as_deref(),
        )?;

        for service in &services {
            let duration = match service.kind {
                ServiceKind::Quick => service.default_duration_min,
                ServiceKind::Repair => None,
            };
            queries::insert_booking_service(
                &tx,
                booking_id,
                service.id,
                1,
                service.base_price,
                duration,
            )?;
        }

        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after insert")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Created).await;
    Ok(booking)
}

pub async fn approve(state: &Arc<AppState>, booking_id: i64) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        if booking.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "cannot approve a booking in status {}",
                booking.status.as_str()
            )));
        }

        queries::set_booking_status(&tx, booking_id, BookingStatus::Approved)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Approved).await;
    Ok(booking)
}

/// Hands the booking to a mechanic, re-deriving its end time and re-checking
/// that mechanic's calendar before committing.
pub async fn assign(
    state: &Arc<AppState>,
    booking_id: i64,
    mechanic_id: i64,
) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        if booking.status.is_terminal() || booking.status == BookingStatus::InProgress {
            return Err(AppError::InvalidState(format!(
                "cannot assign a booking in status {}",
                booking.status.as_str()
            )));
        }
        if queries::get_mechanic(&tx, mechanic_id)?.is_none() {
            return Err(AppError::NotFound("mechanic not found".to_string()));
        }

        let end = match booking.end_dt {
            Some(end) => end,
            None => {
                let lines = queries::get_booking_service_lines(&tx, booking_id)?;
                let snap = snapshot_minutes(&lines);
                let mut minutes = snap.quick_minutes;
                if snap.has_repair_component {
                    minutes += DIAGNOSIS_PLACEHOLDER_MIN;
                }
                if minutes < 1 {
                    return Err(AppError::Validation(
                        "booking has no known duration".to_string(),
                    ));
                }
                booking.start_dt + Duration::minutes(minutes)
            }
        };

        check_overlap(
            &tx,
            mechanic_id,
            &booking.start_dt,
            &end,
            Some(booking_id),
            state.config.fallback_block_min,
        )?;

        queries::set_booking_mechanic(&tx, booking_id, mechanic_id, &end)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Assigned).await;
    Ok(booking)
}

/// Records the mechanic's findings. The diagnosis is an upsert keyed by
/// booking; the booking's end moves to `start + quick snapshot + labor` and
/// the new window is conflict-checked before anything is written.
pub async fn diagnose(
    state: &Arc<AppState>,
    booking_id: i64,
    mechanic_id: i64,
    input: &DiagnoseInput,
) -> Result<Booking, AppError> {
    if input.eta_min.is_some_and(|v| v < 0) {
        return Err(AppError::Validation("eta_min must not be negative".to_string()));
    }
    if input.labor_est_min.is_some_and(|v| v < 0) {
        return Err(AppError::Validation(
            "labor_est_min must not be negative".to_string(),
        ));
    }
    for req in &input.required_parts {
        if req.part_id < 1 || req.quantity < 1 {
            return Err(AppError::Validation(
                "required parts must carry a positive part id and quantity".to_string(),
            ));
        }
    }

    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        let assigned = booking.mechanic_id.ok_or_else(|| {
            AppError::InvalidState("booking has no mechanic assigned".to_string())
        })?;
        if assigned != mechanic_id {
            return Err(AppError::Forbidden(
                "only the assigned mechanic can diagnose this booking".to_string(),
            ));
        }
        if !matches!(
            booking.status,
            BookingStatus::Approved | BookingStatus::InDiagnosis
        ) {
            return Err(AppError::InvalidState(format!(
                "cannot diagnose a booking in status {}",
                booking.status.as_str()
            )));
        }

        let part_ids: Vec<i64> = input.required_parts.iter().map(|r| r.part_id).collect();
        let missing = queries::missing_part_ids(&tx, &part_ids)?;
        if !missing.is_empty() {
            return Err(AppError::NotFound(format!("parts not found: {missing:?}")));
        }

        let lines = queries::get_booking_service_lines(&tx, booking_id)?;
        let snap = snapshot_minutes(&lines);
        let minutes = estimate_final(snap.quick_minutes, input.labor_est_min);
        if minutes < 1 {
            return Err(AppError::Validation(
                "estimated duration must be at least one minute".to_string(),
            ));
        }
        let end = booking.start_dt + Duration::minutes(minutes);

        check_overlap(
            &tx,
            assigned,
            &booking.start_dt,
            &end,
            Some(booking_id),
            state.config.fallback_block_min,
        )?;

        let parts_json = serde_json::to_string(&input.required_parts)
            .context("failed to encode required parts")?;
        if queries::get_diagnosis(&tx, booking_id)?.is_some() {
            queries::update_diagnosis(
                &tx,
                booking_id,
                input.note.as_deref(),
                input.eta_min,
                input.labor_est_min,
                &parts_json,
            )?;
        } else {
            queries::insert_diagnosis(
                &tx,
                booking_id,
                input.note.as_deref(),
                input.eta_min,
                input.labor_est_min,
                &parts_json,
            )?;
        }

        queries::set_booking_end_status(&tx, booking_id, &end, BookingStatus::InDiagnosis)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Diagnosed).await;
    Ok(booking)
}

/// Puts the job on the floor. On the first call the needed parts (quick
/// defaults plus diagnosis requirements, summed by part id) are snapshotted
/// as part lines and deducted from stock in one transaction; `stock_deducted`
/// then guards every later call, so re-entry never touches inventory again.
pub async fn start(state: &Arc<AppState>, booking_id: i64) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        let assigned = booking.mechanic_id.ok_or_else(|| {
            AppError::InvalidState("booking has no mechanic assigned".to_string())
        })?;
        if !matches!(
            booking.status,
            BookingStatus::Approved | BookingStatus::InDiagnosis | BookingStatus::InProgress
        ) {
            return Err(AppError::InvalidState(format!(
                "cannot start a booking in status {}",
                booking.status.as_str()
            )));
        }

        let end = booking.end_dt.unwrap_or_else(|| {
            booking.start_dt + Duration::minutes(state.config.fallback_block_min)
        });
        check_overlap(
            &tx,
            assigned,
            &booking.start_dt,
            &end,
            Some(booking_id),
            state.config.fallback_block_min,
        )?;

        if !booking.stock_deducted {
            let mut needed: BTreeMap<i64, i64> = BTreeMap::new();
            for (part_id, qty) in queries::get_quick_default_parts(&tx, booking_id)? {
                *needed.entry(part_id).or_insert(0) += qty;
            }
            if let Some(diagnosis) = queries::get_diagnosis(&tx, booking_id)? {
                for req in &diagnosis.required_parts {
                    *needed.entry(req.part_id).or_insert(0) += req.quantity;
                }
            }

            let mut lines = queries::get_booking_part_lines(&tx, booking_id)?;
            if lines.is_empty() && !needed.is_empty() {
                let part_ids: Vec<i64> = needed.keys().copied().collect();
                let parts = queries::get_parts_by_ids(&tx, &part_ids)?;
                if parts.len() != part_ids.len() {
                    let missing = queries::missing_part_ids(&tx, &part_ids)?;
                    return Err(AppError::NotFound(format!("parts not found: {missing:?}")));
                }

                let price_by_id: BTreeMap<i64, Decimal> =
                    parts.iter().map(|p| (p.id, p.price)).collect();
                for (&part_id, &qty) in &needed {
                    let price = price_by_id
                        .get(&part_id)
                        .copied()
                        .context("part price missing after lookup")?;
                    queries::insert_booking_part(&tx, booking_id, part_id, qty, price)?;
                }
                lines = queries::get_booking_part_lines(&tx, booking_id)?;
            }

            let requirements: Vec<PartRequirement> = lines
                .iter()
                .map(|line| PartRequirement {
                    part_id: line.part_id,
                    quantity: line.qty,
                })
                .collect();
            inventory::check_and_deduct(&tx, &requirements)?;
        }

        queries::set_booking_started(&tx, booking_id)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;

        tracing::info!(booking_id, mechanic_id = assigned, "booking started");
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Started).await;
    Ok(booking)
}

/// Closes the job and totals it from the immutable line snapshots.
pub async fn complete(state: &Arc<AppState>, booking_id: i64) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        if booking.status != BookingStatus::InProgress {
            return Err(AppError::InvalidState(format!(
                "cannot complete a booking in status {}",
                booking.status.as_str()
            )));
        }

        let service_lines = queries::get_booking_service_lines(&tx, booking_id)?;
        let part_lines = queries::get_booking_part_lines(&tx, booking_id)?;

        let mut total_services = Decimal::ZERO;
        for line in &service_lines {
            total_services += (line.price_snapshot * Decimal::from(line.qty)).round_dp(2);
        }
        let mut total_parts = Decimal::ZERO;
        for line in &part_lines {
            total_parts += (line.price_snapshot * Decimal::from(line.qty)).round_dp(2);
        }
        let total_amount = (total_services + total_parts).round_dp(2);

        queries::set_booking_totals_done(&tx, booking_id, total_services, total_parts, total_amount)?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Completed).await;
    Ok(booking)
}

/// Customer-initiated cancellation; only reaches bookings the caller owns.
pub async fn cancel(
    state: &Arc<AppState>,
    booking_id: i64,
    customer_id: i64,
    reason: Option<&str>,
) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .filter(|b| b.customer_id == customer_id)
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        check_cancelable(&booking)?;

        let notes = cancel_note(booking.notes_mechanic.as_deref(), reason, "[CANCEL]");
        queries::set_booking_canceled(&tx, booking_id, notes.as_deref())?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Canceled).await;
    Ok(booking)
}

pub async fn admin_cancel(
    state: &Arc<AppState>,
    booking_id: i64,
    reason: Option<&str>,
) -> Result<Booking, AppError> {
    let booking = {
        let mut conn = state.db.lock().unwrap();
        let tx = conn.transaction()?;

        let booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound("booking not found".to_string()))?;
        check_cancelable(&booking)?;

        let notes = cancel_note(booking.notes_mechanic.as_deref(), reason, "[ADMIN CANCEL]");
        queries::set_booking_canceled(&tx, booking_id, notes.as_deref())?;
        let booking = queries::get_booking(&tx, booking_id)?
            .context("booking row missing after update")?;
        tx.commit()?;
        booking
    };

    notify::publish(state, booking.customer_id, booking.id, TransitionKind::Canceled).await;
    Ok(booking)
}

/// Conflict check against a mechanic's blocking bookings. Open-ended busy
/// ranges are widened to the configured fallback duration.
fn check_overlap(
    conn: &Connection,
    mechanic_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_booking: Option<i64>,
    fallback_block_min: i64,
) -> Result<(), AppError> {
    let ranges = queries::get_busy_ranges(conn, mechanic_id, start, end, exclude_booking)?;
    for range in &ranges {
        let busy_end = range.end_or(fallback_block_min);
        if overlaps(*start, *end, range.start, busy_end)? {
            return Err(AppError::OverlapSlot {
                booking_id: range.booking_id,
                busy_start: range.start,
                busy_end,
            });
        }
    }
    Ok(())
}

/// Stock-deducted bookings can never be canceled; the ledger has no return
/// path in this system.
fn check_cancelable(booking: &Booking) -> Result<(), AppError> {
    if booking.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "cannot cancel a booking in status {}",
            booking.status.as_str()
        )));
    }
    if booking.stock_deducted {
        return Err(AppError::AlreadyDeducted);
    }
    if booking.status == BookingStatus::InProgress {
        return Err(AppError::InvalidState(
            "cannot cancel a booking already in progress".to_string(),
        ));
    }
    Ok(())
}

fn cancel_note(existing: Option<&str>, reason: Option<&str>, tag: &str) -> Option<String> {
    let reason = reason?.trim();
    if reason.is_empty() {
        return None;
    }
    Some(match existing {
        Some(notes) if !notes.is_empty() => format!("{notes}\n{tag} {reason}"),
        _ => format!("{tag} {reason}"),
    })
}
