use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::WorkShift;
use crate::services::overlap::overlaps;

pub const MINUTES_PER_DAY: i64 = 1440;
pub const MAX_STEP_MIN: i64 = 120;

#[derive(Debug, Clone)]
pub struct ShiftInput {
    pub mechanic_id: i64,
    pub work_date: NaiveDate,
    pub start_min: i64,
    pub end_min: i64,
    pub step_min: i64,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ShiftPatch {
    pub mechanic_id: Option<i64>,
    pub work_date: Option<NaiveDate>,
    pub start_min: Option<i64>,
    pub end_min: Option<i64>,
    pub step_min: Option<i64>,
}

pub fn list(
    conn: &Connection,
    mechanic_id: Option<i64>,
    date_from: Option<&NaiveDate>,
    date_to: Option<&NaiveDate>,
) -> Result<Vec<WorkShift>, AppError> {
    Ok(queries::list_workshifts(conn, mechanic_id, date_from, date_to)?)
}

pub fn create(conn: &Connection, input: &ShiftInput) -> Result<WorkShift, AppError> {
    validate_window(input.start_min, input.end_min, input.step_min)?;

    if queries::get_mechanic(conn, input.mechanic_id)?.is_none() {
        return Err(AppError::NotFound("mechanic not found".to_string()));
    }
    check_conflicts(conn, input.mechanic_id, &input.work_date, input.start_min, input.end_min, None)?;

    let id = queries::insert_workshift(
        conn,
        input.mechanic_id,
        &input.work_date,
        input.start_min,
        input.end_min,
        input.step_min,
    )?;

    Ok(WorkShift {
        id,
        mechanic_id: input.mechanic_id,
        work_date: input.work_date,
        start_min: input.start_min,
        end_min: input.end_min,
        step_min: input.step_min,
    })
}

pub fn update(conn: &Connection, id: i64, patch: &ShiftPatch) -> Result<WorkShift, AppError> {
    let existing = queries::get_workshift(conn, id)?
        .ok_or_else(|| AppError::NotFound("work shift not found".to_string()))?;

    let merged = WorkShift {
        id,
        mechanic_id: patch.mechanic_id.unwrap_or(existing.mechanic_id),
        work_date: patch.work_date.unwrap_or(existing.work_date),
        start_min: patch.start_min.unwrap_or(existing.start_min),
        end_min: patch.end_min.unwrap_or(existing.end_min),
        step_min: patch.step_min.unwrap_or(existing.step_min),
    };

    validate_window(merged.start_min, merged.end_min, merged.step_min)?;

    if merged.mechanic_id != existing.mechanic_id
        && queries::get_mechanic(conn, merged.mechanic_id)?.is_none()
    {
        return Err(AppError::NotFound("mechanic not found".to_string()));
    }
    check_conflicts(
        conn,
        merged.mechanic_id,
        &merged.work_date,
        merged.start_min,
        merged.end_min,
        Some(id),
    )?;

    queries::update_workshift(conn, &merged)?;
    Ok(merged)
}

pub fn remove(conn: &Connection, id: i64) -> Result<(), AppError> {
    if !queries::delete_workshift(conn, id)? {
        return Err(AppError::NotFound("work shift not found".to_string()));
    }
    Ok(())
}

fn validate_window(start_min: i64, end_min: i64, step_min: i64) -> Result<(), AppError> {
    if start_min < 0 || end_min > MINUTES_PER_DAY || start_min >= end_min {
        return Err(AppError::Validation(
            "shift window must satisfy 0 <= start < end <= 1440".to_string(),
        ));
    }
    if step_min < 1 || step_min > MAX_STEP_MIN {
        return Err(AppError::Validation(format!(
            "slot step must be between 1 and {MAX_STEP_MIN} minutes"
        )));
    }
    Ok(())
}

fn check_conflicts(
    conn: &Connection,
    mechanic_id: i64,
    work_date: &NaiveDate,
    start_min: i64,
    end_min: i64,
    exclude_shift: Option<i64>,
) -> Result<(), AppError> {
    let others = queries::get_mechanic_shifts_on_date(conn, mechanic_id, work_date, exclude_shift)?;
    for other in &others {
        if overlaps(start_min, end_min, other.start_min, other.end_min)? {
            return Err(AppError::ShiftOverlap { shift_id: other.id });
        }
    }
    Ok(())
}
