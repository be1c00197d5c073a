use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BusyRange, Slot, SlotsResult, WorkShift};
use crate::services::duration::{estimate_initial, load_active_services};
use crate::services::overlap::overlaps;

/// Computes bookable slots on a date for the requested services.
///
/// With a mechanic id the result is that mechanic's free starts, ascending.
/// Without one, candidate starts from every mechanic's shifts are merged and
/// each slot lists which mechanics are free at that start.
pub fn compute_slots(
    conn: &Connection,
    date: NaiveDate,
    mechanic_id: Option<i64>,
    service_ids: &[i64],
    fallback_block_min: i64,
) -> Result<SlotsResult, AppError> {
    if service_ids.is_empty() {
        return Err(AppError::Validation(
            "service_ids must not be empty".to_string(),
        ));
    }

    let services = load_active_services(conn, service_ids)?;
    let estimate = estimate_initial(&services)?;

    let shifts = queries::get_shifts_on_date(conn, &date, mechanic_id)?;
    if shifts.is_empty() {
        return Ok(SlotsResult {
            duration_min: estimate.minutes,
            slots: vec![],
        });
    }

    let day_start = date.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);

    let mut busy_by_mechanic: BTreeMap<i64, Vec<BusyRange>> = BTreeMap::new();
    for shift in &shifts {
        if !busy_by_mechanic.contains_key(&shift.mechanic_id) {
            let ranges =
                queries::get_busy_ranges(conn, shift.mechanic_id, &day_start, &day_end, None)?;
            busy_by_mechanic.insert(shift.mechanic_id, ranges);
        }
    }

    let duration = Duration::minutes(estimate.minutes);

    let slots = if mechanic_id.is_some() {
        // Shifts of one mechanic are disjoint and ordered by start, so the
        // collected starts come out ascending without a re-sort.
        let mut slots = vec![];
        for shift in &shifts {
            let busy = busy_by_mechanic
                .get(&shift.mechanic_id)
                .map(|ranges| ranges.as_slice())
                .unwrap_or(&[]);
            for start in free_starts(shift, estimate.minutes, busy, fallback_block_min)? {
                slots.push(Slot {
                    start,
                    end: start + duration,
                    mechanic_id: Some(shift.mechanic_id),
                    free_mechanics: None,
                });
            }
        }
        slots
    } else {
        let mut by_start: BTreeMap<NaiveDateTime, BTreeSet<i64>> = BTreeMap::new();
        for shift in &shifts {
            let busy = busy_by_mechanic
                .get(&shift.mechanic_id)
                .map(|ranges| ranges.as_slice())
                .unwrap_or(&[]);
            for start in free_starts(shift, estimate.minutes, busy, fallback_block_min)? {
                by_start.entry(start).or_default().insert(shift.mechanic_id);
            }
        }
        by_start
            .into_iter()
            .map(|(start, mechanics)| Slot {
                start,
                end: start + duration,
                mechanic_id: None,
                free_mechanics: Some(mechanics.into_iter().collect()),
            })
            .collect()
    };

    Ok(SlotsResult {
        duration_min: estimate.minutes,
        slots,
    })
}

/// Candidate starts inside one shift that fit the duration and clear every
/// busy range. Candidates step through the shift grid and must end within it.
fn free_starts(
    shift: &WorkShift,
    duration_min: i64,
    busy: &[BusyRange],
    fallback_block_min: i64,
) -> Result<Vec<NaiveDateTime>, AppError> {
    let day_start = shift.work_date.and_time(NaiveTime::MIN);
    let mut starts = vec![];

    let mut minute = shift.start_min;
    while minute + duration_min <= shift.end_min {
        let start = day_start + Duration::minutes(minute);
        let end = start + Duration::minutes(duration_min);

        let mut free = true;
        for range in busy {
            if overlaps(start, end, range.start, range.end_or(fallback_block_min))? {
                free = false;
                break;
            }
        }
        if free {
            starts.push(start);
        }
        minute += shift.step_min;
    }

    Ok(starts)
}
