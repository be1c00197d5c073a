use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingServiceLine, Service, ServiceKind};

/// Minutes reserved for the diagnosis visit when a booking includes repair
/// work whose real duration is not yet known.
pub const DIAGNOSIS_PLACEHOLDER_MIN: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialEstimate {
    pub minutes: i64,
    pub has_repair_component: bool,
}

/// Duration reserved at booking time: the sum of quick-service default
/// durations, plus the diagnosis placeholder when any repair service is
/// requested. Quick services without a positive default duration cannot be
/// scheduled.
pub fn estimate_initial(services: &[Service]) -> Result<InitialEstimate, AppError> {
    let mut minutes = 0;
    let mut has_repair_component = false;

    for service in services {
        match service.kind {
            ServiceKind::Quick => match service.default_duration_min {
                Some(d) if d > 0 => minutes += d,
                _ => return Err(AppError::ServiceDurationMissing(service.id)),
            },
            ServiceKind::Repair => has_repair_component = true,
        }
    }

    if has_repair_component {
        minutes += DIAGNOSIS_PLACEHOLDER_MIN;
    }

    Ok(InitialEstimate {
        minutes,
        has_repair_component,
    })
}

/// Duration after diagnosis: quick work as originally reserved plus the
/// mechanic's labor estimate for the repair itself.
pub fn estimate_final(quick_minutes: i64, labor_est_min: Option<i64>) -> i64 {
    quick_minutes + labor_est_min.unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMinutes {
    pub quick_minutes: i64,
    pub has_repair_component: bool,
}

/// Reads the quick-service minutes a booking reserved from its own line
/// snapshots. Lines without a duration snapshot are repair components, whose
/// time is estimated separately. Later catalog edits never change the result.
pub fn snapshot_minutes(lines: &[BookingServiceLine]) -> SnapshotMinutes {
    let mut quick_minutes = 0;
    let mut has_repair_component = false;

    for line in lines {
        match line.duration_snapshot_min {
            Some(d) => quick_minutes += d * line.qty,
            None => has_repair_component = true,
        }
    }

    SnapshotMinutes {
        quick_minutes,
        has_repair_component,
    }
}

/// Resolves the requested service ids against the active catalog, reporting
/// any id that does not resolve. Duplicate ids are requested once.
pub(crate) fn load_active_services(
    conn: &Connection,
    service_ids: &[i64],
) -> Result<Vec<Service>, AppError> {
    let mut ids: Vec<i64> = service_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let services = queries::get_services_by_ids(conn, &ids)?;
    if services.len() != ids.len() {
        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !services.iter().any(|s| s.id == *id))
            .collect();
        return Err(AppError::ServiceNotFound(missing));
    }
    Ok(services)
}
