use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A mechanic's working window on one calendar date. `start_min` and
/// `end_min` are minutes from midnight; `step_min` is the slot granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkShift {
    pub id: i64,
    pub mechanic_id: i64,
    pub work_date: NaiveDate,
    pub start_min: i64,
    pub end_min: i64,
    pub step_min: i64,
}
