use chrono::NaiveDateTime;
use serde::Serialize;

/// A candidate booking start. When the query named a mechanic, `mechanic_id`
/// is set; in "any mechanic" mode `free_mechanics` lists everyone free at
/// this instant instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanic_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_mechanics: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotsResult {
    pub duration_min: i64,
    pub slots: Vec<Slot>,
}
