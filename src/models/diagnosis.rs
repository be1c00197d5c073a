use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One required-part entry. The persisted wire shape is
/// `{"partId": <i64>, "quantity": <i64>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRequirement {
    #[serde(rename = "partId")]
    pub part_id: i64,
    pub quantity: i64,
}

/// A mechanic's findings for one booking. At most one row per booking.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub id: i64,
    pub booking_id: i64,
    pub note: Option<String>,
    pub eta_min: Option<i64>,
    pub labor_est_min: Option<i64>,
    pub required_parts: Vec<PartRequirement>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
