use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All timestamps are naive UTC, stored as `YYYY-MM-DD HH:MM:SS` text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub customer_id: i64,
    pub vehicle_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub start_dt: NaiveDateTime,
    /// Exclusive end; None until a duration is known.
    pub end_dt: Option<NaiveDateTime>,
    pub status: BookingStatus,
    pub notes_customer: Option<String>,
    pub notes_mechanic: Option<String>,
    /// Idempotency guard: inventory has already been reserved for this booking.
    pub stock_deducted: bool,
    pub total_services: Option<Decimal>,
    pub total_parts: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Approved,
    InDiagnosis,
    InProgress,
    Done,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::InDiagnosis => "IN_DIAGNOSIS",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Done => "DONE",
            BookingStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "APPROVED" => Some(BookingStatus::Approved),
            "IN_DIAGNOSIS" => Some(BookingStatus::InDiagnosis),
            "IN_PROGRESS" => Some(BookingStatus::InProgress),
            "DONE" => Some(BookingStatus::Done),
            "CANCELED" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Done | BookingStatus::Canceled)
    }

    /// Blocking statuses occupy a mechanic's calendar and are conflict-checked.
    pub fn is_blocking(&self) -> bool {
        !self.is_terminal()
    }
}

/// One selected service on a booking, with price and (for fixed-duration
/// services) duration captured at booking time. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct BookingServiceLine {
    pub id: i64,
    pub booking_id: i64,
    pub service_id: i64,
    pub qty: i64,
    pub price_snapshot: Decimal,
    pub duration_snapshot_min: Option<i64>,
}

/// One part consumed by a booking, snapshotted when work starts.
#[derive(Debug, Clone, Serialize)]
pub struct BookingPartLine {
    pub id: i64,
    pub booking_id: i64,
    pub part_id: i64,
    pub qty: i64,
    pub price_snapshot: Decimal,
}

/// A blocking booking's occupied window, as loaded for conflict checks.
#[derive(Debug, Clone)]
pub struct BusyRange {
    pub booking_id: i64,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl BusyRange {
    /// A booking without a known end occupies a fixed fallback window.
    pub fn end_or(&self, fallback_min: i64) -> NaiveDateTime {
        self.end
            .unwrap_or(self.start + Duration::minutes(fallback_min))
    }
}
