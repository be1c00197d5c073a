use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceKind {
    /// Fixed duration, known up front.
    Quick,
    /// Duration unknown until a mechanic has diagnosed the vehicle.
    Repair,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Quick => "QUICK",
            ServiceKind::Repair => "REPAIR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUICK" => Some(ServiceKind::Quick),
            "REPAIR" => Some(ServiceKind::Repair),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub kind: ServiceKind,
    pub default_duration_min: Option<i64>,
    pub base_price: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub price: Decimal,
    pub is_active: bool,
}

/// Default part consumption for a QUICK service, applied when work starts.
#[derive(Debug, Clone, Serialize)]
pub struct ServicePartMapping {
    pub id: i64,
    pub service_id: i64,
    pub part_id: i64,
    pub qty_per_service: i64,
}
