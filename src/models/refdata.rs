use serde::Serialize;

// Reference data consumed read-only by the scheduling core. Rows are created
// by seeding and administrative tooling outside the booking flow.

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mechanic {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    pub id: i64,
    pub customer_id: i64,
    pub plate_no: String,
    pub brand: Option<String>,
    pub model: Option<String>,
}
