use serde::{Deserialize, Serialize};

/// Stock level joined with part data, for the admin inventory view.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryLevel {
    pub part_id: i64,
    pub part_name: String,
    pub sku: String,
    pub qty: i64,
    pub min_qty: i64,
    pub low: bool,
}

/// One line of a stock-receiving event.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptItem {
    pub part_id: i64,
    pub quantity: i64,
}
