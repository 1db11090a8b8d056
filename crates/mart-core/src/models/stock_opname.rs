//! Stock-take models

use serde::{Deserialize, Serialize};

use super::SyncMeta;

/// A stock-take session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockOpname {
    pub id: String,
    #[serde(default)]
    pub branch_id: String,
    #[serde(default)]
    pub performed_by: String,
    #[serde(default)]
    pub note: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// One counted product. Applying it overwrites the product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOpnameItem {
    pub id: String,
    pub stock_opname_id: String,
    pub product_id: String,
    #[serde(default)]
    pub system_qty: i64,
    #[serde(default)]
    pub physical_qty: i64,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockOpnameWithItems {
    #[serde(flatten)]
    pub opname: StockOpname,
    pub items: Vec<StockOpnameItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockOpname {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub performed_by: String,
    #[serde(default)]
    pub note: String,
    pub items: Vec<NewStockOpnameItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockOpnameItem {
    pub product_id: String,
    pub physical_qty: i64,
}
