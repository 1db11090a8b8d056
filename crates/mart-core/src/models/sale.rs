//! Sale models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SyncMeta;

/// A checkout transaction header. `total` tracks its live items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    #[serde(default)]
    pub receipt_no: String,
    #[serde(default)]
    pub branch_id: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub total: f64,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    #[serde(default)]
    pub qty: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl SaleItem {
    pub fn line_total(&self) -> f64 {
        line_total(self.qty, self.price)
    }
}

#[allow(clippy::cast_precision_loss)] // quantities stay far below 2^52
pub(crate) fn line_total(qty: i64, price: f64) -> f64 {
    qty as f64 * price
}

/// Sale header with its live items, as returned by the local API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    /// Sold on credit.
    Hutang,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Hutang => "hutang",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = crate::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "cash" => Ok(Self::Cash),
            "hutang" => Ok(Self::Hutang),
            other => Err(crate::Error::invalid(format!(
                "payment_method must be cash or hutang, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    #[serde(default)]
    pub id: Option<String>,
    /// Generated from the local clock when absent.
    #[serde(default)]
    pub receipt_no: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub items: Vec<NewSaleItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: String,
    pub qty: i64,
    /// Zero or absent means the product's list price.
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleItemUpdate {
    pub qty: Option<i64>,
    pub price: Option<f64>,
}
