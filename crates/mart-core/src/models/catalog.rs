//! Branch and product models

use serde::{Deserialize, Serialize};

use super::SyncMeta;

/// A store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl Branch {
    /// Placeholder row for a branch referenced before it was ever created locally.
    pub fn stub(id: &str) -> Self {
        Self {
            id: id.to_string(),
            code: id.to_string(),
            name: id.to_string(),
            address: String::new(),
            phone: String::new(),
            meta: SyncMeta::new_local(),
        }
    }
}

/// An inventory item, with the three price tiers the mart sells at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub price_investor: f64,
    #[serde(default)]
    pub price_shosha: f64,
    #[serde(default)]
    pub branch_id: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBranch {
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchUpdate {
    pub code: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub stock: i64,
    pub price: f64,
    #[serde(default)]
    pub price_investor: f64,
    #[serde(default)]
    pub price_shosha: f64,
    /// Defaults to the replica's own branch.
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub stock: Option<i64>,
    pub price: Option<f64>,
    pub price_investor: Option<f64>,
    pub price_shosha: Option<f64>,
    pub branch_id: Option<String>,
}
