//! Data models for Shosha Mart

mod catalog;
mod meta;
mod sale;
mod stock_opname;
mod sync_conflict;

pub use catalog::{Branch, BranchUpdate, NewBranch, NewProduct, Product, ProductUpdate};
pub use meta::SyncMeta;
pub use sale::{
    NewSale, NewSaleItem, PaymentMethod, Sale, SaleItem, SaleItemUpdate, SaleWithItems,
};
pub use stock_opname::{
    NewStockOpname, NewStockOpnameItem, StockOpname, StockOpnameItem, StockOpnameWithItems,
};
pub use sync_conflict::SyncConflict;

use serde::{Deserialize, Serialize};

/// The six syncable entity kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Branch,
    Product,
    Sale,
    SaleItem,
    StockOpname,
    StockOpnameItem,
}

impl EntityKind {
    /// Parents before children, the order rows are applied in.
    pub const APPLY_ORDER: [Self; 6] = [
        Self::Branch,
        Self::Product,
        Self::Sale,
        Self::SaleItem,
        Self::StockOpname,
        Self::StockOpnameItem,
    ];

    /// Children before parents, the order tombstones are hard-deleted in.
    pub const PRUNE_ORDER: [Self; 6] = [
        Self::SaleItem,
        Self::StockOpnameItem,
        Self::Sale,
        Self::StockOpname,
        Self::Product,
        Self::Branch,
    ];

    /// Inverse of [`EntityKind::table`].
    pub fn from_table(table: &str) -> Option<Self> {
        Self::APPLY_ORDER
            .into_iter()
            .find(|kind| kind.table() == table)
    }

    /// Backing table, which is also the key used in sync payloads.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Branch => "branches",
            Self::Product => "products",
            Self::Sale => "sales",
            Self::SaleItem => "sale_items",
            Self::StockOpname => "stock_opnames",
            Self::StockOpnameItem => "stock_opname_items",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}
