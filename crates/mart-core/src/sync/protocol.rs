//! Wire types shared by the upstream service and the replicas.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Branch, EntityKind, Product, Sale, SaleItem, StockOpname, StockOpnameItem,
};
use crate::util::epoch;

/// Rows of all six syncable entity kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub sale_items: Vec<SaleItem>,
    #[serde(default)]
    pub stock_opnames: Vec<StockOpname>,
    #[serde(default)]
    pub stock_opname_items: Vec<StockOpnameItem>,
}

impl EntitySet {
    pub fn len(&self) -> usize {
        EntityKind::APPLY_ORDER
            .into_iter()
            .map(|kind| self.count(kind))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Branch => self.branches.len(),
            EntityKind::Product => self.products.len(),
            EntityKind::Sale => self.sales.len(),
            EntityKind::SaleItem => self.sale_items.len(),
            EntityKind::StockOpname => self.stock_opnames.len(),
            EntityKind::StockOpnameItem => self.stock_opname_items.len(),
        }
    }
}

/// Body of `POST /api/sync/upload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    #[serde(default)]
    pub branch_id: String,
    #[serde(flatten)]
    pub rows: EntitySet,
}

/// Body of a `GET /api/sync/changes` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(flatten)]
    pub rows: EntitySet,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Parameters of `GET /api/sync/changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesQuery {
    pub since: Option<DateTime<Utc>>,
    pub branch_id: Option<String>,
}

/// Raised for a `since` value that is not RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid since")]
pub struct InvalidSince;

impl ChangesQuery {
    /// Build a query from raw query-string values. Blank values count as absent.
    pub fn parse(since: Option<&str>, branch_id: Option<&str>) -> Result<Self, InvalidSince> {
        let since = match since.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| InvalidSince)?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        let branch_id = branch_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);
        Ok(Self { since, branch_id })
    }

    /// Lower bound of the change predicate; absent means the epoch.
    pub fn since_or_epoch(&self) -> DateTime<Utc> {
        self.since.unwrap_or_else(epoch)
    }

    /// Query-string pairs for the HTTP transport.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(since) = self.since {
            pairs.push(("since", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(branch_id) = &self.branch_id {
            pairs.push(("branch_id", branch_id.clone()));
        }
        pairs
    }
}
