//! Shared database service wrapper used by both binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::sync_store::{self, PruneReport};
use crate::db::{
    Database, LedgerRepository, SqliteLedgerRepository, SqliteSyncStateRepository,
    SyncStateRepository,
};
use crate::models::{
    Branch, BranchUpdate, EntityKind, NewBranch, NewProduct, NewSale, NewSaleItem,
    NewStockOpname, Product, ProductUpdate, Sale, SaleItem, SaleItemUpdate, SaleWithItems,
    StockOpnameWithItems, SyncConflict,
};
use crate::sync::apply::{self, ApplyMode};
use crate::sync::{ApplyReport, ChangeSet, EntitySet};
use crate::util::now_millis;
use crate::Result;

const DEFAULT_BRANCH: &str = "local";

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    default_branch: Arc<str>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Opened local store");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            default_branch: Arc::from(DEFAULT_BRANCH),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            default_branch: Arc::from(DEFAULT_BRANCH),
        })
    }

    /// Branch id used when a ledger write omits one.
    #[must_use]
    pub fn with_default_branch(mut self, branch_id: &str) -> Self {
        self.default_branch = Arc::from(branch_id);
        self
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Display form of the store location.
    pub fn db_path_display(&self) -> String {
        self.db_path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string())
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// List live branches.
    pub async fn list_branches(&self) -> Result<Vec<Branch>> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.list_branches()
    }

    /// Create a branch.
    pub async fn create_branch(&self, input: NewBranch) -> Result<Branch> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.create_branch(input)
    }

    /// Update a branch.
    pub async fn update_branch(&self, id: &str, update: BranchUpdate) -> Result<Branch> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.update_branch(id, update)
    }

    /// Soft-delete a branch.
    pub async fn delete_branch(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.delete_branch(id)
    }

    /// List live products by name.
    pub async fn list_products(&self, limit: usize, offset: usize) -> Result<Vec<Product>> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.list_products(limit, offset)
    }

    /// Fetch a live product by id.
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.get_product(id)
    }

    /// Create a product.
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.create_product(input)
    }

    /// Update a product.
    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> Result<Product> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.update_product(id, update)
    }

    /// Soft-delete a product.
    pub async fn delete_product(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.delete_product(id)
    }

    /// List live sales newest-first.
    pub async fn list_sales(&self, limit: usize, offset: usize) -> Result<Vec<Sale>> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.list_sales(limit, offset)
    }

    /// Fetch a live sale with its items.
    pub async fn get_sale(&self, id: &str) -> Result<Option<SaleWithItems>> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.get_sale(id)
    }

    /// Record a sale.
    pub async fn create_sale(&self, input: NewSale) -> Result<SaleWithItems> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.create_sale(input)
    }

    /// Append an item to a sale.
    pub async fn add_sale_item(&self, sale_id: &str, input: NewSaleItem) -> Result<SaleItem> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.add_sale_item(sale_id, input)
    }

    /// Change a sale item.
    pub async fn update_sale_item(
        &self,
        item_id: &str,
        update: SaleItemUpdate,
    ) -> Result<SaleItem> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.update_sale_item(item_id, update)
    }

    /// Soft-delete a sale item.
    pub async fn delete_sale_item(&self, item_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.delete_sale_item(item_id)
    }

    /// Soft-delete a sale and its items.
    pub async fn delete_sale(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.delete_sale(id)
    }

    /// Record a stock-take.
    pub async fn create_stock_opname(&self, input: NewStockOpname) -> Result<StockOpnameWithItems> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.create_stock_opname(input)
    }

    /// Soft-delete a stock-take.
    pub async fn delete_stock_opname(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteLedgerRepository::new(db.connection(), &self.default_branch);
        repo.delete_stock_opname(id)
    }

    /// Snapshot of every dirty row.
    pub async fn collect_dirty(&self) -> Result<EntitySet> {
        let db = self.db.lock().await;
        apply::collect_dirty(db.connection())
    }

    /// Mark an acknowledged upload clean. Failures are logged per entity kind.
    pub async fn mark_uploaded(&self, rows: &EntitySet) -> usize {
        let db = self.db.lock().await;
        apply::mark_uploaded(db.connection(), rows)
    }

    /// Hard-delete acknowledged tombstones.
    pub async fn prune_tombstones(&self) -> Result<PruneReport> {
        let db = self.db.lock().await;
        let report = sync_store::prune_tombstones(db.connection())?;
        if report.total() > 0 {
            tracing::info!(rows = report.total(), "Pruned acknowledged tombstones");
        }
        Ok(report)
    }

    /// Apply rows pulled from upstream as already-synced copies.
    pub async fn apply_download(&self, rows: EntitySet) -> ApplyReport {
        let db = self.db.lock().await;
        apply::apply_rows(db.connection(), rows, ApplyMode::Download)
    }

    /// Apply an uploaded batch: tombstones delete, everything else upserts.
    pub async fn apply_upload(&self, rows: EntitySet) -> ApplyReport {
        let db = self.db.lock().await;
        apply::apply_rows(db.connection(), rows, ApplyMode::Ingest)
    }

    /// Rows changed at or after `since`, sale tables scoped to `branch_id`.
    pub async fn changes_since(
        &self,
        since: DateTime<Utc>,
        branch_id: Option<&str>,
    ) -> Result<EntitySet> {
        let db = self.db.lock().await;
        apply::changes_since(db.connection(), since, branch_id)
    }

    /// Change set with `last_sync_at` read under the store lock before the
    /// queries run. Any write landing after the read gets a receipt stamp at
    /// or past it and is served again by the next pull.
    pub async fn change_set(
        &self,
        since: DateTime<Utc>,
        branch_id: Option<&str>,
    ) -> Result<ChangeSet> {
        let db = self.db.lock().await;
        let now = now_millis();
        let rows = apply::changes_since(db.connection(), since, branch_id)?;
        Ok(ChangeSet {
            rows,
            last_sync_at: Some(now),
        })
    }

    /// Current download watermark.
    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        SqliteSyncStateRepository::new(db.connection()).last_sync_at()
    }

    /// Advance the download watermark, never backwards.
    pub async fn advance_watermark(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let db = self.db.lock().await;
        SqliteSyncStateRepository::new(db.connection()).advance(at)
    }

    /// Dirty rows across all six entity kinds.
    pub async fn queued_changes(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let mut total = 0;
        for kind in EntityKind::APPLY_ORDER {
            total += sync_store::count_dirty(db.connection(), kind)?;
        }
        Ok(total)
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        sync_store::list_conflicts(db.connection(), limit)
    }
}
