//! Row-by-row application of entity sets against a local store.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::protocol::EntitySet;
use crate::db::sync_store::{self, UpsertOutcome, UpsertPolicy};
use crate::db::SyncEntity;
use crate::models::EntityKind;
use crate::Result;

/// How incoming rows are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Upstream receiving a replica's batch: tombstones are deleted outright
    /// and the copy applied last wins.
    Ingest,
    /// Replica receiving upstream changes: tombstones are kept until pruned
    /// and rows with pending local edits are left for the next upload.
    Download,
}

impl ApplyMode {
    const fn policy(self) -> UpsertPolicy {
        match self {
            Self::Ingest => UpsertPolicy::LastApplied,
            Self::Download => UpsertPolicy::KeepPending,
        }
    }
}

/// One row that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub entity: EntityKind,
    pub id: String,
    pub error: String,
}

/// Outcome of applying an [`EntitySet`].
///
/// `conflicts` counts rows recorded in the conflict log, whether or not the
/// incoming copy landed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub deleted: usize,
    pub conflicts: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RowFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Every dirty row in the store.
pub fn collect_dirty(conn: &Connection) -> Result<EntitySet> {
    Ok(EntitySet {
        branches: sync_store::select_dirty(conn)?,
        products: sync_store::select_dirty(conn)?,
        sales: sync_store::select_dirty(conn)?,
        sale_items: sync_store::select_dirty(conn)?,
        stock_opnames: sync_store::select_dirty(conn)?,
        stock_opname_items: sync_store::select_dirty(conn)?,
    })
}

/// Rows touched at or after `since`.
pub fn changes_since(
    conn: &Connection,
    since: DateTime<Utc>,
    branch_id: Option<&str>,
) -> Result<EntitySet> {
    Ok(EntitySet {
        branches: sync_store::select_changed_since(conn, since, branch_id)?,
        products: sync_store::select_changed_since(conn, since, branch_id)?,
        sales: sync_store::select_changed_since(conn, since, branch_id)?,
        sale_items: sync_store::select_changed_since(conn, since, branch_id)?,
        stock_opnames: sync_store::select_changed_since(conn, since, branch_id)?,
        stock_opname_items: sync_store::select_changed_since(conn, since, branch_id)?,
    })
}

/// Mark uploaded rows clean, one entity kind at a time.
///
/// A failing kind is logged and stays dirty for the next cycle.
pub fn mark_uploaded(conn: &Connection, rows: &EntitySet) -> usize {
    mark_kind(conn, &rows.branches)
        + mark_kind(conn, &rows.products)
        + mark_kind(conn, &rows.sales)
        + mark_kind(conn, &rows.sale_items)
        + mark_kind(conn, &rows.stock_opnames)
        + mark_kind(conn, &rows.stock_opname_items)
}

fn mark_kind<E: SyncEntity>(conn: &Connection, rows: &[E]) -> usize {
    if rows.is_empty() {
        return 0;
    }
    match sync_store::mark_synced(conn, rows) {
        Ok(marked) => marked,
        Err(err) => {
            tracing::warn!(entity = %E::KIND, rows = rows.len(), "Failed to mark rows synced: {err}");
            0
        }
    }
}

/// Apply incoming rows parent-first. Every row is attempted; failures are collected.
pub fn apply_rows(conn: &Connection, rows: EntitySet, mode: ApplyMode) -> ApplyReport {
    let EntitySet {
        branches,
        products,
        sales,
        sale_items,
        stock_opnames,
        stock_opname_items,
    } = rows;

    let mut report = ApplyReport::default();
    apply_kind(conn, branches, mode, &mut report);
    apply_kind(conn, products, mode, &mut report);
    apply_kind(conn, sales, mode, &mut report);
    apply_kind(conn, sale_items, mode, &mut report);
    apply_kind(conn, stock_opnames, mode, &mut report);
    apply_kind(conn, stock_opname_items, mode, &mut report);
    report
}

fn apply_kind<E: SyncEntity>(
    conn: &Connection,
    rows: Vec<E>,
    mode: ApplyMode,
    report: &mut ApplyReport,
) {
    for mut row in rows {
        row.meta_mut().synced = true;
        let result = if mode == ApplyMode::Ingest && row.meta().is_deleted {
            sync_store::delete_row(conn, E::KIND, row.id()).map(|count| report.deleted += count)
        } else {
            sync_store::upsert(conn, &row, mode.policy()).map(|outcome| match outcome {
                UpsertOutcome::Applied => report.applied += 1,
                UpsertOutcome::ReplacedNewer => {
                    report.applied += 1;
                    report.conflicts += 1;
                }
                UpsertOutcome::KeptPending => report.conflicts += 1,
            })
        };

        if let Err(err) = result {
            tracing::warn!(entity = %E::KIND, id = row.id(), "Failed to apply row: {err}");
            report.failures.push(RowFailure {
                entity: E::KIND,
                id: row.id().to_string(),
                error: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sync_store::find;
    use crate::db::Database;
    use crate::models::{Product, Sale, SaleItem, SyncMeta};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn product(id: &str, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Produk {id}"),
            unit: "pcs".to_string(),
            stock,
            price: 10.0,
            price_investor: 8.0,
            price_shosha: 9.0,
            branch_id: "cabang-1".to_string(),
            meta: SyncMeta::new_local(),
        }
    }

    fn sale(id: &str) -> Sale {
        Sale {
            id: id.to_string(),
            receipt_no: "240501080000".to_string(),
            branch_id: "cabang-1".to_string(),
            branch_name: String::new(),
            payment_method: "cash".to_string(),
            notes: String::new(),
            total: 10.0,
            meta: SyncMeta::new_local(),
        }
    }

    fn item(id: &str, sale_id: &str) -> SaleItem {
        SaleItem {
            id: id.to_string(),
            sale_id: sale_id.to_string(),
            product_id: "p-1".to_string(),
            qty: 1,
            price: 10.0,
            meta: SyncMeta::new_local(),
        }
    }

    #[test]
    fn download_forces_synced_and_keeps_tombstones() {
        let db = Database::open_in_memory().unwrap();
        let mut gone = product("p-2", 0);
        gone.meta.tombstone();

        let report = apply_rows(
            db.connection(),
            EntitySet {
                products: vec![product("p-1", 5), gone],
                ..EntitySet::default()
            },
            ApplyMode::Download,
        );

        assert_eq!(report.applied, 2);
        assert!(report.is_clean());
        let stored: Product = find(db.connection(), "p-2").unwrap().unwrap();
        assert!(stored.meta.synced);
        assert!(stored.meta.is_deleted);
        assert_eq!(collect_dirty(db.connection()).unwrap().len(), 0);
    }

    #[test]
    fn ingest_deletes_tombstones_and_absent_rows_are_noops() {
        let db = Database::open_in_memory().unwrap();
        apply_rows(
            db.connection(),
            EntitySet {
                sales: vec![sale("s-1")],
                sale_items: vec![item("i-1", "s-1")],
                ..EntitySet::default()
            },
            ApplyMode::Ingest,
        );

        let mut deleted = sale("s-1");
        deleted.meta.tombstone();
        let mut missing = sale("s-404");
        missing.meta.tombstone();
        let report = apply_rows(
            db.connection(),
            EntitySet {
                sales: vec![deleted, missing],
                ..EntitySet::default()
            },
            ApplyMode::Ingest,
        );

        assert!(report.is_clean());
        assert_eq!(report.deleted, 2);
        assert!(find::<Sale>(db.connection(), "s-1").unwrap().is_none());
        assert!(find::<SaleItem>(db.connection(), "i-1").unwrap().is_none());
    }

    #[test]
    fn failures_are_collected_and_remaining_rows_applied() {
        let db = Database::open_in_memory().unwrap();
        let report = apply_rows(
            db.connection(),
            EntitySet {
                sale_items: vec![item("orphan", "no-such-sale")],
                products: vec![product("p-1", 3)],
                ..EntitySet::default()
            },
            ApplyMode::Download,
        );

        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, EntityKind::SaleItem);
        assert_eq!(report.failures[0].id, "orphan");
    }

    #[test]
    fn ingest_applies_older_copy_arriving_last() {
        let db = Database::open_in_memory().unwrap();
        let newer = product("p-1", 7);
        let mut older = newer.clone();
        older.stock = 1;
        older.meta.updated_at = newer.meta.updated_at - Duration::seconds(5);

        for rows in [vec![newer], vec![older]] {
            apply_rows(
                db.connection(),
                EntitySet {
                    products: rows,
                    ..EntitySet::default()
                },
                ApplyMode::Ingest,
            );
        }

        let stored: Product = find(db.connection(), "p-1").unwrap().unwrap();
        assert_eq!(stored.stock, 1);
        assert_eq!(sync_store::list_conflicts(db.connection(), 5).unwrap().len(), 1);
    }

    #[test]
    fn download_keeps_pending_local_edit() {
        let db = Database::open_in_memory().unwrap();
        let local = product("p-1", 7);
        sync_store::save(db.connection(), &local).unwrap();
        let mut upstream = local.clone();
        upstream.stock = 2;
        upstream.meta.updated_at = local.meta.updated_at + Duration::seconds(5);

        let report = apply_rows(
            db.connection(),
            EntitySet {
                products: vec![upstream],
                ..EntitySet::default()
            },
            ApplyMode::Download,
        );

        assert_eq!(report.applied, 0);
        assert_eq!(report.conflicts, 1);
        assert!(report.is_clean());
        let stored: Product = find(db.connection(), "p-1").unwrap().unwrap();
        assert_eq!(stored.stock, 7);
        assert!(!stored.meta.synced);
    }

    #[test]
    fn mark_uploaded_skips_rows_changed_since_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let mut first = product("p-1", 1);
        sync_store::save(conn, &first).unwrap();
        sync_store::save(conn, &product("p-2", 2)).unwrap();

        let snapshot = collect_dirty(conn).unwrap();
        first.meta.touch();
        first.stock = 9;
        sync_store::save(conn, &first).unwrap();

        assert_eq!(mark_uploaded(conn, &snapshot), 1);
        let dirty = collect_dirty(conn).unwrap();
        assert_eq!(dirty.products.len(), 1);
        assert_eq!(dirty.products[0].id, "p-1");
    }
}
