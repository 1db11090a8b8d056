//! Generic sync operations over any [`SyncEntity`].
//!
//! Everything here works on one entity kind at a time and is shared by the
//! upstream service and the branch replicas.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::entity::SyncEntity;
use crate::error::Result;
use crate::models::{EntityKind, SyncConflict};

/// How an incoming copy treats the stored row with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Always overwrite; the copy applied last wins.
    LastApplied,
    /// Overwrite only clean rows; a pending local edit is kept for upload.
    KeepPending,
}

/// What happened to one upserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Inserted, or overwrote the stored copy.
    Applied,
    /// Overwrote a stored copy carrying a newer `updated_at`; logged.
    ReplacedNewer,
    /// The stored row has unsynced local edits and was left alone; logged.
    KeptPending,
}

/// Hard-deleted tombstones per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub sale_items: usize,
    pub stock_opname_items: usize,
    pub sales: usize,
    pub stock_opnames: usize,
    pub products: usize,
    pub branches: usize,
}

impl PruneReport {
    pub const fn total(&self) -> usize {
        self.sale_items
            + self.stock_opname_items
            + self.sales
            + self.stock_opnames
            + self.products
            + self.branches
    }

    fn record(&mut self, kind: EntityKind, count: usize) {
        let slot = match kind {
            EntityKind::SaleItem => &mut self.sale_items,
            EntityKind::StockOpnameItem => &mut self.stock_opname_items,
            EntityKind::Sale => &mut self.sales,
            EntityKind::StockOpname => &mut self.stock_opnames,
            EntityKind::Product => &mut self.products,
            EntityKind::Branch => &mut self.branches,
        };
        *slot += count;
    }
}

pub(crate) fn query_rows<E: SyncEntity>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<E>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, E::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Fetch one row by id, tombstones included.
pub fn find<E: SyncEntity>(conn: &Connection, id: &str) -> Result<Option<E>> {
    let sql = format!("{} WHERE id = ?1", E::select_sql());
    Ok(conn.query_row(&sql, [id], E::from_row).optional()?)
}

/// Rows awaiting upload.
pub fn select_dirty<E: SyncEntity>(conn: &Connection) -> Result<Vec<E>> {
    let sql = format!("{} WHERE synced = 0 ORDER BY updated_at, id", E::select_sql());
    query_rows(conn, &sql, [])
}

pub fn count_dirty(conn: &Connection, kind: EntityKind) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE synced = 0", kind.table());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Branch predicate for the sale-scoped tables.
const fn branch_scope(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Sale => Some("branch_id = ?2"),
        EntityKind::SaleItem => Some("sale_id IN (SELECT id FROM sales WHERE branch_id = ?2)"),
        _ => None,
    }
}

/// Receipt stamp taken from this store's clock whenever a row is written.
pub(crate) const CHANGED_AT: &str = "changed_at";

/// Rows this store received, created or updated at or after `since`,
/// optionally scoped to a branch.
///
/// `changed_at` catches rows that arrive late with old client timestamps.
pub fn select_changed_since<E: SyncEntity>(
    conn: &Connection,
    since: DateTime<Utc>,
    branch_id: Option<&str>,
) -> Result<Vec<E>> {
    let since_ms = since.timestamp_millis();
    let base = format!(
        "{} WHERE ({CHANGED_AT} >= ?1 OR updated_at >= ?1 OR created_at >= ?1)",
        E::select_sql()
    );
    match (branch_scope(E::KIND), branch_id) {
        (Some(scope), Some(branch_id)) => {
            let sql = format!("{base} AND {scope} ORDER BY {CHANGED_AT}, id");
            query_rows(conn, &sql, params![since_ms, branch_id])
        }
        _ => {
            let sql = format!("{base} ORDER BY {CHANGED_AT}, id");
            query_rows(conn, &sql, params![since_ms])
        }
    }
}

fn upsert_sql<E: SyncEntity>(policy: UpsertPolicy) -> String {
    let mut columns = E::columns();
    columns.push(CHANGED_AT);
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let assignments = columns
        .iter()
        .skip(1)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let table = E::KIND.table();
    let guard = match policy {
        UpsertPolicy::KeepPending => format!(" WHERE {table}.synced = 1"),
        UpsertPolicy::LastApplied => String::new(),
    };
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) \
         ON CONFLICT(id) DO UPDATE SET {assignments}{guard}",
        columns.join(", ")
    )
}

fn write_row<E: SyncEntity>(
    conn: &Connection,
    row: &E,
    policy: UpsertPolicy,
) -> Result<usize> {
    let mut values = row.values();
    values.push(Value::Integer(Utc::now().timestamp_millis()));
    Ok(conn.execute(&upsert_sql::<E>(policy), params_from_iter(values))?)
}

fn stored_updated_at<E: SyncEntity>(conn: &Connection, id: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            &format!("SELECT updated_at FROM {} WHERE id = ?1", E::KIND.table()),
            [id],
            |r| r.get(0),
        )
        .optional()?)
}

fn log_conflict<E: SyncEntity>(
    conn: &Connection,
    row: &E,
    local_updated_at: i64,
    strategy: &str,
) -> Result<()> {
    let incoming_updated_at = row.meta().updated_at.timestamp_millis();
    conn.execute(
        "INSERT INTO sync_conflicts (
            entity, row_id, local_updated_at, incoming_updated_at, resolved_at, strategy
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            E::KIND.table(),
            row.id(),
            local_updated_at,
            incoming_updated_at,
            Utc::now().timestamp_millis(),
            strategy
        ],
    )?;
    tracing::debug!(
        entity = %E::KIND,
        id = row.id(),
        local_updated_at,
        incoming_updated_at,
        strategy,
        "Recorded sync conflict"
    );
    Ok(())
}

/// Write a locally mutated row as-is.
pub fn save<E: SyncEntity>(conn: &Connection, row: &E) -> Result<()> {
    write_row(conn, row, UpsertPolicy::LastApplied)?;
    Ok(())
}

/// Insert or overwrite a row by id across every column but `id`.
///
/// Under [`UpsertPolicy::LastApplied`] the incoming copy always lands; an
/// overwritten copy with a newer `updated_at` is recorded in `sync_conflicts`
/// as `last_applied`. Under [`UpsertPolicy::KeepPending`] a dirty stored row
/// survives and is recorded as `keep_pending`.
pub fn upsert<E: SyncEntity>(
    conn: &Connection,
    row: &E,
    policy: UpsertPolicy,
) -> Result<UpsertOutcome> {
    let stored = stored_updated_at::<E>(conn, row.id())?;
    let changed = write_row(conn, row, policy)?;
    let incoming = row.meta().updated_at.timestamp_millis();

    match (changed, stored) {
        (0, Some(local)) => {
            log_conflict(conn, row, local, "keep_pending")?;
            Ok(UpsertOutcome::KeptPending)
        }
        (_, Some(local)) if local > incoming => {
            log_conflict(conn, row, local, "last_applied")?;
            Ok(UpsertOutcome::ReplacedNewer)
        }
        _ => Ok(UpsertOutcome::Applied),
    }
}

/// Physically delete a row by id. Deleting an absent row is a no-op.
///
/// Sales and stock-takes take their items with them.
pub fn delete_row(conn: &Connection, kind: EntityKind, id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut deleted = 0;
    match kind {
        EntityKind::Sale => {
            deleted += tx.execute("DELETE FROM sale_items WHERE sale_id = ?1", [id])?;
        }
        EntityKind::StockOpname => {
            deleted += tx.execute(
                "DELETE FROM stock_opname_items WHERE stock_opname_id = ?1",
                [id],
            )?;
        }
        _ => {}
    }
    deleted += tx.execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), [id])?;
    tx.commit()?;
    Ok(deleted)
}

/// Mark uploaded rows clean.
///
/// A row only flips when its stored `updated_at` still matches the uploaded
/// copy; anything edited since stays dirty for the next cycle.
pub fn mark_synced<E: SyncEntity>(conn: &Connection, rows: &[E]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let tx = conn.unchecked_transaction()?;
    let mut marked = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "UPDATE {} SET synced = 1 WHERE id = ?1 AND updated_at = ?2",
            E::KIND.table()
        ))?;
        for row in rows {
            marked += stmt.execute(params![row.id(), row.meta().updated_at.timestamp_millis()])?;
        }
    }
    tx.commit()?;
    Ok(marked)
}

/// Hard-delete acknowledged tombstones, children before parents.
pub fn prune_tombstones(conn: &Connection) -> Result<PruneReport> {
    let tx = conn.unchecked_transaction()?;
    let mut report = PruneReport::default();
    for kind in EntityKind::PRUNE_ORDER {
        let deleted = tx.execute(
            &format!(
                "DELETE FROM {} WHERE is_deleted = 1 AND synced = 1",
                kind.table()
            ),
            [],
        )?;
        report.record(kind, deleted);
    }
    tx.commit()?;
    Ok(report)
}

/// Most recent sync conflicts, newest first.
pub fn list_conflicts(conn: &Connection, limit: usize) -> Result<Vec<SyncConflict>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity, row_id, local_updated_at, incoming_updated_at, resolved_at, strategy
         FROM sync_conflicts
         ORDER BY resolved_at DESC, id DESC
         LIMIT ?1",
    )?;
    let conflicts = stmt
        .query_map([limit as i64], |row| {
            let entity: String = row.get(1)?;
            let entity = EntityKind::from_table(&entity).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    format!("unknown entity {entity}").into(),
                )
            })?;
            Ok(SyncConflict {
                id: row.get(0)?,
                entity,
                row_id: row.get(2)?,
                local_updated_at: row.get(3)?,
                incoming_updated_at: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Branch, Product, Sale, SaleItem, SyncMeta};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            unit: "pcs".to_string(),
            stock: 10,
            price: 2_500.0,
            price_investor: 2_300.0,
            price_shosha: 2_200.0,
            branch_id: "local".to_string(),
            meta: SyncMeta::new_local(),
        }
    }

    fn sale(id: &str, branch_id: &str) -> Sale {
        Sale {
            id: id.to_string(),
            receipt_no: format!("R-{id}"),
            branch_id: branch_id.to_string(),
            branch_name: branch_id.to_string(),
            payment_method: "cash".to_string(),
            notes: String::new(),
            total: 0.0,
            meta: SyncMeta::new_local(),
        }
    }

    fn item(id: &str, sale_id: &str) -> SaleItem {
        SaleItem {
            id: id.to_string(),
            sale_id: sale_id.to_string(),
            product_id: "p-1".to_string(),
            qty: 1,
            price: 2_500.0,
            meta: SyncMeta::new_local(),
        }
    }

    #[test]
    fn upsert_inserts_then_overwrites_every_column() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let mut row = product("p-1", "Teh");
        assert_eq!(
            upsert(conn, &row, UpsertPolicy::LastApplied).unwrap(),
            UpsertOutcome::Applied
        );

        row.name = "Teh Celup".to_string();
        row.price_shosha = 2_100.0;
        row.meta.synced = true;
        row.meta.updated_at += Duration::seconds(1);
        assert_eq!(
            upsert(conn, &row, UpsertPolicy::LastApplied).unwrap(),
            UpsertOutcome::Applied
        );

        let stored: Product = find(conn, "p-1").unwrap().unwrap();
        assert_eq!(stored, row);
    }

    #[test]
    fn last_applied_copy_wins_even_when_older() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let newer = product("p-1", "Newer");
        upsert(conn, &newer, UpsertPolicy::LastApplied).unwrap();

        let mut older = product("p-1", "Older");
        older.meta.updated_at = newer.meta.updated_at - Duration::minutes(5);
        assert_eq!(
            upsert(conn, &older, UpsertPolicy::LastApplied).unwrap(),
            UpsertOutcome::ReplacedNewer
        );

        let stored: Product = find(conn, "p-1").unwrap().unwrap();
        assert_eq!(stored.name, "Older");
        let conflicts = list_conflicts(conn, 10).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity, EntityKind::Product);
        assert_eq!(conflicts[0].row_id, "p-1");
        assert_eq!(conflicts[0].strategy, "last_applied");
    }

    #[test]
    fn keep_pending_leaves_dirty_rows_alone() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let local = product("p-1", "Local edit");
        save(conn, &local).unwrap();

        let mut incoming = product("p-1", "Upstream");
        incoming.meta.synced = true;
        incoming.meta.updated_at = local.meta.updated_at + Duration::seconds(3);
        assert_eq!(
            upsert(conn, &incoming, UpsertPolicy::KeepPending).unwrap(),
            UpsertOutcome::KeptPending
        );
        let stored: Product = find(conn, "p-1").unwrap().unwrap();
        assert_eq!(stored.name, "Local edit");
        assert_eq!(list_conflicts(conn, 10).unwrap()[0].strategy, "keep_pending");

        let mut clean = product("p-2", "Clean");
        clean.meta.synced = true;
        save(conn, &clean).unwrap();
        let mut replacement = product("p-2", "Replaced");
        replacement.meta.synced = true;
        replacement.meta.updated_at = clean.meta.updated_at + Duration::seconds(1);
        assert_eq!(
            upsert(conn, &replacement, UpsertPolicy::KeepPending).unwrap(),
            UpsertOutcome::Applied
        );
        let stored: Product = find(conn, "p-2").unwrap().unwrap();
        assert_eq!(stored.name, "Replaced");
    }

    #[test]
    fn dirty_scan_only_returns_unsynced_rows() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let mut clean = product("p-1", "Clean");
        clean.meta.synced = true;
        save(conn, &clean).unwrap();
        save(conn, &product("p-2", "Dirty")).unwrap();

        let dirty: Vec<Product> = select_dirty(conn).unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, "p-2");
        assert_eq!(count_dirty(conn, EntityKind::Product).unwrap(), 1);
    }

    #[test]
    fn mark_synced_skips_rows_edited_after_upload() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let uploaded = product("p-1", "Kopi");
        save(conn, &uploaded).unwrap();
        save(conn, &product("p-2", "Susu")).unwrap();
        let batch: Vec<Product> = select_dirty(conn).unwrap();

        let mut edited = uploaded;
        edited.name = "Kopi Bubuk".to_string();
        edited.meta.updated_at += Duration::seconds(2);
        save(conn, &edited).unwrap();

        assert_eq!(mark_synced(conn, &batch).unwrap(), 1);
        let still_dirty: Vec<Product> = select_dirty(conn).unwrap();
        assert_eq!(still_dirty.len(), 1);
        assert_eq!(still_dirty[0].name, "Kopi Bubuk");
    }

    #[test]
    fn prune_never_removes_unacknowledged_tombstones() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let mut pending = product("p-1", "Pending");
        pending.meta.is_deleted = true;
        save(conn, &pending).unwrap();

        let mut acknowledged = product("p-2", "Acknowledged");
        acknowledged.meta.is_deleted = true;
        acknowledged.meta.synced = true;
        save(conn, &acknowledged).unwrap();

        let mut live = product("p-3", "Live");
        live.meta.synced = true;
        save(conn, &live).unwrap();

        let report = prune_tombstones(conn).unwrap();
        assert_eq!(report.products, 1);
        assert_eq!(report.total(), 1);
        assert!(find::<Product>(conn, "p-1").unwrap().is_some());
        assert!(find::<Product>(conn, "p-2").unwrap().is_none());
        assert!(find::<Product>(conn, "p-3").unwrap().is_some());
    }

    #[test]
    fn prune_removes_items_before_their_sale() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let mut header = sale("s-1", "local");
        header.meta.is_deleted = true;
        header.meta.synced = true;
        save(conn, &header).unwrap();
        let mut line = item("i-1", "s-1");
        line.meta.is_deleted = true;
        line.meta.synced = true;
        save(conn, &line).unwrap();

        let report = prune_tombstones(conn).unwrap();
        assert_eq!(report.sale_items, 1);
        assert_eq!(report.sales, 1);
    }

    #[test]
    fn delete_of_absent_row_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            delete_row(db.connection(), EntityKind::Branch, "missing").unwrap(),
            0
        );
    }

    #[test]
    fn deleting_a_sale_removes_its_items_first() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        save(conn, &sale("s-1", "local")).unwrap();
        save(conn, &item("i-1", "s-1")).unwrap();
        save(conn, &item("i-2", "s-1")).unwrap();

        assert_eq!(delete_row(conn, EntityKind::Sale, "s-1").unwrap(), 3);
        assert!(find::<SaleItem>(conn, "i-1").unwrap().is_none());
    }

    #[test]
    fn changes_since_uses_receipt_stamp_or_client_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let since = crate::util::now_millis();
        let before = (since - Duration::days(3)).timestamp_millis();

        let mut old = Branch::stub("old");
        old.meta.created_at = since - Duration::days(2);
        old.meta.updated_at = since - Duration::days(1);
        save(conn, &old).unwrap();
        conn.execute("UPDATE branches SET changed_at = ?1 WHERE id = 'old'", [before])
            .unwrap();

        let mut late = Branch::stub("late");
        late.meta.created_at = since - Duration::days(2);
        late.meta.updated_at = since - Duration::days(1);
        save(conn, &late).unwrap();

        let mut touched = Branch::stub("touched");
        touched.meta.created_at = since - Duration::days(2);
        touched.meta.updated_at = since + Duration::seconds(1);
        save(conn, &touched).unwrap();
        conn.execute("UPDATE branches SET changed_at = ?1 WHERE id = 'touched'", [before])
            .unwrap();

        let changed: Vec<Branch> = select_changed_since(conn, since, Some("local")).unwrap();
        let mut ids: Vec<_> = changed.into_iter().map(|branch| branch.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["late".to_string(), "touched".to_string()]);
    }

    #[test]
    fn changes_since_scopes_sales_and_items_to_branch() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        save(conn, &sale("s-a", "branch-a")).unwrap();
        save(conn, &sale("s-b", "branch-b")).unwrap();
        save(conn, &item("i-a", "s-a")).unwrap();
        save(conn, &item("i-b", "s-b")).unwrap();
        let epoch = crate::util::epoch();

        let sales: Vec<Sale> = select_changed_since(conn, epoch, Some("branch-a")).unwrap();
        let items: Vec<SaleItem> = select_changed_since(conn, epoch, Some("branch-a")).unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].id, "s-a");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "i-a");

        let all: Vec<Sale> = select_changed_since(conn, epoch, None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
