//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, V1_STATEMENTS)?;
    }
    if version < 2 {
        apply(conn, 2, V2_STATEMENTS)?;
    }
    if version < 3 {
        apply(conn, 3, V3_STATEMENTS)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Version 1: ledger tables and the watermark singleton
const V1_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS branches (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT '',
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        unit TEXT NOT NULL DEFAULT '',
        stock INTEGER NOT NULL DEFAULT 0,
        price REAL NOT NULL DEFAULT 0,
        price_investor REAL NOT NULL DEFAULT 0,
        price_shosha REAL NOT NULL DEFAULT 0,
        branch_id TEXT NOT NULL DEFAULT '',
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sales (
        id TEXT PRIMARY KEY,
        receipt_no TEXT NOT NULL DEFAULT '',
        branch_id TEXT NOT NULL DEFAULT '',
        branch_name TEXT NOT NULL DEFAULT '',
        payment_method TEXT NOT NULL DEFAULT 'cash',
        notes TEXT NOT NULL DEFAULT '',
        total REAL NOT NULL DEFAULT 0,
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sale_items (
        id TEXT PRIMARY KEY,
        sale_id TEXT NOT NULL REFERENCES sales(id),
        product_id TEXT NOT NULL,
        qty INTEGER NOT NULL DEFAULT 0,
        price REAL NOT NULL DEFAULT 0,
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stock_opnames (
        id TEXT PRIMARY KEY,
        branch_id TEXT NOT NULL DEFAULT '',
        performed_by TEXT NOT NULL DEFAULT '',
        note TEXT NOT NULL DEFAULT '',
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stock_opname_items (
        id TEXT PRIMARY KEY,
        stock_opname_id TEXT NOT NULL REFERENCES stock_opnames(id),
        product_id TEXT NOT NULL,
        system_qty INTEGER NOT NULL DEFAULT 0,
        physical_qty INTEGER NOT NULL DEFAULT 0,
        synced INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        deleted_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_branches_synced ON branches(synced)",
    "CREATE INDEX IF NOT EXISTS idx_branches_changed ON branches(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_products_synced ON products(synced)",
    "CREATE INDEX IF NOT EXISTS idx_products_changed ON products(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_sales_synced ON sales(synced)",
    "CREATE INDEX IF NOT EXISTS idx_sales_changed ON sales(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_sales_branch ON sales(branch_id)",
    "CREATE INDEX IF NOT EXISTS idx_sale_items_synced ON sale_items(synced)",
    "CREATE INDEX IF NOT EXISTS idx_sale_items_changed ON sale_items(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_sale_items_sale ON sale_items(sale_id)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opnames_synced ON stock_opnames(synced)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opnames_changed ON stock_opnames(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opname_items_synced ON stock_opname_items(synced)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opname_items_changed ON stock_opname_items(updated_at, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opname_items_opname ON stock_opname_items(stock_opname_id)",
    // Single row keyed 'singleton'
    "CREATE TABLE IF NOT EXISTS sync_state (
        id TEXT PRIMARY KEY,
        last_sync_at INTEGER
    )",
];

/// Version 2: sync conflict log
const V2_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity TEXT NOT NULL,
        row_id TEXT NOT NULL,
        local_updated_at INTEGER NOT NULL,
        incoming_updated_at INTEGER NOT NULL,
        resolved_at INTEGER NOT NULL,
        strategy TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_row ON sync_conflicts(entity, row_id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
];

/// Version 3: receipt stamp on every ledger table, taken from the writing
/// store's clock
const V3_STATEMENTS: &[&str] = &[
    "ALTER TABLE branches ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE branches SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_branches_received ON branches(changed_at)",
    "ALTER TABLE products ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE products SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_products_received ON products(changed_at)",
    "ALTER TABLE sales ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE sales SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_sales_received ON sales(changed_at)",
    "ALTER TABLE sale_items ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE sale_items SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_sale_items_received ON sale_items(changed_at)",
    "ALTER TABLE stock_opnames ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE stock_opnames SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opnames_received ON stock_opnames(changed_at)",
    "ALTER TABLE stock_opname_items ADD COLUMN changed_at INTEGER NOT NULL DEFAULT 0",
    "UPDATE stock_opname_items SET changed_at = MAX(created_at, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_stock_opname_items_received ON stock_opname_items(changed_at)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_every_ledger_table_has_the_sync_envelope() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        for kind in crate::models::EntityKind::APPLY_ORDER {
            let mut stmt = conn
                .prepare(&format!("SELECT name FROM pragma_table_info('{}')", kind.table()))
                .unwrap();
            let columns: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .unwrap()
                .collect::<rusqlite::Result<_>>()
                .unwrap();
            for column in [
                "synced",
                "is_deleted",
                "deleted_at",
                "created_at",
                "updated_at",
                "changed_at",
            ] {
                assert!(
                    columns.iter().any(|name| name == column),
                    "{kind} is missing {column}"
                );
            }
        }
    }
}
