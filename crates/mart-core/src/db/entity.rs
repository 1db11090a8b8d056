//! Per-entity column metadata consumed by the generic sync store.
//!
//! Each syncable model declares its business columns once. Reads, dirty scans,
//! upserts and change queries all derive their column lists from here, so a new
//! business field needs exactly one edit per entity.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{
    Branch, EntityKind, Product, Sale, SaleItem, StockOpname, StockOpnameItem, SyncMeta,
};

/// Envelope columns, stored after the business columns of every table.
pub(crate) const META_COLUMNS: [&str; 5] =
    ["synced", "is_deleted", "deleted_at", "created_at", "updated_at"];

/// A row type that participates in sync.
pub trait SyncEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Business columns, in the order `business_values` yields them and
    /// `from_row` reads them (starting at column index 1).
    const FIELDS: &'static [&'static str];

    fn id(&self) -> &str;
    fn meta(&self) -> &SyncMeta;
    fn meta_mut(&mut self) -> &mut SyncMeta;
    fn business_values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// `id`, business columns, then the envelope.
    fn columns() -> Vec<&'static str> {
        std::iter::once("id")
            .chain(Self::FIELDS.iter().copied())
            .chain(META_COLUMNS)
            .collect()
    }

    /// Values matching [`SyncEntity::columns`].
    fn values(&self) -> Vec<Value> {
        let mut values = Vec::with_capacity(Self::FIELDS.len() + 1 + META_COLUMNS.len());
        values.push(Value::Text(self.id().to_string()));
        values.extend(self.business_values());
        values.extend(meta_values(self.meta()));
        values
    }

    /// `SELECT <columns> FROM <table>` without a predicate.
    fn select_sql() -> String {
        format!(
            "SELECT {} FROM {}",
            Self::columns().join(", "),
            Self::KIND.table()
        )
    }
}

fn meta_values(meta: &SyncMeta) -> [Value; 5] {
    [
        Value::Integer(i64::from(meta.synced)),
        Value::Integer(i64::from(meta.is_deleted)),
        meta.deleted_at
            .map_or(Value::Null, |at| Value::Integer(at.timestamp_millis())),
        Value::Integer(meta.created_at.timestamp_millis()),
        Value::Integer(meta.updated_at.timestamp_millis()),
    ]
}

fn read_meta(row: &Row<'_>, offset: usize) -> rusqlite::Result<SyncMeta> {
    let deleted_at = row
        .get::<_, Option<i64>>(offset + 2)?
        .map(|ms| millis_to_datetime(offset + 2, ms))
        .transpose()?;
    Ok(SyncMeta {
        synced: row.get(offset)?,
        is_deleted: row.get(offset + 1)?,
        deleted_at,
        created_at: millis_to_datetime(offset + 3, row.get(offset + 3)?)?,
        updated_at: millis_to_datetime(offset + 4, row.get(offset + 4)?)?,
    })
}

pub(crate) fn millis_to_datetime(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

impl SyncEntity for Branch {
    const KIND: EntityKind = EntityKind::Branch;
    const FIELDS: &'static [&'static str] = &["code", "name", "address", "phone"];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.code),
            text(&self.name),
            text(&self.address),
            text(&self.phone),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            address: row.get(3)?,
            phone: row.get(4)?,
            meta: read_meta(row, 5)?,
        })
    }
}

impl SyncEntity for Product {
    const KIND: EntityKind = EntityKind::Product;
    const FIELDS: &'static [&'static str] = &[
        "name",
        "unit",
        "stock",
        "price",
        "price_investor",
        "price_shosha",
        "branch_id",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.name),
            text(&self.unit),
            Value::Integer(self.stock),
            Value::Real(self.price),
            Value::Real(self.price_investor),
            Value::Real(self.price_shosha),
            text(&self.branch_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            unit: row.get(2)?,
            stock: row.get(3)?,
            price: row.get(4)?,
            price_investor: row.get(5)?,
            price_shosha: row.get(6)?,
            branch_id: row.get(7)?,
            meta: read_meta(row, 8)?,
        })
    }
}

impl SyncEntity for Sale {
    const KIND: EntityKind = EntityKind::Sale;
    const FIELDS: &'static [&'static str] = &[
        "receipt_no",
        "branch_id",
        "branch_name",
        "payment_method",
        "notes",
        "total",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.receipt_no),
            text(&self.branch_id),
            text(&self.branch_name),
            text(&self.payment_method),
            text(&self.notes),
            Value::Real(self.total),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            receipt_no: row.get(1)?,
            branch_id: row.get(2)?,
            branch_name: row.get(3)?,
            payment_method: row.get(4)?,
            notes: row.get(5)?,
            total: row.get(6)?,
            meta: read_meta(row, 7)?,
        })
    }
}

impl SyncEntity for SaleItem {
    const KIND: EntityKind = EntityKind::SaleItem;
    const FIELDS: &'static [&'static str] = &["sale_id", "product_id", "qty", "price"];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.sale_id),
            text(&self.product_id),
            Value::Integer(self.qty),
            Value::Real(self.price),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sale_id: row.get(1)?,
            product_id: row.get(2)?,
            qty: row.get(3)?,
            price: row.get(4)?,
            meta: read_meta(row, 5)?,
        })
    }
}

impl SyncEntity for StockOpname {
    const KIND: EntityKind = EntityKind::StockOpname;
    const FIELDS: &'static [&'static str] = &["branch_id", "performed_by", "note"];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.branch_id),
            text(&self.performed_by),
            text(&self.note),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            performed_by: row.get(2)?,
            note: row.get(3)?,
            meta: read_meta(row, 4)?,
        })
    }
}

impl SyncEntity for StockOpnameItem {
    const KIND: EntityKind = EntityKind::StockOpnameItem;
    const FIELDS: &'static [&'static str] =
        &["stock_opname_id", "product_id", "system_qty", "physical_qty"];

    fn id(&self) -> &str {
        &self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn business_values(&self) -> Vec<Value> {
        vec![
            text(&self.stock_opname_id),
            text(&self.product_id),
            Value::Integer(self.system_qty),
            Value::Integer(self.physical_qty),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stock_opname_id: row.get(1)?,
            product_id: row.get(2)?,
            system_qty: row.get(3)?,
            physical_qty: row.get(4)?,
            meta: read_meta(row, 5)?,
        })
    }
}
