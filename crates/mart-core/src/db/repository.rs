//! Ledger repository implementation
//!
//! Every write goes through here so that each create, update and soft delete
//! marks the touched rows dirty inside the same transaction.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection};

use super::entity::SyncEntity;
use super::sync_store::{find, query_rows, save};
use crate::error::{Error, Result};
use crate::models::{
    Branch, BranchUpdate, NewBranch, NewProduct, NewSale, NewSaleItem, NewStockOpname,
    PaymentMethod, Product, ProductUpdate, Sale, SaleItem, SaleItemUpdate, SaleWithItems,
    StockOpname, StockOpnameItem, StockOpnameWithItems, SyncMeta,
};
use crate::util::{new_id, normalize_text_option};

/// Trait for branch-local ledger operations
pub trait LedgerRepository {
    /// List live branches by name
    fn list_branches(&self) -> Result<Vec<Branch>>;

    /// Create a branch
    fn create_branch(&self, input: NewBranch) -> Result<Branch>;

    /// Update a branch's details
    fn update_branch(&self, id: &str, update: BranchUpdate) -> Result<Branch>;

    /// Soft delete a branch
    fn delete_branch(&self, id: &str) -> Result<()>;

    /// List live products by name
    fn list_products(&self, limit: usize, offset: usize) -> Result<Vec<Product>>;

    /// Get a live product by ID
    fn get_product(&self, id: &str) -> Result<Option<Product>>;

    /// Create a product
    fn create_product(&self, input: NewProduct) -> Result<Product>;

    /// Update a product
    fn update_product(&self, id: &str, update: ProductUpdate) -> Result<Product>;

    /// Soft delete a product
    fn delete_product(&self, id: &str) -> Result<()>;

    /// List live sales, newest first
    fn list_sales(&self, limit: usize, offset: usize) -> Result<Vec<Sale>>;

    /// Get a live sale with its live items
    fn get_sale(&self, id: &str) -> Result<Option<SaleWithItems>>;

    /// Record a checkout: header first, then items, decrementing stock
    fn create_sale(&self, input: NewSale) -> Result<SaleWithItems>;

    /// Append an item to an existing sale
    fn add_sale_item(&self, sale_id: &str, input: NewSaleItem) -> Result<SaleItem>;

    /// Change an item's quantity or price
    fn update_sale_item(&self, item_id: &str, update: SaleItemUpdate) -> Result<SaleItem>;

    /// Soft delete an item, returning its quantity to stock
    fn delete_sale_item(&self, item_id: &str) -> Result<()>;

    /// Soft delete a sale and all of its live items
    fn delete_sale(&self, id: &str) -> Result<()>;

    /// Record a stock-take, overwriting each counted product's stock
    fn create_stock_opname(&self, input: NewStockOpname) -> Result<StockOpnameWithItems>;

    /// Soft delete a stock-take and its items
    fn delete_stock_opname(&self, id: &str) -> Result<()>;
}

/// `SQLite` implementation of `LedgerRepository`
pub struct SqliteLedgerRepository<'a> {
    conn: &'a Connection,
    default_branch: &'a str,
}

impl<'a> SqliteLedgerRepository<'a> {
    /// Create a new repository. `default_branch` fills in omitted branch ids.
    pub const fn new(conn: &'a Connection, default_branch: &'a str) -> Self {
        Self {
            conn,
            default_branch,
        }
    }

    fn resolve_branch(&self, requested: Option<String>) -> String {
        normalize_text_option(requested).unwrap_or_else(|| self.default_branch.to_string())
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invalid(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn live<E: SyncEntity>(conn: &Connection, id: &str) -> Result<Option<E>> {
    Ok(find::<E>(conn, id)?.filter(|row| !row.meta().is_deleted))
}

fn require_live<E: SyncEntity>(conn: &Connection, id: &str) -> Result<E> {
    live(conn, id)?.ok_or_else(|| Error::not_found(&E::KIND.to_string(), id))
}

fn live_sale_items(conn: &Connection, sale_id: &str) -> Result<Vec<SaleItem>> {
    let sql = format!(
        "{} WHERE sale_id = ?1 AND is_deleted = 0 ORDER BY created_at, id",
        SaleItem::select_sql()
    );
    query_rows(conn, &sql, [sale_id])
}

/// Existing branch row, or a fresh stub so sales never point at nothing.
fn ensure_branch(conn: &Connection, id: &str) -> Result<Branch> {
    if let Some(branch) = find::<Branch>(conn, id)? {
        return Ok(branch);
    }
    let branch = Branch::stub(id);
    save(conn, &branch)?;
    tracing::info!(branch_id = id, "Created stub branch for unknown branch id");
    Ok(branch)
}

/// Apply a stock delta to a product, if it still exists.
fn adjust_stock(conn: &Connection, product_id: &str, delta: i64) -> Result<()> {
    if delta == 0 {
        return Ok(());
    }
    let Some(mut product) = find::<Product>(conn, product_id)? else {
        tracing::warn!(product_id, delta, "Stock adjustment for missing product skipped");
        return Ok(());
    };
    product.stock += delta;
    product.meta.touch();
    save(conn, &product)
}

fn validate_qty(qty: i64) -> Result<i64> {
    if qty > 0 {
        Ok(qty)
    } else {
        Err(Error::invalid("qty must be greater than 0"))
    }
}

/// Insert one line under `sale`, taking stock and bumping the sale total.
fn insert_sale_item(conn: &Connection, sale: &mut Sale, line: NewSaleItem) -> Result<SaleItem> {
    let qty = validate_qty(line.qty)?;
    let product: Product = live(conn, line.product_id.trim())?
        .ok_or_else(|| Error::invalid(format!("product not found: {}", line.product_id)))?;
    let price = line
        .price
        .filter(|price| *price > 0.0)
        .unwrap_or(product.price);

    let item = SaleItem {
        id: new_id(),
        sale_id: sale.id.clone(),
        product_id: product.id.clone(),
        qty,
        price,
        meta: SyncMeta::new_local(),
    };
    save(conn, &item)?;
    adjust_stock(conn, &product.id, -qty)?;
    sale.total += item.line_total();
    Ok(item)
}

/// Return an item's quantity to stock and take it off the sale total.
fn remove_sale_item(conn: &Connection, sale: &mut Sale, mut item: SaleItem) -> Result<()> {
    adjust_stock(conn, &item.product_id, item.qty)?;
    sale.total -= item.line_total();
    item.meta.tombstone();
    save(conn, &item)
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn list_branches(&self) -> Result<Vec<Branch>> {
        let sql = format!(
            "{} WHERE is_deleted = 0 ORDER BY name COLLATE NOCASE, id",
            Branch::select_sql()
        );
        query_rows(self.conn, &sql, [])
    }

    fn create_branch(&self, input: NewBranch) -> Result<Branch> {
        let name = required(&input.name, "name")?;
        let branch = Branch {
            id: normalize_text_option(input.id).unwrap_or_else(new_id),
            code: input.code.trim().to_string(),
            name,
            address: input.address.trim().to_string(),
            phone: input.phone.trim().to_string(),
            meta: SyncMeta::new_local(),
        };
        if find::<Branch>(self.conn, &branch.id)?.is_some() {
            return Err(Error::invalid(format!("branch {} already exists", branch.id)));
        }
        save(self.conn, &branch)?;
        Ok(branch)
    }

    fn update_branch(&self, id: &str, update: BranchUpdate) -> Result<Branch> {
        let mut branch: Branch = require_live(self.conn, id)?;
        if let Some(code) = update.code {
            branch.code = code.trim().to_string();
        }
        if let Some(name) = update.name {
            branch.name = required(&name, "name")?;
        }
        if let Some(address) = update.address {
            branch.address = address.trim().to_string();
        }
        if let Some(phone) = update.phone {
            branch.phone = phone.trim().to_string();
        }
        branch.meta.touch();
        save(self.conn, &branch)?;
        Ok(branch)
    }

    fn delete_branch(&self, id: &str) -> Result<()> {
        let mut branch: Branch = require_live(self.conn, id)?;
        branch.meta.tombstone();
        save(self.conn, &branch)
    }

    fn list_products(&self, limit: usize, offset: usize) -> Result<Vec<Product>> {
        let sql = format!(
            "{} WHERE is_deleted = 0 ORDER BY name COLLATE NOCASE, id LIMIT ?1 OFFSET ?2",
            Product::select_sql()
        );
        query_rows(self.conn, &sql, params![limit as i64, offset as i64])
    }

    fn get_product(&self, id: &str) -> Result<Option<Product>> {
        live(self.conn, id)
    }

    fn create_product(&self, input: NewProduct) -> Result<Product> {
        let name = required(&input.name, "name")?;
        let unit = required(&input.unit, "unit")?;
        if input.price <= 0.0 {
            return Err(Error::invalid("price must be greater than 0"));
        }
        if input.price_investor < 0.0 || input.price_shosha < 0.0 {
            return Err(Error::invalid("tier prices cannot be negative"));
        }
        if input.stock < 0 {
            return Err(Error::invalid("stock cannot be negative"));
        }

        let product = Product {
            id: normalize_text_option(input.id).unwrap_or_else(new_id),
            name,
            unit,
            stock: input.stock,
            price: input.price,
            price_investor: input.price_investor,
            price_shosha: input.price_shosha,
            branch_id: self.resolve_branch(input.branch_id),
            meta: SyncMeta::new_local(),
        };
        if find::<Product>(self.conn, &product.id)?.is_some() {
            return Err(Error::invalid(format!("product {} already exists", product.id)));
        }
        save(self.conn, &product)?;
        Ok(product)
    }

    fn update_product(&self, id: &str, update: ProductUpdate) -> Result<Product> {
        let mut product: Product = require_live(self.conn, id)?;
        if let Some(name) = update.name {
            product.name = required(&name, "name")?;
        }
        if let Some(unit) = update.unit {
            product.unit = required(&unit, "unit")?;
        }
        if let Some(stock) = update.stock {
            if stock < 0 {
                return Err(Error::invalid("stock cannot be negative"));
            }
            product.stock = stock;
        }
        if let Some(price) = update.price {
            if price <= 0.0 {
                return Err(Error::invalid("price must be greater than 0"));
            }
            product.price = price;
        }
        if let Some(price) = update.price_investor {
            product.price_investor = price.max(0.0);
        }
        if let Some(price) = update.price_shosha {
            product.price_shosha = price.max(0.0);
        }
        if let Some(branch_id) = normalize_text_option(update.branch_id) {
            product.branch_id = branch_id;
        }
        product.meta.touch();
        save(self.conn, &product)?;
        Ok(product)
    }

    fn delete_product(&self, id: &str) -> Result<()> {
        let mut product: Product = require_live(self.conn, id)?;
        product.meta.tombstone();
        save(self.conn, &product)
    }

    fn list_sales(&self, limit: usize, offset: usize) -> Result<Vec<Sale>> {
        let sql = format!(
            "{} WHERE is_deleted = 0 ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2",
            Sale::select_sql()
        );
        query_rows(self.conn, &sql, params![limit as i64, offset as i64])
    }

    fn get_sale(&self, id: &str) -> Result<Option<SaleWithItems>> {
        let Some(sale) = live::<Sale>(self.conn, id)? else {
            return Ok(None);
        };
        let items = live_sale_items(self.conn, id)?;
        Ok(Some(SaleWithItems { sale, items }))
    }

    fn create_sale(&self, input: NewSale) -> Result<SaleWithItems> {
        if input.items.is_empty() {
            return Err(Error::invalid("a sale needs at least one item"));
        }
        let payment_method = input
            .payment_method
            .as_deref()
            .unwrap_or_default()
            .parse::<PaymentMethod>()?;
        let branch_id = self.resolve_branch(input.branch_id);

        let tx = self.conn.unchecked_transaction()?;
        let branch = ensure_branch(&tx, &branch_id)?;
        let meta = SyncMeta::new_local();
        let mut sale = Sale {
            id: normalize_text_option(input.id).unwrap_or_else(new_id),
            receipt_no: normalize_text_option(input.receipt_no)
                .unwrap_or_else(|| meta.created_at.format("%y%m%d%H%M%S").to_string()),
            branch_id,
            branch_name: branch.name,
            payment_method: payment_method.to_string(),
            notes: input.notes.trim().to_string(),
            total: 0.0,
            meta,
        };
        if find::<Sale>(&tx, &sale.id)?.is_some() {
            return Err(Error::invalid(format!("sale {} already exists", sale.id)));
        }
        // Header goes in first so the items' foreign key resolves.
        save(&tx, &sale)?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in input.items {
            items.push(insert_sale_item(&tx, &mut sale, line)?);
        }
        save(&tx, &sale)?;
        tx.commit()?;

        tracing::info!(
            sale_id = %sale.id,
            items = items.len(),
            total = sale.total,
            "Recorded sale"
        );
        Ok(SaleWithItems { sale, items })
    }

    fn add_sale_item(&self, sale_id: &str, input: NewSaleItem) -> Result<SaleItem> {
        let tx = self.conn.unchecked_transaction()?;
        let mut sale: Sale = require_live(&tx, sale_id)?;
        let item = insert_sale_item(&tx, &mut sale, input)?;
        sale.meta.touch();
        save(&tx, &sale)?;
        tx.commit()?;
        Ok(item)
    }

    fn update_sale_item(&self, item_id: &str, update: SaleItemUpdate) -> Result<SaleItem> {
        let tx = self.conn.unchecked_transaction()?;
        let mut item: SaleItem = require_live(&tx, item_id)?;
        let mut sale: Sale = require_live(&tx, &item.sale_id)?;

        let qty = validate_qty(update.qty.unwrap_or(item.qty))?;
        let price = update.price.unwrap_or(item.price);
        if price <= 0.0 {
            return Err(Error::invalid("price must be greater than 0"));
        }

        adjust_stock(&tx, &item.product_id, item.qty - qty)?;
        sale.total -= item.line_total();
        item.qty = qty;
        item.price = price;
        sale.total += item.line_total();

        item.meta.touch();
        save(&tx, &item)?;
        sale.meta.touch();
        save(&tx, &sale)?;
        tx.commit()?;
        Ok(item)
    }

    fn delete_sale_item(&self, item_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let item: SaleItem = require_live(&tx, item_id)?;
        let mut sale: Sale = require_live(&tx, &item.sale_id)?;
        remove_sale_item(&tx, &mut sale, item)?;
        sale.meta.touch();
        save(&tx, &sale)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_sale(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut sale: Sale = require_live(&tx, id)?;
        for item in live_sale_items(&tx, id)? {
            remove_sale_item(&tx, &mut sale, item)?;
        }
        sale.total = 0.0;
        sale.meta.tombstone();
        save(&tx, &sale)?;
        tx.commit()?;
        Ok(())
    }

    fn create_stock_opname(&self, input: NewStockOpname) -> Result<StockOpnameWithItems> {
        if input.items.is_empty() {
            return Err(Error::invalid("a stock opname needs at least one item"));
        }
        let branch_id = self.resolve_branch(input.branch_id);

        let tx = self.conn.unchecked_transaction()?;
        ensure_branch(&tx, &branch_id)?;
        let opname = StockOpname {
            id: normalize_text_option(input.id).unwrap_or_else(new_id),
            branch_id,
            performed_by: input.performed_by.trim().to_string(),
            note: input.note.trim().to_string(),
            meta: SyncMeta::new_local(),
        };
        if find::<StockOpname>(&tx, &opname.id)?.is_some() {
            return Err(Error::invalid(format!(
                "stock opname {} already exists",
                opname.id
            )));
        }
        save(&tx, &opname)?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in input.items {
            if line.physical_qty < 0 {
                return Err(Error::invalid("physical_qty cannot be negative"));
            }
            let mut product: Product = live(&tx, line.product_id.trim())?.ok_or_else(|| {
                Error::invalid(format!("product not found: {}", line.product_id))
            })?;
            let item = StockOpnameItem {
                id: new_id(),
                stock_opname_id: opname.id.clone(),
                product_id: product.id.clone(),
                system_qty: product.stock,
                physical_qty: line.physical_qty,
                meta: SyncMeta::new_local(),
            };
            save(&tx, &item)?;

            product.stock = line.physical_qty;
            product.meta.touch();
            save(&tx, &product)?;
            items.push(item);
        }
        tx.commit()?;

        tracing::info!(
            stock_opname_id = %opname.id,
            items = items.len(),
            "Recorded stock opname"
        );
        Ok(StockOpnameWithItems { opname, items })
    }

    fn delete_stock_opname(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut opname: StockOpname = require_live(&tx, id)?;
        let sql = format!(
            "{} WHERE stock_opname_id = ?1 AND is_deleted = 0",
            StockOpnameItem::select_sql()
        );
        for mut item in query_rows::<StockOpnameItem>(&tx, &sql, [id])? {
            item.meta.tombstone();
            save(&tx, &item)?;
        }
        opname.meta.tombstone();
        save(&tx, &opname)?;
        tx.commit()?;
        Ok(())
    }
}
