//! Local CRUD surface over the branch ledger.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use mart_core::models::{
    BranchUpdate, NewBranch, NewProduct, NewSale, NewSaleItem, NewStockOpname, ProductUpdate,
    SaleItemUpdate, SaleWithItems, StockOpnameWithItems,
};
use mart_core::{Branch, Product, Sale, SaleItem};
use serde::Deserialize;

use super::AppState;
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Page {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or_default()
    }
}

pub async fn list_branches(State(state): State<AppState>) -> Result<Json<Vec<Branch>>, AppError> {
    Ok(Json(state.store.list_branches().await?))
}

pub async fn create_branch(
    State(state): State<AppState>,
    payload: Result<Json<NewBranch>, JsonRejection>,
) -> Result<(StatusCode, Json<Branch>), AppError> {
    let Json(input) = payload?;
    let branch = state.store.create_branch(input).await?;
    tracing::info!(endpoint = "create_branch", branch_id = %branch.id, "Created branch");
    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<BranchUpdate>, JsonRejection>,
) -> Result<Json<Branch>, AppError> {
    let Json(update) = payload?;
    Ok(Json(state.store.update_branch(&id, update).await?))
}

pub async fn delete_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_branch(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_products(
    State(state): State<AppState>,
    page: Result<Query<Page>, QueryRejection>,
) -> Result<Json<Vec<Product>>, AppError> {
    let Query(page) = page?;
    Ok(Json(
        state
            .store
            .list_products(page.limit(), page.offset())
            .await?,
    ))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    state
        .store
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("product {id} not found")))
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let Json(input) = payload?;
    let product = state.store.create_product(input).await?;
    tracing::info!(endpoint = "create_product", product_id = %product.id, "Created product");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    let Json(update) = payload?;
    Ok(Json(state.store.update_product(&id, update).await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_sales(
    State(state): State<AppState>,
    page: Result<Query<Page>, QueryRejection>,
) -> Result<Json<Vec<Sale>>, AppError> {
    let Query(page) = page?;
    Ok(Json(
        state.store.list_sales(page.limit(), page.offset()).await?,
    ))
}

pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SaleWithItems>, AppError> {
    state
        .store
        .get_sale(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("sale {id} not found")))
}

pub async fn create_sale(
    State(state): State<AppState>,
    payload: Result<Json<NewSale>, JsonRejection>,
) -> Result<(StatusCode, Json<SaleWithItems>), AppError> {
    let Json(input) = payload?;
    let sale = state.store.create_sale(input).await?;
    tracing::info!(
        endpoint = "create_sale",
        sale_id = %sale.sale.id,
        items = sale.items.len(),
        total = sale.sale.total,
        "Recorded sale"
    );
    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn delete_sale(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_sale(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_sale_item(
    State(state): State<AppState>,
    Path(sale_id): Path<String>,
    payload: Result<Json<NewSaleItem>, JsonRejection>,
) -> Result<(StatusCode, Json<SaleItem>), AppError> {
    let Json(input) = payload?;
    let item = state.store.add_sale_item(&sale_id, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_sale_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SaleItemUpdate>, JsonRejection>,
) -> Result<Json<SaleItem>, AppError> {
    let Json(update) = payload?;
    Ok(Json(state.store.update_sale_item(&id, update).await?))
}

pub async fn delete_sale_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_sale_item(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_stock_opname(
    State(state): State<AppState>,
    payload: Result<Json<NewStockOpname>, JsonRejection>,
) -> Result<(StatusCode, Json<StockOpnameWithItems>), AppError> {
    let Json(input) = payload?;
    let opname = state.store.create_stock_opname(input).await?;
    tracing::info!(
        endpoint = "create_stock_opname",
        stock_opname_id = %opname.opname.id,
        items = opname.items.len(),
        "Recorded stock-take"
    );
    Ok((StatusCode::CREATED, Json(opname)))
}

pub async fn delete_stock_opname(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_stock_opname(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
