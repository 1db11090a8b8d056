mod ledger;
mod sync;

use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use mart_core::sync::SyncHandle;
use mart_core::DatabaseService;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    store: DatabaseService,
    sync: SyncHandle,
}

impl AppState {
    pub const fn new(store: DatabaseService, sync: SyncHandle) -> Self {
        Self { store, sync }
    }
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route(
            "/branches",
            get(ledger::list_branches).post(ledger::create_branch),
        )
        .route(
            "/branches/{id}",
            put(ledger::update_branch).delete(ledger::delete_branch),
        )
        .route(
            "/products",
            get(ledger::list_products).post(ledger::create_product),
        )
        .route(
            "/products/{id}",
            get(ledger::get_product)
                .put(ledger::update_product)
                .delete(ledger::delete_product),
        )
        .route("/sales", get(ledger::list_sales).post(ledger::create_sale))
        .route(
            "/sales/{id}",
            get(ledger::get_sale).delete(ledger::delete_sale),
        )
        .route("/sales/{id}/items", post(ledger::add_sale_item))
        .route(
            "/sale-items/{id}",
            put(ledger::update_sale_item).delete(ledger::delete_sale_item),
        )
        .route("/stock-opname", post(ledger::create_stock_opname))
        .route("/stock-opname/{id}", delete(ledger::delete_stock_opname))
        .route("/sync/summary", get(sync::summary))
        .route("/sync/run", post(sync::run))
        .route("/sync/prune-deleted", post(sync::prune_deleted))
        .route("/sync/conflicts", get(sync::conflicts));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}
