use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use mart_core::sync::{self, ChangeSet, ChangesQuery, UploadBatch};
use mart_core::DatabaseService;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: DatabaseService,
}

impl AppState {
    pub const fn new(store: DatabaseService, config: Arc<AppConfig>) -> Self {
        Self { config, store }
    }
}

pub fn app_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    let sync_routes = Router::new()
        .route("/upload", post(upload))
        .route("/changes", get(changes))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/sync", sync_routes)
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

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadBatch>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(batch) = payload?;
    let branch_id = batch.branch_id.clone();
    let rows = batch.rows.len();

    let report = sync::upstream::ingest(&state.store, batch).await?;
    tracing::info!(
        endpoint = "sync_upload",
        branch_id = %branch_id,
        rows,
        conflicts = report.conflicts,
        "Accepted upload batch"
    );
    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
struct ChangesParams {
    since: Option<String>,
    branch_id: Option<String>,
}

async fn changes(
    State(state): State<AppState>,
    Query(params): Query<ChangesParams>,
) -> Result<Json<ChangeSet>, AppError> {
    let query = ChangesQuery::parse(params.since.as_deref(), params.branch_id.as_deref())
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let change_set = sync::upstream::changes(&state.store, &query).await?;
    tracing::info!(
        endpoint = "sync_changes",
        branch_id = query.branch_id.as_deref().unwrap_or("all"),
        rows = change_set.rows.len(),
        "Served changes"
    );
    Ok(Json(change_set))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use mart_core::models::{NewProduct, NewSale, NewSaleItem};
    use mart_core::sync::{HttpUpstream, SyncEngine, SyncWorker, UpstreamTransport};
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;

    fn test_state(store: DatabaseService) -> AppState {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".into(),
            max_body_bytes: 1024 * 1024,
        };
        AppState::new(store, Arc::new(config))
    }

    async fn send(
        router: Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn product_row(id: &str, updated_at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": "Beras",
            "unit": "sak",
            "stock": 4,
            "price": 75000.0,
            "price_investor": 0.0,
            "price_shosha": 0.0,
            "branch_id": "cabang-1",
            "synced": false,
            "is_deleted": false,
            "deleted_at": null,
            "created_at": "2024-05-01T01:00:00.000Z",
            "updated_at": updated_at,
        })
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let (status, body) = send(router, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn empty_store_returns_every_array_and_now() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let before = Utc::now() - chrono::Duration::seconds(1);

        let (status, body) = send(router, Method::GET, "/api/sync/changes", None).await;

        assert_eq!(status, StatusCode::OK);
        for key in [
            "branches",
            "products",
            "sales",
            "sale_items",
            "stock_opnames",
            "stock_opname_items",
        ] {
            assert_eq!(body[key], serde_json::json!([]), "{key}");
        }
        let last_sync_at: chrono::DateTime<Utc> =
            serde_json::from_value(body["last_sync_at"].clone()).unwrap();
        assert!(last_sync_at >= before);
    }

    #[tokio::test]
    async fn changes_rejects_unparseable_since() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let (status, body) = send(
            router,
            Method::GET,
            "/api/sync/changes?since=last-tuesday",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid since"));
    }

    #[tokio::test]
    async fn changes_since_follows_receipt_order() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let first = serde_json::json!({
            "branch_id": "cabang-1",
            "products": [product_row("p-early", "2024-06-01T01:00:00.000Z")],
        });

        let (status, body) = send(
            router.clone(),
            Method::POST,
            "/api/sync/upload",
            Some(first.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
        let (status, _) = send(router.clone(), Method::POST, "/api/sync/upload", Some(first)).await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (_, body) = send(router.clone(), Method::GET, "/api/sync/changes", None).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 1);
        let watermark = body["last_sync_at"].as_str().unwrap().to_string();

        // Uploaded after the watermark, but stamped by a replica clock far behind it.
        let late = serde_json::json!({
            "branch_id": "cabang-2",
            "products": [product_row("p-late", "2024-05-01T01:00:00.000Z")],
        });
        let (status, _) = send(router.clone(), Method::POST, "/api/sync/upload", Some(late)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            router,
            Method::GET,
            &format!("/api/sync/changes?since={watermark}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let products = body["products"].as_array().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["id"], "p-late");
        assert_eq!(products[0]["synced"], true);
    }

    #[tokio::test]
    async fn upload_with_unappliable_row_is_a_server_error() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let batch = serde_json::json!({
            "branch_id": "cabang-1",
            "products": [product_row("p-1", "2024-05-01T01:00:00.000Z")],
            "sale_items": [{
                "id": "i-1",
                "sale_id": "no-such-sale",
                "product_id": "p-1",
                "qty": 1,
                "price": 10.0,
                "created_at": "2024-05-01T01:00:00.000Z",
                "updated_at": "2024-05-01T01:00:00.000Z",
            }],
        });

        let (status, body) = send(router, Method::POST, "/api/sync/upload", Some(batch)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("failed to apply"));
    }

    #[tokio::test]
    async fn malformed_upload_is_a_client_error() {
        let router = app_router(test_state(DatabaseService::open_in_memory().unwrap()));
        let (status, body) = send(
            router,
            Method::POST,
            "/api/sync/upload",
            Some(serde_json::json!({"products": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn replicas_sync_over_http() {
        let upstream_store = DatabaseService::open_in_memory().unwrap();
        let router = app_router(test_state(upstream_store.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let transport: Arc<dyn UpstreamTransport> = Arc::new(
            HttpUpstream::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap(),
        );
        let tmp = tempfile::tempdir().unwrap();
        let a = DatabaseService::open_path(tmp.path().join("a.db"))
            .unwrap()
            .with_default_branch("cabang-1");
        let b = DatabaseService::open_path(tmp.path().join("b.db"))
            .unwrap()
            .with_default_branch("cabang-1");

        let product = a
            .create_product(NewProduct {
                name: "Gula".to_string(),
                unit: "kg".to_string(),
                stock: 10,
                price: 15_000.0,
                ..NewProduct::default()
            })
            .await
            .unwrap();
        a.create_sale(NewSale {
            items: vec![NewSaleItem {
                product_id: product.id.clone(),
                qty: 3,
                price: None,
            }],
            ..NewSale::default()
        })
        .await
        .unwrap();

        let shutdown = CancellationToken::new();
        let engine_a = Arc::new(SyncEngine::new(a.clone(), Some(Arc::clone(&transport)), "cabang-1"));
        let engine_b = Arc::new(SyncEngine::new(b.clone(), Some(transport), "cabang-1"));
        let (handle_a, task_a) = SyncWorker::spawn(engine_a, None, shutdown.clone());
        let (handle_b, task_b) = SyncWorker::spawn(engine_b, None, shutdown.clone());

        let report = handle_a.run(CancellationToken::new()).await.unwrap();
        assert!(report.uploaded >= 4);
        assert_eq!(a.queued_changes().await.unwrap(), 0);

        handle_b.run(CancellationToken::new()).await.unwrap();
        let on_b = b.get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(on_b.stock, 7);
        assert_eq!(b.list_sales(10, 0).await.unwrap().len(), 1);
        assert!(b.last_sync_at().await.unwrap().is_some());

        shutdown.cancel();
        task_a.await.unwrap();
        task_b.await.unwrap();
        server.abort();
    }
}
