use mart_core::sync::SyncWorker;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::commands::common::{build_engine, open_store};
use crate::config::SidecarConfig;
use crate::error::CliError;
use crate::routes::{app_router, AppState};

pub async fn run_serve(bind: Option<String>, config: &SidecarConfig) -> Result<(), CliError> {
    let store = open_store(config)?;
    let engine = build_engine(config, store.clone())?;
    let shutdown = CancellationToken::new();
    let (sync, worker) = SyncWorker::spawn(engine, Some(config.sync_interval), shutdown.clone());

    let router = app_router(AppState::new(store, sync));
    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        bind_addr = %bind_addr,
        branch_id = %config.branch_id,
        upstream = config.upstream_url.as_deref().unwrap_or("none"),
        "mart sidecar listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = worker.await {
        tracing::error!("Sync worker task failed: {err}");
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(err) => {
                tracing::error!("Failed to listen for shutdown signal: {err}");
                shutdown.cancelled().await;
            }
        },
        () = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
