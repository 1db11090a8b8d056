use std::sync::Arc;

use mart_core::db::PruneReport;
use mart_core::sync::{HttpUpstream, SyncEngine, SyncSummary, UpstreamTransport};
use mart_core::util::format_timestamp_ms;
use mart_core::{DatabaseService, SyncConflict};
use serde::Serialize;

use crate::config::SidecarConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity: String,
    pub row_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub fn open_store(config: &SidecarConfig) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(&config.db_path)?.with_default_branch(&config.branch_id))
}

/// Engine for this replica; offline-only when no upstream URL is configured.
pub fn build_engine(
    config: &SidecarConfig,
    store: DatabaseService,
) -> Result<Arc<SyncEngine>, CliError> {
    let upstream = match &config.upstream_url {
        Some(url) => {
            let transport: Arc<dyn UpstreamTransport> =
                Arc::new(HttpUpstream::new(url.as_str(), config.sync_timeout)?);
            Some(transport)
        }
        None => None,
    };
    Ok(Arc::new(SyncEngine::new(
        store,
        upstream,
        config.branch_id.as_str(),
    )))
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity: conflict.entity.to_string(),
        row_id: conflict.row_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_timestamp_ms(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}={}  local={} incoming={}",
                format_timestamp_ms(conflict.resolved_at),
                conflict.strategy,
                conflict.entity,
                conflict.row_id,
                format_timestamp_ms(conflict.local_updated_at),
                format_timestamp_ms(conflict.incoming_updated_at)
            )
        })
        .collect()
}

pub fn format_summary_lines(summary: &SyncSummary) -> Vec<String> {
    let last_sync = summary.last_sync_at.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    let mut lines = vec![
        format!("Store:           {}", summary.db_path),
        format!("Queued changes:  {}", summary.queued_changes),
        format!("Last sync:       {last_sync}"),
        format!("Status:          {}", summary.status),
    ];
    if let Some(error) = &summary.last_error {
        lines.push(format!("Last error:      {error}"));
    }
    lines
}

pub fn format_prune_lines(report: &PruneReport) -> Vec<String> {
    if report.total() == 0 {
        return vec!["No acknowledged tombstones to prune.".to_string()];
    }
    [
        ("sale_items", report.sale_items),
        ("stock_opname_items", report.stock_opname_items),
        ("sales", report.sales),
        ("stock_opnames", report.stock_opnames),
        ("products", report.products),
        ("branches", report.branches),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(table, count)| format!("{table:<19} {count}"))
    .collect()
}
