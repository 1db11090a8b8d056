use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use clap::Parser;
use mart_core::db::PruneReport;
use mart_core::models::EntityKind;
use mart_core::sync::{SyncError, SyncReport, SyncSummary};
use mart_core::{SyncConflict, SyncStatus};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands};
use crate::commands::common::{
    build_engine, format_prune_lines, format_summary_lines, format_sync_conflict_lines,
    open_store, sync_conflict_to_item,
};
use crate::commands::sync::format_report_lines;
use crate::config::{ConfigError, SidecarConfig};
use crate::error::AppError;

fn config_from(pairs: &[(&str, &str)]) -> Result<SidecarConfig, ConfigError> {
    let map: HashMap<&str, &str> = pairs.iter().copied().collect();
    SidecarConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
}

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

#[test]
fn config_defaults_to_offline_only() {
    let config = config_from(&[]).unwrap();
    assert_eq!(config.db_path, PathBuf::from("offline.db"));
    assert_eq!(config.bind_addr, "0.0.0.0:8080");
    assert_eq!(config.upstream_url, None);
    assert_eq!(config.branch_id, "local");
    assert_eq!(config.sync_interval, Duration::from_secs(300));
    assert_eq!(config.sync_timeout, Duration::from_secs(30));
}

#[test]
fn config_reads_and_trims_environment() {
    let config = config_from(&[
        ("POS_UPSTREAM_URL", " https://pusat.example/ "),
        ("POS_BRANCH_ID", "cabang-7"),
        ("POS_SYNC_INTERVAL_SECS", "60"),
        ("POS_SYNC_TIMEOUT_SECS", "10"),
    ])
    .unwrap();
    assert_eq!(config.upstream_url.as_deref(), Some("https://pusat.example"));
    assert_eq!(config.branch_id, "cabang-7");
    assert_eq!(config.sync_interval, Duration::from_secs(60));
    assert_eq!(config.sync_timeout, Duration::from_secs(10));
}

#[test]
fn config_rejects_bad_values() {
    assert!(config_from(&[("POS_UPSTREAM_URL", "pusat.example")]).is_err());
    assert!(config_from(&[("POS_SYNC_INTERVAL_SECS", "1")]).is_err());
    assert!(config_from(&[("POS_SYNC_TIMEOUT_SECS", "abc")]).is_err());
    let err = config_from(&[("POS_SYNC_TIMEOUT_SECS", "601")]).unwrap_err();
    assert!(err.to_string().contains("POS_SYNC_TIMEOUT_SECS"));
}

#[test]
fn cli_flags_override_environment() {
    let cli = Cli::parse_from([
        "mart",
        "sync",
        "--db-path",
        "/tmp/cabang.db",
        "--upstream",
        "http://10.0.0.5:9000",
        "--branch-id",
        "cabang-2",
        "--timeout",
        "15",
    ]);
    let config = config_from(&[("POS_BRANCH_ID", "cabang-1")])
        .unwrap()
        .with_cli(&cli)
        .unwrap();

    assert_eq!(config.db_path, PathBuf::from("/tmp/cabang.db"));
    assert_eq!(config.upstream_url.as_deref(), Some("http://10.0.0.5:9000"));
    assert_eq!(config.branch_id, "cabang-2");
    assert!(matches!(cli.command, Some(Commands::Sync { timeout: Some(15) })));
}

#[test]
fn cli_rejects_invalid_upstream_flag() {
    let cli = Cli::parse_from(["mart", "--upstream", "ftp://pusat"]);
    assert!(config_from(&[]).unwrap().with_cli(&cli).is_err());
    assert!(cli.command.is_none());
}

#[tokio::test]
async fn engine_is_offline_only_without_upstream() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_from(&[]).unwrap();
    config.db_path = tmp.path().join("offline.db");

    let store = open_store(&config).unwrap();
    assert!(!build_engine(&config, store.clone()).unwrap().is_configured());

    config.upstream_url = Some("http://127.0.0.1:9".to_string());
    let engine = build_engine(&config, store).unwrap();
    assert!(engine.is_configured());
    assert_eq!(engine.branch_id(), "local");
}

#[test]
fn conflict_lines_name_entity_and_row() {
    let conflict = SyncConflict {
        id: 1,
        entity: EntityKind::Product,
        row_id: "p-1".to_string(),
        local_updated_at: 1_714_525_200_000,
        incoming_updated_at: 1_714_525_100_000,
        resolved_at: 1_714_525_300_000,
        strategy: "last_applied".to_string(),
    };

    let lines = format_sync_conflict_lines(std::slice::from_ref(&conflict));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("products=p-1"));
    assert!(lines[0].contains("last_applied"));

    let item = sync_conflict_to_item(&conflict);
    assert_eq!(item.entity, "products");
    assert_eq!(item.resolved_at_iso, "2024-05-01 01:01:40 UTC");
}

#[test]
fn summary_lines_show_never_and_error() {
    let summary = SyncSummary {
        queued_changes: 3,
        last_sync_at: None,
        db_path: "offline.db".to_string(),
        status: SyncStatus::Offline,
        last_error: Some("upstream not configured".to_string()),
        last_run_at: None,
    };

    let lines = format_summary_lines(&summary);
    assert_eq!(lines[1], "Queued changes:  3");
    assert_eq!(lines[2], "Last sync:       never");
    assert_eq!(lines[3], "Status:          offline");
    assert_eq!(lines[4], "Last error:      upstream not configured");
}

#[test]
fn prune_lines_list_nonzero_tables() {
    assert_eq!(
        format_prune_lines(&PruneReport::default()),
        vec!["No acknowledged tombstones to prune.".to_string()]
    );

    let report = PruneReport {
        sale_items: 2,
        sales: 1,
        ..PruneReport::default()
    };
    assert_eq!(
        format_prune_lines(&report),
        vec![
            "sale_items          2".to_string(),
            "sales               1".to_string(),
        ]
    );
}

#[test]
fn report_lines_include_watermark() {
    let report = SyncReport {
        uploaded: 4,
        downloaded: 2,
        watermark: Some(at("2024-05-01T08:30:00Z")),
        ..SyncReport::default()
    };
    assert_eq!(
        format_report_lines(&report),
        vec![
            "Sync completed: uploaded 4, downloaded 2, pruned 0, conflicts 0".to_string(),
            "Watermark: 2024-05-01 08:30:00 UTC".to_string(),
        ]
    );
}

#[test]
fn sync_errors_map_to_their_origin() {
    let status = |error: SyncError| AppError::from(error).into_response().status();

    assert_eq!(status(SyncError::AlreadyRunning), StatusCode::CONFLICT);
    assert_eq!(status(SyncError::NotConfigured), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        status(SyncError::Api("service unavailable (503)".to_string())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status(SyncError::Store(mart_core::Error::Io(std::io::Error::other(
            "disk I/O error"
        )))),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
