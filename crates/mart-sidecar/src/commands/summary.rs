use mart_core::sync::{SyncSummary, WorkerState};

use crate::commands::common::{format_summary_lines, open_store};
use crate::config::SidecarConfig;
use crate::error::CliError;

pub async fn run_summary(as_json: bool, config: &SidecarConfig) -> Result<(), CliError> {
    let store = open_store(config)?;
    let summary = SyncSummary::collect(&store, WorkerState::default()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_summary_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}
