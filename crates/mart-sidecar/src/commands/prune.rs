use crate::commands::common::{format_prune_lines, open_store};
use crate::config::SidecarConfig;
use crate::error::CliError;

pub async fn run_prune(config: &SidecarConfig) -> Result<(), CliError> {
    let store = open_store(config)?;
    let report = store.prune_tombstones().await?;
    for line in format_prune_lines(&report) {
        println!("{line}");
    }
    Ok(())
}
