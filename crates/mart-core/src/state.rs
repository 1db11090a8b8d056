//! Replica sync status shared by the worker, the local API and the CLI.

use serde::{Deserialize, Serialize};

/// Where a replica's reconciliation worker currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No cycle has run yet.
    #[default]
    Idle,
    Running,
    /// Last cycle completed against upstream.
    Online,
    /// Last cycle failed, or no upstream is configured.
    Offline,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
