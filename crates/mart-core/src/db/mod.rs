//! Local store for Shosha Mart

mod connection;
mod entity;
mod migrations;
mod repository;
mod sync_state_repository;
pub mod sync_store;

pub use connection::Database;
pub use entity::SyncEntity;
pub use repository::{LedgerRepository, SqliteLedgerRepository};
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};
pub use sync_store::{PruneReport, UpsertOutcome, UpsertPolicy};
