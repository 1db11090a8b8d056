//! Shared services used by the upstream binary and the branch sidecar.

mod database;

pub use database::DatabaseService;
