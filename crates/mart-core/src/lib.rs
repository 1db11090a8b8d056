//! mart-core - Core library for Shosha Mart
//!
//! This crate contains the shared models, the branch-local store and the
//! offline-first sync protocol used by the upstream service and every branch
//! sidecar.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{
    Branch, EntityKind, Product, Sale, SaleItem, StockOpname, StockOpnameItem, SyncConflict,
    SyncMeta,
};
pub use services::DatabaseService;
pub use state::SyncStatus;
