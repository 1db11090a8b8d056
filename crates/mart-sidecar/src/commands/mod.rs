pub mod common;
pub mod prune;
pub mod serve;
pub mod summary;
pub mod sync;
