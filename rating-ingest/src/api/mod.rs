//! HTTP API handlers for rating-ingest

pub mod buildinfo;
pub mod guard;
pub mod health;
pub mod ingest;

pub use buildinfo::get_build_info;
pub use guard::Caller;
pub use health::health_routes;
pub use ingest::{confirm, preview, results, results_csv, upload};
