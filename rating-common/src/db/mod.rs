//! Database schema and persistence operations

pub mod init;
pub mod ratings;

pub use init::*;
