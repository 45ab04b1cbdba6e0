//! # Rating Common Library
//!
//! Shared code for the rating factor services including:
//! - Domain model for capital-event headers and their 30 factors
//! - Fixed-point (18,8) decimal helpers
//! - Configuration loading
//! - Database schema and persistence operations
//! - Role and capability checks

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod fixed;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{FactorId, FactorSet, HeaderId, Market, Origin};
