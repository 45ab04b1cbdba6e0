//! API module for shared HTTP API functionality
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Shared types
//!
//! Each service wraps these with framework-specific extractors (Axum, etc.).

pub mod auth;

pub use auth::{require, AccessDenied, Capability, Role};
