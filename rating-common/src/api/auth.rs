//! Role and capability checks
//!
//! Roles are resolved by the upstream identity layer and handed to the
//! services as plain values. This module only decides whether a resolved
//! role may perform an operation; it never looks anything up.
//!
//! # Capabilities
//!
//! - [`Capability::Preview`]: upload a file and inspect the validation preview
//! - [`Capability::Confirm`]: everything in Preview, plus committing rows

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========================================
// Roles
// ========================================

/// Caller role as resolved upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System administrator
    Admin,
    /// Tax analyst
    Analyst,
    /// Stock broker (single-record entry only)
    Broker,
    /// Supervisor (read/consult only)
    Supervisor,
}

impl Role {
    /// Highest ingestion capability granted to the role, if any
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Role::Admin | Role::Analyst => Some(Capability::Confirm),
            Role::Supervisor => Some(Capability::Preview),
            Role::Broker => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
            Role::Broker => "broker",
            Role::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "1" => Ok(Role::Admin),
            "analyst" | "2" => Ok(Role::Analyst),
            "broker" | "3" => Ok(Role::Broker),
            "supervisor" | "4" => Ok(Role::Supervisor),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

// ========================================
// Capabilities
// ========================================

/// Ingestion permission level; `Confirm` implies `Preview`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Preview,
    Confirm,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Preview => f.write_str("preview"),
            Capability::Confirm => f.write_str("confirm"),
        }
    }
}

/// Denied capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub role: Role,
    pub required: Capability,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role '{}' lacks the '{}' capability", self.role, self.required)
    }
}

impl std::error::Error for AccessDenied {}

/// Allow or deny a resolved role for a required capability
///
/// # Examples
///
/// ```
/// use rating_common::api::auth::{require, Capability, Role};
///
/// assert!(require(Role::Analyst, Capability::Confirm).is_ok());
/// assert!(require(Role::Supervisor, Capability::Preview).is_ok());
/// assert!(require(Role::Supervisor, Capability::Confirm).is_err());
/// ```
pub fn require(role: Role, required: Capability) -> Result<(), AccessDenied> {
    match role.capability() {
        Some(granted) if granted >= required => Ok(()),
        _ => Err(AccessDenied { role, required }),
    }
}
