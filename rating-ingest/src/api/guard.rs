//! Caller identity and capability guard
//!
//! Session and role are resolved by the upstream session layer and arrive as
//! request headers. Handlers take a [`Caller`] and call
//! [`Caller::require`] before touching any state.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use rating_common::api::{self, Capability, Role};
use tracing::warn;

use crate::error::ApiError;

/// Opaque session identifier header
pub const SESSION_HEADER: &str = "x-session-id";

/// Resolved role header (`admin`, `analyst`, `supervisor`, `broker`)
pub const ROLE_HEADER: &str = "x-user-role";

/// Authenticated caller of an ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub session: String,
    pub role: Role,
}

impl Caller {
    /// Fail with 403 unless the caller's role grants `required`
    pub fn require(&self, required: Capability) -> Result<(), ApiError> {
        api::require(self.role, required).map_err(|denied| {
            warn!(session_id = %self.session, role = %self.role, required = ?required, "Access denied");
            ApiError::from(denied)
        })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = header_value(parts, SESSION_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", SESSION_HEADER)))?
            .to_string();

        let role = header_value(parts, ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", ROLE_HEADER)))?
            .parse::<Role>()
            .map_err(ApiError::Unauthorized)?;

        Ok(Caller { session, role })
    }
}
