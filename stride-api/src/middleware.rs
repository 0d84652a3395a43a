//! Caller Identity
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! learner's id in a trusted header (`x-user-id` unless configured
//! otherwise); handlers receive it through the [`Caller`] extractor.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;
use stride_core::UserId;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Authenticated learner making the request.
///
/// Missing or malformed identity rejects the request with 401 before any
/// handler logic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl std::ops::Deref for Caller {
    type Target = UserId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<ApiConfig>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<ApiConfig>::from_ref(state);
        caller_from_parts(parts, &config.user_header)
    }
}

fn caller_from_parts(parts: &Parts, header: &str) -> Result<Caller, ApiError> {
    let value = parts
        .headers
        .get(header)
        .ok_or_else(|| unauthenticated(format!("Missing {} header", header)))?;
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<UserId>().ok())
        .map(Caller)
        .ok_or_else(|| unauthenticated(format!("Malformed {} header", header)))
}

fn unauthenticated(message: String) -> ApiError {
    tracing::debug!(reason = %message, "request rejected without caller identity");
    ApiError::unauthorized(message)
}
