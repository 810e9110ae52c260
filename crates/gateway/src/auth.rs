//! Owner context extraction
//!
//! Identity management is external: upstream auth terminates the
//! session and forwards the resolved owner in the `X-Owner-Id` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use hirelens_common::errors::AppError;
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Resolved owner of the current request
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| AppError::Forbidden {
                message: "missing X-Owner-Id header".into(),
            })?;

        let raw = header.to_str().map_err(|_| AppError::Forbidden {
            message: "malformed X-Owner-Id header".into(),
        })?;

        let owner_id = Uuid::parse_str(raw).map_err(|_| AppError::Forbidden {
            message: "X-Owner-Id is not a valid UUID".into(),
        })?;

        Ok(OwnerId(owner_id))
    }
}
