//! Caller identity
//!
//! The authenticating proxy in front of the orchestrator forwards the
//! caller's identity in the `x-gantry-principal` header.

use axum::{extract::FromRequestParts, http::request::Parts};
use gantry_core::domain::access::{PRINCIPAL_HEADER, Principal};

use crate::api::error::ApiError;

/// Extracts the calling principal; rejects the request with 401 if absent.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Caller(Principal::new(name)))
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {PRINCIPAL_HEADER} header")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/api/executions");
        if let Some(value) = header {
            builder = builder.header(PRINCIPAL_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_principal_from_header() {
        let Caller(principal) = extract(Some("alice")).await.unwrap();
        assert_eq!(principal.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_missing_or_blank_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(ApiError::Unauthorized(_))));
        assert!(matches!(extract(Some("  ")).await, Err(ApiError::Unauthorized(_))));
    }
}
