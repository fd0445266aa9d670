//! # Authentication Module
//!
//! Two separate concerns live here:
//!
//! - **API key**: optional bearer token guarding the whole API, for
//!   deployments where pawlink sits behind a trusted gateway.
//! - **Caller identity**: the user id the gateway asserts for this request,
//!   read from the configured identity header (default `x-pawlink-user`).
//!   A missing or malformed header means an anonymous caller.
//!
//! ```text
//! Authorization: Bearer <api-key>
//! x-pawlink-user: 42
//! ```

use super::AppState;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use pawlink_core::{Caller, IdentityResolver, UserId};
use std::convert::Infallible;
use std::sync::Arc;
use subtle::ConstantTimeEq;

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// The configured API key.
pub type ApiKey = Arc<str>;

/// Constant-time key comparison.
///
/// Both keys are padded to the same length so `ct_eq` always runs over the
/// same number of bytes.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed (for load balancer checks). Everything else
/// requires `Authorization: Bearer <key>`.
pub async fn api_key_auth_middleware(
    State(expected): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) => {
            // Support both "Bearer <key>" and raw "<key>" formats
            let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
            if keys_match(provided, &expected) {
                Ok(next.run(request).await)
            } else {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_api_key",
                    "Authentication failed: invalid API key"
                );
                Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
            }
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// The caller behind the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestCaller(pub Caller);

impl RequestCaller {
    /// Parse an identity header value. Anything but a decimal id is anonymous.
    pub fn from_header_value(value: Option<&str>) -> Self {
        let id = value.and_then(|v| v.trim().parse::<u64>().ok()).map(UserId);
        Self(Caller::from(id))
    }
}

impl IdentityResolver for RequestCaller {
    fn resolve(&self) -> Caller {
        self.0
    }
}

impl FromRequestParts<AppState> for RequestCaller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(state.config.identity_header.as_str())
            .and_then(|v| v.to_str().ok());
        Ok(Self::from_header_value(value))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_exact_only() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secre", "secret"));
        assert!(!keys_match("secret\0", "secret"));
        assert!(!keys_match("", "secret"));
    }

    #[test]
    fn header_parsing() {
        assert_eq!(
            RequestCaller::from_header_value(Some(" 42 ")).resolve(),
            Caller::user(UserId(42))
        );
        assert_eq!(
            RequestCaller::from_header_value(Some("alice")).resolve(),
            Caller::Anonymous
        );
        assert_eq!(
            RequestCaller::from_header_value(Some("-1")).resolve(),
            Caller::Anonymous
        );
        assert_eq!(
            RequestCaller::from_header_value(None).resolve(),
            Caller::Anonymous
        );
    }
}
