//! # Middleware Module
//!
//! Global rate limiting for the pawlink HTTP API. The limit comes from
//! `PawlinkConfig::rate_limit` (`PAWLINK_RATE_LIMIT`); zero disables it.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Fallback when asked for a zero quota.
const FALLBACK_RPS: NonZeroU32 = NonZeroU32::MIN.saturating_add(99);

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new global rate limiter allowing `requests_per_second`.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(FALLBACK_RPS);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Returns 429 Too Many Requests once the global quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(event = "rate_limited", "Rate limit exceeded");
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
