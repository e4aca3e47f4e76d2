//! # Middleware Module
//!
//! Global rate limiting for the Ranktrail HTTP API. The limit comes from
//! `RANKTRAIL_RATE_LIMIT` via [`crate::config::ServerConfig`].

use super::types::ActionResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Fallback quota when asked for a zero rate.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(crate::config::DEFAULT_RATE_LIMIT).unwrap();

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Process-wide limiter shared by every route.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a limiter allowing `requests_per_second`, or the default when zero.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Reject the request with 429 once the global quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.check().is_ok() {
        return next.run(request).await;
    }
    tracing::warn!(event = "rate_limited", path = %request.uri().path(), "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ActionResponse::error("Too many requests. Please try again shortly.")),
    )
        .into_response()
}

// =============================================================================
// TESTS
// =============================================================================
