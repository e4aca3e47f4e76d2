//! # Ranktrail HTTP API Module
//!
//! JSON API over the tracker, served with axum.
//!
//! ## Endpoints
//!
//! Public:
//! - `GET /health` - Health check
//! - `POST /login` - Sign in with email and password, sets the session cookie
//! - `POST /logout` - End the session and clear the cookie
//!
//! Signed in:
//! - `GET /me` - Current user
//! - `GET /tracker?member_id=` - Member dashboard
//! - `GET /leader` - Leader dashboard (leaders)
//! - `POST /eligibility/preview` - Eligibility date for unsaved input
//! - `POST /progress` - Save a progress record
//! - `POST /progress/{id}/approve` - Approve (linked leaders, admins)
//! - `POST /progress/{id}/revoke` - Revoke an approval (linked leaders, admins)
//! - `POST /progress/{id}/request-approval` - Ask a linked leader to review
//! - `POST /progress/{id}/notes` - Add a note
//! - `POST /progress/{id}/subtasks` - Toggle a subtask
//! - `POST /links` - Request or create a leader link
//! - `POST /links/approve` - Approve a pending link (admins)
//! - `GET /audit` - Audit log (admins)
//!
//! Settings come from [`ServerConfig`]; see [`crate::config`] for the
//! `RANKTRAIL_*` environment variables.

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for integration tests (via `ranktrail::api::*`) and the CLI.
pub use auth::{
    CurrentUser, SESSION_COOKIE, hash_password, hash_token, session_cookie, verify_login,
    verify_password,
};
pub use handlers::{ApiError, status_for};
pub use middleware::create_rate_limiter;
pub use types::{
    ActionResponse, ApproveRequest, EligibilityPreviewRequest, EligibilityPreviewResponse,
    HealthResponse, LinkApproveRequest, LinkRequest, LoginRequest, NoteRequest, RecordResponse,
    RequestApprovalRequest, RevokeRequest, SaveProgressRequest, SubtaskRequest, TrackerQuery,
    UserResponse, parse_date,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use ranktrail_core::{Tracker, TrackerError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<RwLock<Tracker>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(tracker: Tracker, config: ServerConfig) -> Self {
        Self {
            tracker: Arc::new(RwLock::new(tracker)),
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `RANKTRAIL_CORS_ORIGINS`.
///
/// - "*": any origin, without credentials
/// - unset: localhost only
/// - otherwise: the listed origins, with credentials so the session cookie flows
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (RANKTRAIL_CORS_ORIGINS=*). Browsers will not send the session cookie cross-origin."
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in RANKTRAIL_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                credentialed_cors(allowed)
            }
        }
        None => {
            tracing::info!("CORS: No RANKTRAIL_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();
    credentialed_cors(origins)
}

fn credentialed_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Session resolution (signed-in routes only)
pub fn create_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let signed_in = Router::new()
        .route("/me", get(handlers::me_handler))
        .route("/tracker", get(handlers::tracker_handler))
        .route("/leader", get(handlers::leader_handler))
        .route(
            "/eligibility/preview",
            post(handlers::eligibility_preview_handler),
        )
        .route("/progress", post(handlers::save_progress_handler))
        .route("/progress/{id}/approve", post(handlers::approve_handler))
        .route("/progress/{id}/revoke", post(handlers::revoke_handler))
        .route(
            "/progress/{id}/request-approval",
            post(handlers::request_approval_handler),
        )
        .route("/progress/{id}/notes", post(handlers::add_note_handler))
        .route("/progress/{id}/subtasks", post(handlers::subtask_handler))
        .route("/links", post(handlers::create_link_handler))
        .route("/links/approve", post(handlers::approve_link_handler))
        .route("/audit", get(handlers::audit_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/login", post(handlers::login_handler))
        .route("/logout", post(handlers::logout_handler))
        .merge(signed_in);

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    if !config.secure_cookies {
        tracing::warn!("Session cookies are sent without the Secure flag");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(config.cors_origins.as_deref()))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(
    addr: &str,
    tracker: Tracker,
    config: ServerConfig,
) -> Result<(), TrackerError> {
    let router = create_router(AppState::new(tracker, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TrackerError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Ranktrail HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TrackerError::IoError(format!("Server error: {}", e)))
}

/// Resolves on Ctrl-C so in-flight requests and the redb handle close cleanly.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
