//! # pawlink HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Edge count and backend
//! - `POST /users/{id}/follow` - Follow a user
//! - `DELETE /users/{id}/follow` - Unfollow a user
//! - `POST /users/{id}/follow/toggle` - Flip follow state
//! - `GET /users/{id}/follow` - Caller's follow status
//! - `GET /users/{id}/counts` - Follower/following totals
//! - `GET /users/{id}/profile` - Counts plus viewer relationship
//! - `GET /users/{id}/followers` - Paginated followers
//! - `GET /users/{id}/following` - Paginated followees
//! - `POST /follow/statuses` - Batch follow status
//! - `POST /export` - Snapshot export (base64)
//! - `GET /audit` - Count projection audit
//!
//! ## Security Configuration
//!
//! See `PawlinkConfig`: API key, rate limit and CORS origins.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, RequestCaller, keys_match};
pub use handlers::{ApiError, status_for};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AuditResponse, CountsResponse, DriftJson, EdgeJson, EdgeListResponse, ErrorResponse,
    ExportResponse, FollowResponse, FollowStatusResponse, HealthResponse, PageQuery,
    ProfileResponse, StatusResponse, StatusesRequest, StatusesResponse, TargetStatus,
};

use crate::config::PawlinkConfig;
use crate::error::{AppError, AppResult};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use pawlink_core::{GraphService, StorageBackend};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
///
/// The graph service synchronises internally, so it is shared without an
/// outer lock.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<GraphService<StorageBackend>>,
    pub config: Arc<PawlinkConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(graph: Arc<GraphService<StorageBackend>>, config: PawlinkConfig) -> Self {
        Self {
            graph,
            config: Arc::new(config),
        }
    }

    /// Fresh in-memory graph with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(GraphService::new(StorageBackend::default())),
            PawlinkConfig::default(),
        )
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

/// Build the CORS layer.
///
/// - `"*"`: all origins (development only)
/// - unset: localhost only
/// - otherwise: the comma-separated origin list
fn build_cors_layer(config: &PawlinkConfig) -> CorsLayer {
    let mut allowed_headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    if let Ok(name) = HeaderName::from_bytes(config.identity_header.as_bytes()) {
        allowed_headers.push(name);
    }

    match config.cors_origins.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
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

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors(allowed_headers)
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers(allowed_headers)
            }
        }
        None => build_localhost_cors(allowed_headers),
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors(allowed_headers: Vec<HeaderName>) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers(allowed_headers)
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Rate limiting (if enabled)
/// 4. API key authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/users/{id}/follow",
            post(handlers::follow_handler)
                .delete(handlers::unfollow_handler)
                .get(handlers::follow_status_handler),
        )
        .route("/users/{id}/follow/toggle", post(handlers::toggle_handler))
        .route("/users/{id}/counts", get(handlers::counts_handler))
        .route("/users/{id}/profile", get(handlers::profile_handler))
        .route("/users/{id}/followers", get(handlers::followers_handler))
        .route("/users/{id}/following", get(handlers::following_handler))
        .route("/follow/statuses", post(handlers::statuses_handler))
        .route("/export", post(handlers::export_handler))
        .route("/audit", get(handlers::audit_handler));

    // Authentication is innermost so it runs after rate limiting.
    match config.effective_api_key() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible! \
                 Set PAWLINK_API_KEY to enable authentication."
            );
        }
    }

    if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&config))
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> AppResult<()> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("pawlink HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
