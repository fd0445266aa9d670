//! # API Endpoint Handlers
//!
//! Store calls are synchronous (redb transactions, lock acquisition), so
//! every handler hands its graph work to `spawn_blocking`.

use super::{
    AppState,
    auth::RequestCaller,
    types::{
        AuditResponse, CountsResponse, EdgeListResponse, ErrorResponse, ExportResponse,
        FollowResponse, FollowStatusResponse, HealthResponse, PageQuery, ProfileResponse,
        StatusResponse, StatusesRequest, StatusesResponse, TargetStatus,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pawlink_core::{
    CountProjection, EdgeStore, GraphError, GraphService, Mutation, Snapshot, StorageBackend,
    UserId, compute_blake3_hash, snapshot_to_bytes,
};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a domain error.
pub fn status_for(err: &GraphError) -> StatusCode {
    match err {
        GraphError::Unauthenticated => StatusCode::UNAUTHORIZED,
        GraphError::SelfFollowRejected => StatusCode::UNPROCESSABLE_ENTITY,
        GraphError::AlreadyFollowing | GraphError::NotFollowing => StatusCode::CONFLICT,
        GraphError::TransientStorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        GraphError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GraphError::InvalidRequest(_) | GraphError::Snapshot(_) => StatusCode::BAD_REQUEST,
    }
}

/// A graph error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub GraphError);

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(ErrorResponse::from(&self.0))).into_response()
    }
}

/// Run `work` against the graph on the blocking pool.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&GraphService<StorageBackend>) -> Result<T, GraphError> + Send + 'static,
{
    let graph = state.graph.clone();
    tokio::task::spawn_blocking(move || work(&graph))
        .await
        .map_err(|e| {
            tracing::error!(event = "blocking_task_failed", "{}", e);
            ApiError(GraphError::TransientStorageFailure(
                "worker task failed".to_string(),
            ))
        })?
        .map_err(ApiError)
}

/// Turn a mutation result into a response, folding idempotency signals
/// into `200 changed=false`.
fn mutation_response(target: u64, result: Result<Mutation, GraphError>) -> Response {
    match result {
        Ok(mutation) => (StatusCode::OK, Json(FollowResponse::changed(&mutation))).into_response(),
        Err(err) => match FollowResponse::unchanged(target, &err) {
            Some(body) => (StatusCode::OK, Json(body)).into_response(),
            None => ApiError(err).into_response(),
        },
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Get graph status.
pub async fn status_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (edge_count, persistent, strategy) = blocking(&state, |graph| {
        let store = graph.store();
        let edges = store
            .edge_count()
            .map_err(|e| GraphError::TransientStorageFailure(e.to_string()))?;
        Ok((edges, store.is_persistent(), store.projection_strategy()))
    })
    .await?;

    let response = StatusResponse {
        edge_count,
        backend: if persistent { "redb" } else { "memory" }.to_string(),
        counts_strategy: strategy.to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

// =============================================================================
// FOLLOW MUTATIONS
// =============================================================================

/// `POST /users/{id}/follow`
pub async fn follow_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Path(target): Path<u64>,
) -> Response {
    let result = blocking(&state, move |graph| {
        Ok(graph.follow(&caller, UserId(target)))
    })
    .await;
    match result {
        Ok(outcome) => mutation_response(target, outcome),
        Err(err) => err.into_response(),
    }
}

/// `DELETE /users/{id}/follow`
pub async fn unfollow_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Path(target): Path<u64>,
) -> Response {
    let result = blocking(&state, move |graph| {
        Ok(graph.unfollow(&caller, UserId(target)))
    })
    .await;
    match result {
        Ok(outcome) => mutation_response(target, outcome),
        Err(err) => err.into_response(),
    }
}

/// `POST /users/{id}/follow/toggle`
pub async fn toggle_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Path(target): Path<u64>,
) -> Response {
    let result = blocking(&state, move |graph| {
        Ok(graph.toggle(&caller, UserId(target)))
    })
    .await;
    match result {
        Ok(outcome) => mutation_response(target, outcome),
        Err(err) => err.into_response(),
    }
}

// =============================================================================
// STATUS QUERIES
// =============================================================================

/// `GET /users/{id}/follow`
pub async fn follow_status_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Path(target): Path<u64>,
) -> Result<Json<FollowStatusResponse>, ApiError> {
    let authenticated = caller.0.is_authenticated();
    let following = blocking(&state, move |graph| {
        graph.is_following(&caller, UserId(target))
    })
    .await?;
    Ok(Json(FollowStatusResponse {
        target,
        following,
        authenticated,
    }))
}

/// `POST /follow/statuses`
pub async fn statuses_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Json(request): Json<StatusesRequest>,
) -> Result<Json<StatusesResponse>, ApiError> {
    request.validate()?;
    let targets: Vec<UserId> = request.targets.iter().copied().map(UserId).collect();
    let statuses = blocking(&state, move |graph| {
        graph.follow_statuses(&caller, &targets)
    })
    .await?;
    Ok(Json(StatusesResponse {
        statuses: statuses
            .into_iter()
            .map(|(target, following)| TargetStatus {
                target: target.0,
                following,
            })
            .collect(),
    }))
}

// =============================================================================
// COUNTS / PROFILE / LISTINGS
// =============================================================================

/// `GET /users/{id}/counts`
pub async fn counts_handler(
    State(state): State<AppState>,
    Path(user): Path<u64>,
) -> Result<Json<CountsResponse>, ApiError> {
    let counts = blocking(&state, move |graph| graph.follow_counts(UserId(user))).await?;
    Ok(Json(CountsResponse::new(user, counts)))
}

/// `GET /users/{id}/profile`
pub async fn profile_handler(
    State(state): State<AppState>,
    caller: RequestCaller,
    Path(user): Path<u64>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let summary = blocking(&state, move |graph| graph.profile(&caller, UserId(user))).await?;
    Ok(Json(ProfileResponse::from(summary)))
}

/// `GET /users/{id}/followers`
pub async fn followers_handler(
    State(state): State<AppState>,
    Path(user): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<EdgeListResponse>, ApiError> {
    let page = query.to_page();
    let edges = blocking(&state, move |graph| graph.followers(UserId(user), page)).await?;
    Ok(Json(EdgeListResponse::new(user, page, &edges)))
}

/// `GET /users/{id}/following`
pub async fn following_handler(
    State(state): State<AppState>,
    Path(user): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<EdgeListResponse>, ApiError> {
    let page = query.to_page();
    let edges = blocking(&state, move |graph| graph.following(UserId(user), page)).await?;
    Ok(Json(EdgeListResponse::new(user, page, &edges)))
}

// =============================================================================
// EXPORT / AUDIT
// =============================================================================

/// Export the edge set as a base64 snapshot.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let result = blocking(&state, |graph| {
        let edges = graph
            .store()
            .edges()
            .map_err(|e| GraphError::TransientStorageFailure(e.to_string()))?;
        let snapshot = Snapshot::from_edges(&edges);
        let bytes = snapshot_to_bytes(&snapshot)?;
        Ok((bytes, snapshot.checksum(), snapshot.edges.len() as u64))
    })
    .await;

    match result {
        Ok((bytes, checksum, edge_count)) => {
            let digest = compute_blake3_hash(&bytes);
            (
                StatusCode::OK,
                Json(ExportResponse::success(&bytes, checksum, digest, edge_count)),
            )
        }
        Err(ApiError(e)) => (
            status_for(&e),
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}

/// Check the count projection against the edge set.
///
/// Answers 500 with the full report when drift is found.
pub async fn audit_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (status, report) = blocking(&state, |graph| match graph.audit() {
        Ok(report) => Ok((StatusCode::OK, report)),
        Err(GraphError::InvariantViolation(_)) => CountProjection::audit(graph.store())
            .map(|report| (StatusCode::INTERNAL_SERVER_ERROR, report))
            .map_err(|e| GraphError::TransientStorageFailure(e.to_string())),
        Err(e) => Err(e),
    })
    .await?;
    Ok((status, Json(AuditResponse::from(&report))).into_response())
}
