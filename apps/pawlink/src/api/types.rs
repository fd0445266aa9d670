//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use pawlink_core::{
    AuditReport, FollowCounts, FollowEdge, GraphError, Mutation, Page, ProfileSummary,
    primitives::MAX_STATUS_BATCH,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Graph status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub edge_count: u64,
    pub backend: String,
    pub counts_strategy: String,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body returned with every non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `self_follow_rejected`.
    pub code: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

impl From<&GraphError> for ErrorResponse {
    fn from(err: &GraphError) -> Self {
        let code = match err {
            GraphError::Unauthenticated => "unauthenticated",
            GraphError::SelfFollowRejected => "self_follow_rejected",
            GraphError::AlreadyFollowing => "already_following",
            GraphError::NotFollowing => "not_following",
            GraphError::TransientStorageFailure(_) => "storage_unavailable",
            GraphError::InvariantViolation(_) => "internal_error",
            GraphError::InvalidRequest(_) => "invalid_request",
            GraphError::Snapshot(_) => "snapshot_error",
        };
        // Invariant details stay in the server log.
        let message = match err {
            GraphError::InvariantViolation(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self::new(code, message)
    }
}

// =============================================================================
// FOLLOW / UNFOLLOW / TOGGLE
// =============================================================================

/// Result of a follow, unfollow or toggle.
///
/// `changed = false` means the requested state already held; `following`
/// always reports the state after the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowResponse {
    pub target: u64,
    pub following: bool,
    pub changed: bool,
    /// Millisecond timestamp of the mutation, when one happened.
    pub at: Option<u64>,
    /// `already_following` / `not_following` when nothing changed.
    pub signal: Option<String>,
}

impl FollowResponse {
    pub fn changed(mutation: &Mutation) -> Self {
        Self {
            target: mutation.following.0,
            following: mutation.is_following(),
            changed: true,
            at: Some(mutation.at.0),
            signal: None,
        }
    }

    /// Convert an idempotency signal into the converged state.
    ///
    /// Returns `None` for any other error.
    pub fn unchanged(target: u64, err: &GraphError) -> Option<Self> {
        let (following, signal) = match err {
            GraphError::AlreadyFollowing => (true, "already_following"),
            GraphError::NotFollowing => (false, "not_following"),
            _ => return None,
        };
        Some(Self {
            target,
            following,
            changed: false,
            at: None,
            signal: Some(signal.to_string()),
        })
    }
}

/// Follow status of the caller toward one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowStatusResponse {
    pub target: u64,
    pub following: bool,
    pub authenticated: bool,
}

// =============================================================================
// BATCH STATUS
// =============================================================================

/// Batch status request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusesRequest {
    pub targets: Vec<u64>,
}

impl StatusesRequest {
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.targets.len() > MAX_STATUS_BATCH {
            return Err(GraphError::InvalidRequest(format!(
                "at most {} targets per request",
                MAX_STATUS_BATCH
            )));
        }
        Ok(())
    }
}

/// One row of a batch status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target: u64,
    pub following: bool,
}

/// Batch status response, ordered by target id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusesResponse {
    pub statuses: Vec<TargetStatus>,
}

// =============================================================================
// COUNTS / PROFILE
// =============================================================================

/// Follower/following totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsResponse {
    pub user: u64,
    pub followers_count: u64,
    pub following_count: u64,
}

impl CountsResponse {
    pub fn new(user: u64, counts: FollowCounts) -> Self {
        Self {
            user,
            followers_count: counts.followers_count,
            following_count: counts.following_count,
        }
    }
}

/// Profile widget data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: u64,
    pub followers_count: u64,
    pub following_count: u64,
    pub viewer_follows: bool,
    pub is_self: bool,
}

impl From<ProfileSummary> for ProfileResponse {
    fn from(summary: ProfileSummary) -> Self {
        Self {
            user: summary.user.0,
            followers_count: summary.counts.followers_count,
            following_count: summary.counts.following_count,
            viewer_follows: summary.viewer_follows,
            is_self: summary.is_self,
        }
    }
}

// =============================================================================
// LISTINGS
// =============================================================================

/// `?offset=&limit=` query parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn to_page(self) -> Page {
        Page::new(self.offset.unwrap_or(0), self.limit.unwrap_or(0))
    }
}

/// One edge in JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeJson {
    pub follower: u64,
    pub following: u64,
    pub created_at: u64,
}

impl From<&FollowEdge> for EdgeJson {
    fn from(edge: &FollowEdge) -> Self {
        Self {
            follower: edge.follower.0,
            following: edge.following.0,
            created_at: edge.created_at.0,
        }
    }
}

/// A page of followers or followees, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeListResponse {
    pub user: u64,
    pub offset: usize,
    pub limit: usize,
    pub edges: Vec<EdgeJson>,
}

impl EdgeListResponse {
    pub fn new(user: u64, page: Page, edges: &[FollowEdge]) -> Self {
        Self {
            user,
            offset: page.offset,
            limit: page.limit,
            edges: edges.iter().map(EdgeJson::from).collect(),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Snapshot export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    /// BLAKE3 hex digest of the snapshot bytes.
    pub digest: Option<String>,
    pub edge_count: Option<u64>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64, digest: String, edge_count: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            digest: Some(digest),
            edge_count: Some(edge_count),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            digest: None,
            edge_count: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// AUDIT RESPONSE
// =============================================================================

/// One user whose served counts disagree with the edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftJson {
    pub user: u64,
    pub served_followers: u64,
    pub served_following: u64,
    pub actual_followers: u64,
    pub actual_following: u64,
}

/// Count projection audit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    pub consistent: bool,
    pub strategy: String,
    pub edge_count: u64,
    pub users_checked: usize,
    pub self_edges: Vec<u64>,
    pub drift: Vec<DriftJson>,
}

impl From<&AuditReport> for AuditResponse {
    fn from(report: &AuditReport) -> Self {
        Self {
            consistent: report.is_consistent(),
            strategy: report.strategy.to_string(),
            edge_count: report.edge_count,
            users_checked: report.users_checked,
            self_edges: report.self_edges.iter().map(|u| u.0).collect(),
            drift: report
                .drift
                .iter()
                .map(|d| DriftJson {
                    user: d.user.0,
                    served_followers: d.served.followers_count,
                    served_following: d.served.following_count,
                    actual_followers: d.actual.followers_count,
                    actual_following: d.actual.following_count,
                })
                .collect(),
        }
    }
}
