//! # Core Type Definitions
//!
//! This module contains the value types shared by every layer of the graph:
//! - User identifiers and timestamps (`UserId`, `Timestamp`)
//! - The directed follow edge (`FollowEdge`) and derived counts (`FollowCounts`)
//! - Pagination (`Page`) and mutation notices (`Mutation`)
//! - Error types (`StoreError`, `GraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they are used as keys in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for counters

use crate::primitives::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque, stable identifier of a user.
///
/// The graph never owns user lifecycle; it only references ids handed to it
/// by the external identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The current wall-clock time.
    ///
    /// A clock set before the epoch yields `Timestamp(0)`.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get the raw millisecond value.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// A directed follow relationship: `follower` follows `following`.
///
/// The ordered pair is the natural key. An edge is created by a successful
/// follow, destroyed by a successful unfollow, and never edited in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower: UserId,
    pub following: UserId,
    pub created_at: Timestamp,
}

impl FollowEdge {
    #[must_use]
    pub const fn new(follower: UserId, following: UserId, created_at: Timestamp) -> Self {
        Self {
            follower,
            following,
            created_at,
        }
    }

    /// The `(follower, following)` key of this edge.
    #[must_use]
    pub const fn key(&self) -> (UserId, UserId) {
        (self.follower, self.following)
    }
}

// =============================================================================
// COUNTS
// =============================================================================

/// Follower/following totals for one user, derived from the edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct FollowCounts {
    /// Number of edges pointing at the user.
    pub followers_count: u64,
    /// Number of edges leaving the user.
    pub following_count: u64,
}

impl FollowCounts {
    #[must_use]
    pub const fn new(followers_count: u64, following_count: u64) -> Self {
        Self {
            followers_count,
            following_count,
        }
    }

    /// True when the user has no edges in either direction.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.followers_count == 0 && self.following_count == 0
    }
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Offset/limit window over a follower or following list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Build a page; a zero limit becomes `DEFAULT_PAGE_LIMIT`, anything above
    /// `MAX_PAGE_LIMIT` is clamped.
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        let limit = match limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        Self { offset, limit }
    }

    /// Apply this window to an already-ordered iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

// =============================================================================
// MUTATION NOTICE
// =============================================================================

/// Which way an edge changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Followed,
    Unfollowed,
}

/// Returned by every successful write so callers can invalidate whatever
/// read caches they keep for the two affected users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub follower: UserId,
    pub following: UserId,
    pub at: Timestamp,
}

impl Mutation {
    #[must_use]
    pub const fn followed(edge: FollowEdge) -> Self {
        Self {
            kind: MutationKind::Followed,
            follower: edge.follower,
            following: edge.following,
            at: edge.created_at,
        }
    }

    #[must_use]
    pub const fn unfollowed(follower: UserId, following: UserId, at: Timestamp) -> Self {
        Self {
            kind: MutationKind::Unfollowed,
            follower,
            following,
            at,
        }
    }

    /// Users whose counts changed.
    #[must_use]
    pub const fn affected(&self) -> [UserId; 2] {
        [self.follower, self.following]
    }

    /// Whether the edge exists after this mutation.
    #[must_use]
    pub const fn is_following(&self) -> bool {
        matches!(self.kind, MutationKind::Followed)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors reported by an `EdgeStore`.
///
/// `AlreadyExists` and `NotFound` are the conflict signals of the atomic
/// insert-if-absent / remove-if-present operations; the rest are failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The ordered pair is already present.
    #[error("edge already exists")]
    AlreadyExists,

    /// The ordered pair is not present.
    #[error("edge not found")]
    NotFound,

    /// The backend could not complete the operation; nothing was changed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data failed to decode or broke a storage invariant.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

/// Domain errors surfaced by the `GraphService`.
///
/// Storage conflicts never leak as `StoreError`; they are translated into
/// `AlreadyFollowing` / `NotFollowing`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// No resolvable caller identity.
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Caller and target are the same user.
    #[error("users cannot follow themselves")]
    SelfFollowRejected,

    /// The edge already exists; the desired state already holds.
    #[error("already following")]
    AlreadyFollowing,

    /// The edge does not exist; the desired state already holds.
    #[error("not following")]
    NotFollowing,

    /// Storage was unavailable. Safe to retry; no mutation happened.
    #[error("transient storage failure: {0}")]
    TransientStorageFailure(String),

    /// The storage layer broke an invariant (duplicate edge, negative count,
    /// projection drift). Never corrected silently.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Malformed input at the service boundary.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl GraphError {
    /// Only transient storage failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorageFailure(_))
    }

    /// `AlreadyFollowing` / `NotFollowing`: the requested state already holds.
    #[must_use]
    pub const fn is_idempotency_signal(&self) -> bool {
        matches!(self, Self::AlreadyFollowing | Self::NotFollowing)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_zero_limit_uses_default() {
        let page = Page::new(3, 0);
        assert_eq!(page.offset, 3);
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn page_limit_is_clamped() {
        let page = Page::new(0, MAX_PAGE_LIMIT + 1);
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn page_apply_skips_and_takes() {
        let page = Page::new(2, 3);
        assert_eq!(page.apply(0..10), vec![2, 3, 4]);
        assert!(Page::new(20, 3).apply(0..10).is_empty());
    }

    #[test]
    fn mutation_affects_both_users() {
        let edge = FollowEdge::new(UserId(1), UserId(2), Timestamp(5));
        let mutation = Mutation::followed(edge);
        assert_eq!(mutation.affected(), [UserId(1), UserId(2)]);
        assert!(mutation.is_following());

        let undone = Mutation::unfollowed(UserId(1), UserId(2), Timestamp(6));
        assert!(!undone.is_following());
    }

    #[test]
    fn error_classification() {
        assert!(GraphError::TransientStorageFailure("io".into()).is_retryable());
        assert!(!GraphError::SelfFollowRejected.is_retryable());
        assert!(GraphError::AlreadyFollowing.is_idempotency_signal());
        assert!(GraphError::NotFollowing.is_idempotency_signal());
        assert!(!GraphError::Unauthenticated.is_idempotency_signal());
    }

    #[test]
    fn timestamp_now_is_after_epoch() {
        assert!(Timestamp::now().millis() > 0);
    }
}
