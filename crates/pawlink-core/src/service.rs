//! # Graph Service
//!
//! Business rules for the follow graph, layered over an `EdgeStore`.
//!
//! Follow/unfollow is a set-membership toggle: idempotency comes from the
//! store's atomic insert-if-absent / remove-if-present, never from counters
//! or client-side debouncing.
//!
//! ## Guard order
//!
//! 1. Resolve the caller. Mutations reject `Anonymous` with `Unauthenticated`;
//!    status queries answer `false`.
//! 2. Reject `caller == target` with `SelfFollowRejected`.
//! 3. Only then touch the store. Conflicts become `AlreadyFollowing` /
//!    `NotFollowing`; backend failures become `TransientStorageFailure`.
//!
//! The service keeps no membership cache between calls.

use crate::identity::IdentityResolver;
use crate::primitives::MAX_STATUS_BATCH;
use crate::projection::{AuditReport, CountProjection};
use crate::store::EdgeStore;
use crate::{FollowCounts, FollowEdge, GraphError, Mutation, Page, StoreError, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a profile page needs to render the follow widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user: UserId,
    pub counts: FollowCounts,
    /// Whether the viewer follows `user`; `false` for anonymous viewers.
    pub viewer_follows: bool,
    /// Whether the viewer is `user`.
    pub is_self: bool,
}

/// The follow-graph service.
#[derive(Debug, Default)]
pub struct GraphService<S> {
    store: S,
}

impl<S: EdgeStore> GraphService<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read-only access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Make the caller follow `target`.
    pub fn follow<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        target: UserId,
    ) -> Result<Mutation, GraphError> {
        let caller = Self::require_caller(identity)?;
        Self::reject_self(caller, target)?;
        self.insert_edge(caller, target)
    }

    /// Make the caller stop following `target`.
    pub fn unfollow<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        target: UserId,
    ) -> Result<Mutation, GraphError> {
        let caller = Self::require_caller(identity)?;
        Self::reject_self(caller, target)?;
        self.remove_edge(caller, target)
    }

    /// Flip the caller's follow state for `target`.
    ///
    /// If a concurrent request flips the edge between the status read and
    /// the write, the opposite write is attempted once; if that loses too,
    /// its idempotency signal is returned.
    pub fn toggle<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        target: UserId,
    ) -> Result<Mutation, GraphError> {
        let caller = Self::require_caller(identity)?;
        Self::reject_self(caller, target)?;

        let currently = self
            .store
            .exists(caller, target)
            .map_err(|e| self.storage_failure("toggle", caller, target, e))?;

        let first = if currently {
            self.remove_edge(caller, target)
        } else {
            self.insert_edge(caller, target)
        };

        match first {
            Err(GraphError::AlreadyFollowing) => self.remove_edge(caller, target),
            Err(GraphError::NotFollowing) => self.insert_edge(caller, target),
            other => other,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Whether the caller follows `target`.
    ///
    /// Anonymous callers and self-queries get `false`, never an error.
    pub fn is_following<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        target: UserId,
    ) -> Result<bool, GraphError> {
        let Some(caller) = identity.resolve().id() else {
            return Ok(false);
        };
        if caller == target {
            return Ok(false);
        }
        self.store
            .exists(caller, target)
            .map_err(|e| self.storage_failure("is_following", caller, target, e))
    }

    /// Follow status for many targets at once, keyed by target.
    ///
    /// Duplicate targets collapse into one entry.
    pub fn follow_statuses<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        targets: &[UserId],
    ) -> Result<BTreeMap<UserId, bool>, GraphError> {
        if targets.len() > MAX_STATUS_BATCH {
            return Err(GraphError::InvalidRequest(format!(
                "{} targets exceeds batch limit of {}",
                targets.len(),
                MAX_STATUS_BATCH
            )));
        }

        let caller = identity.resolve();
        let mut statuses = BTreeMap::new();
        for &target in targets {
            if statuses.contains_key(&target) {
                continue;
            }
            let following = match caller.id() {
                Some(id) if id != target => self
                    .store
                    .exists(id, target)
                    .map_err(|e| self.storage_failure("follow_statuses", id, target, e))?,
                _ => false,
            };
            statuses.insert(target, following);
        }
        Ok(statuses)
    }

    /// Follower/following totals for `user`. Needs no caller identity.
    pub fn follow_counts(&self, user: UserId) -> Result<FollowCounts, GraphError> {
        CountProjection::counts(&self.store, user)
            .map_err(|e| self.storage_failure("follow_counts", user, user, e))
    }

    /// Users following `user`, newest first.
    pub fn followers(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, GraphError> {
        self.store
            .followers(user, page)
            .map_err(|e| self.storage_failure("followers", user, user, e))
    }

    /// Users that `user` follows, newest first.
    pub fn following(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, GraphError> {
        self.store
            .following(user, page)
            .map_err(|e| self.storage_failure("following", user, user, e))
    }

    /// Counts plus the viewer's relationship to `user`.
    pub fn profile<I: IdentityResolver + ?Sized>(
        &self,
        identity: &I,
        user: UserId,
    ) -> Result<ProfileSummary, GraphError> {
        let viewer = identity.resolve().id();
        Ok(ProfileSummary {
            user,
            counts: self.follow_counts(user)?,
            viewer_follows: self.is_following(identity, user)?,
            is_self: viewer == Some(user),
        })
    }

    /// Check every projected count against the edge set.
    ///
    /// Drift or self-edges are logged and returned as `InvariantViolation`.
    pub fn audit(&self) -> Result<AuditReport, GraphError> {
        let report = CountProjection::audit(&self.store).map_err(|e| match e {
            StoreError::Corrupted(msg) => GraphError::InvariantViolation(msg),
            other => GraphError::TransientStorageFailure(other.to_string()),
        })?;

        if report.is_consistent() {
            tracing::debug!(
                edges = report.edge_count,
                users = report.users_checked,
                "count projection audit clean"
            );
            return Ok(report);
        }

        for drift in &report.drift {
            tracing::error!(event = "count_drift", user = drift.user.0, "{}", drift);
        }
        for user in &report.self_edges {
            tracing::error!(event = "self_edge", user = user.0, "self-follow edge in store");
        }
        let first = report
            .drift
            .first()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "self-follow edge present".to_string());
        Err(GraphError::InvariantViolation(format!(
            "{} drifted users, {} self-edges; {}",
            report.drift.len(),
            report.self_edges.len(),
            first
        )))
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn require_caller<I: IdentityResolver + ?Sized>(identity: &I) -> Result<UserId, GraphError> {
        identity.resolve().id().ok_or(GraphError::Unauthenticated)
    }

    fn reject_self(caller: UserId, target: UserId) -> Result<(), GraphError> {
        if caller == target {
            return Err(GraphError::SelfFollowRejected);
        }
        Ok(())
    }

    fn insert_edge(&self, follower: UserId, following: UserId) -> Result<Mutation, GraphError> {
        match self.store.insert(follower, following, Timestamp::now()) {
            Ok(edge) => {
                tracing::debug!(
                    event = "followed",
                    follower = follower.0,
                    following = following.0
                );
                Ok(Mutation::followed(edge))
            }
            Err(StoreError::AlreadyExists) => Err(GraphError::AlreadyFollowing),
            Err(e) => Err(self.storage_failure("follow", follower, following, e)),
        }
    }

    fn remove_edge(&self, follower: UserId, following: UserId) -> Result<Mutation, GraphError> {
        match self.store.remove(follower, following) {
            Ok(_) => {
                tracing::debug!(
                    event = "unfollowed",
                    follower = follower.0,
                    following = following.0
                );
                Ok(Mutation::unfollowed(follower, following, Timestamp::now()))
            }
            Err(StoreError::NotFound) => Err(GraphError::NotFollowing),
            Err(e) => Err(self.storage_failure("unfollow", follower, following, e)),
        }
    }

    /// Translate a store failure into a domain error and log it.
    ///
    /// Conflict signals reaching this point came from an operation that
    /// cannot produce them, which means the store broke its contract.
    fn storage_failure(
        &self,
        op: &'static str,
        follower: UserId,
        following: UserId,
        err: StoreError,
    ) -> GraphError {
        match err {
            StoreError::Unavailable(msg) => {
                tracing::warn!(
                    event = "storage_unavailable",
                    op,
                    follower = follower.0,
                    following = following.0,
                    "{}",
                    msg
                );
                GraphError::TransientStorageFailure(msg)
            }
            StoreError::Corrupted(msg) => {
                tracing::error!(
                    event = "invariant_violation",
                    op,
                    follower = follower.0,
                    following = following.0,
                    "{}",
                    msg
                );
                GraphError::InvariantViolation(msg)
            }
            conflict @ (StoreError::AlreadyExists | StoreError::NotFound) => {
                let msg = format!("store reported '{}' during {}", conflict, op);
                tracing::error!(
                    event = "invariant_violation",
                    op,
                    follower = follower.0,
                    following = following.0,
                    "{}",
                    msg
                );
                GraphError::InvariantViolation(msg)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Caller;
    use crate::store::MemoryEdgeStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    const A: UserId = UserId(1);
    const B: UserId = UserId(2);
    const C: UserId = UserId(3);

    fn service() -> GraphService<MemoryEdgeStore> {
        GraphService::new(MemoryEdgeStore::new())
    }

    #[test]
    fn follow_creates_edge() {
        let svc = service();
        let mutation = svc.follow(&A, B).expect("follow");
        assert_eq!(mutation.affected(), [A, B]);
        assert!(mutation.is_following());
        assert!(svc.is_following(&A, B).expect("status"));
        assert!(!svc.is_following(&B, A).expect("status"));
    }

    #[test]
    fn follow_twice_is_already_following() {
        let svc = service();
        svc.follow(&A, B).expect("follow");
        assert_eq!(svc.follow(&A, B), Err(GraphError::AlreadyFollowing));
        assert_eq!(svc.store().edge_count().expect("count"), 1);
        // The rejected duplicate still leaves the caller following.
        assert!(svc.is_following(&A, B).expect("status"));
    }

    #[test]
    fn self_follow_rejected_without_edge() {
        let svc = service();
        assert_eq!(svc.follow(&A, A), Err(GraphError::SelfFollowRejected));
        assert_eq!(svc.store().edge_count().expect("count"), 0);
        assert_eq!(svc.unfollow(&A, A), Err(GraphError::SelfFollowRejected));
        assert_eq!(svc.toggle(&A, A), Err(GraphError::SelfFollowRejected));
    }

    #[test]
    fn anonymous_mutations_rejected() {
        let svc = service();
        assert_eq!(
            svc.follow(&Caller::Anonymous, B),
            Err(GraphError::Unauthenticated)
        );
        assert_eq!(
            svc.unfollow(&Caller::Anonymous, B),
            Err(GraphError::Unauthenticated)
        );
        assert_eq!(
            svc.toggle(&Caller::Anonymous, B),
            Err(GraphError::Unauthenticated)
        );
    }

    #[test]
    fn anonymous_status_is_false() {
        let svc = service();
        svc.follow(&A, B).expect("follow");
        assert!(!svc.is_following(&Caller::Anonymous, B).expect("status"));
    }

    #[test]
    fn unfollow_without_edge_is_not_following() {
        let svc = service();
        assert_eq!(svc.unfollow(&A, B), Err(GraphError::NotFollowing));
        assert_eq!(svc.store().edge_count().expect("count"), 0);
    }

    #[test]
    fn toggle_flips_state() {
        let svc = service();
        let on = svc.toggle(&A, B).expect("toggle on");
        assert!(on.is_following());
        assert!(svc.is_following(&A, B).expect("status"));

        let off = svc.toggle(&A, B).expect("toggle off");
        assert!(!off.is_following());
        assert!(!svc.is_following(&A, B).expect("status"));
    }

    #[test]
    fn statuses_batch() {
        let svc = service();
        svc.follow(&A, B).expect("follow");

        let statuses = svc.follow_statuses(&A, &[B, C, A, B]).expect("statuses");
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses.get(&B), Some(&true));
        assert_eq!(statuses.get(&C), Some(&false));
        assert_eq!(statuses.get(&A), Some(&false));

        let anonymous = svc
            .follow_statuses(&Caller::Anonymous, &[B, C])
            .expect("statuses");
        assert!(anonymous.values().all(|&v| !v));
    }

    #[test]
    fn statuses_batch_limit() {
        let svc = service();
        let targets: Vec<UserId> = (0..=MAX_STATUS_BATCH as u64).map(UserId).collect();
        assert!(matches!(
            svc.follow_statuses(&A, &targets),
            Err(GraphError::InvalidRequest(_))
        ));
    }

    #[test]
    fn profile_summary() {
        let svc = service();
        svc.follow(&A, B).expect("follow");
        svc.follow(&C, B).expect("follow");

        let as_a = svc.profile(&A, B).expect("profile");
        assert_eq!(as_a.counts, FollowCounts::new(2, 0));
        assert!(as_a.viewer_follows);
        assert!(!as_a.is_self);

        let as_b = svc.profile(&B, B).expect("profile");
        assert!(as_b.is_self);
        assert!(!as_b.viewer_follows);

        let anonymous = svc.profile(&Caller::Anonymous, B).expect("profile");
        assert!(!anonymous.viewer_follows);
    }

    #[test]
    fn audit_clean_after_mutations() {
        let svc = service();
        svc.follow(&A, B).expect("follow");
        svc.follow(&B, C).expect("follow");
        svc.toggle(&A, B).expect("toggle");
        let report = svc.audit().expect("audit");
        assert!(report.is_consistent());
        assert_eq!(report.edge_count, 1);
    }

    // =========================================================================
    // Failure translation
    // =========================================================================

    /// Store whose every call fails with a fixed error.
    struct FailingStore {
        err: StoreError,
        touched: AtomicBool,
    }

    impl FailingStore {
        fn new(err: StoreError) -> Self {
            Self {
                err,
                touched: AtomicBool::new(false),
            }
        }

        fn fail<T>(&self) -> Result<T, StoreError> {
            self.touched.store(true, Ordering::SeqCst);
            Err(self.err.clone())
        }
    }

    impl EdgeStore for FailingStore {
        fn exists(&self, _: UserId, _: UserId) -> Result<bool, StoreError> {
            self.fail()
        }
        fn get(&self, _: UserId, _: UserId) -> Result<Option<FollowEdge>, StoreError> {
            self.fail()
        }
        fn insert(&self, _: UserId, _: UserId, _: Timestamp) -> Result<FollowEdge, StoreError> {
            self.fail()
        }
        fn remove(&self, _: UserId, _: UserId) -> Result<FollowEdge, StoreError> {
            self.fail()
        }
        fn count_followers(&self, _: UserId) -> Result<u64, StoreError> {
            self.fail()
        }
        fn count_following(&self, _: UserId) -> Result<u64, StoreError> {
            self.fail()
        }
        fn recount_followers(&self, _: UserId) -> Result<u64, StoreError> {
            self.fail()
        }
        fn recount_following(&self, _: UserId) -> Result<u64, StoreError> {
            self.fail()
        }
        fn followers(&self, _: UserId, _: Page) -> Result<Vec<FollowEdge>, StoreError> {
            self.fail()
        }
        fn following(&self, _: UserId, _: Page) -> Result<Vec<FollowEdge>, StoreError> {
            self.fail()
        }
        fn edge_count(&self) -> Result<u64, StoreError> {
            self.fail()
        }
        fn edges(&self) -> Result<Vec<FollowEdge>, StoreError> {
            self.fail()
        }
        fn projection_strategy(&self) -> crate::projection::ProjectionStrategy {
            crate::projection::ProjectionStrategy::OnDemand
        }
    }

    #[test]
    fn unavailable_store_is_transient() {
        let svc = GraphService::new(FailingStore::new(StoreError::Unavailable("down".into())));
        let err = svc.follow(&A, B).expect_err("must fail");
        assert_eq!(err, GraphError::TransientStorageFailure("down".into()));
        assert!(err.is_retryable());
        assert!(svc.follow_counts(B).expect_err("must fail").is_retryable());
    }

    #[test]
    fn corrupted_store_is_invariant_violation() {
        let svc = GraphService::new(FailingStore::new(StoreError::Corrupted("bad".into())));
        assert_eq!(
            svc.unfollow(&A, B),
            Err(GraphError::InvariantViolation("bad".into()))
        );
    }

    #[test]
    fn misplaced_conflict_is_invariant_violation() {
        // NotFound on an insert is not a legal answer.
        let svc = GraphService::new(FailingStore::new(StoreError::NotFound));
        assert!(matches!(
            svc.follow(&A, B),
            Err(GraphError::InvariantViolation(_))
        ));
    }

    #[test]
    fn validation_happens_before_storage() {
        let svc = GraphService::new(FailingStore::new(StoreError::Unavailable("down".into())));
        assert_eq!(
            svc.follow(&Caller::Anonymous, B),
            Err(GraphError::Unauthenticated)
        );
        assert_eq!(svc.follow(&A, A), Err(GraphError::SelfFollowRejected));
        assert!(!svc.is_following(&Caller::Anonymous, B).expect("status"));
        assert!(!svc.store().touched.load(Ordering::SeqCst));
    }
}
