//! # Follow Semantics
//!
//! Behaviour every backend must show. Each test runs against the in-memory
//! store under both count strategies and against a redb file.
//!
//! ## Tiers
//! - F0: Guards (self-follow, anonymous callers)
//! - F1: Idempotent follow/unfollow
//! - F2: Count consistency
//! - F3: Concurrency

use pawlink_core::{
    Caller, EdgeStore, FollowCounts, GraphError, GraphService, Page, ProjectionStrategy,
    StorageBackend, UserId,
};
use std::sync::Barrier;
use std::thread;

const A: UserId = UserId(1);
const B: UserId = UserId(2);
const C: UserId = UserId(3);

/// Run `check` once per backend configuration.
fn each_backend(check: impl Fn(&GraphService<StorageBackend>)) {
    for strategy in [ProjectionStrategy::Maintained, ProjectionStrategy::OnDemand] {
        check(&GraphService::new(StorageBackend::in_memory(strategy)));

        let dir = tempfile::tempdir().expect("tempdir");
        let backend =
            StorageBackend::redb(dir.path().join("graph.redb"), strategy).expect("open redb");
        check(&GraphService::new(backend));
    }
}

// =============================================================================
// TIER F0: GUARDS
// =============================================================================

mod f0_guards {
    use super::*;

    /// F0.1: Nobody can follow themselves, and no edge is written.
    #[test]
    fn self_follow_rejected() {
        each_backend(|svc| {
            for user in [A, B, UserId(0), UserId(u64::MAX)] {
                assert_eq!(svc.follow(&user, user), Err(GraphError::SelfFollowRejected));
            }
            assert_eq!(svc.store().edge_count().expect("count"), 0);
        });
    }

    /// F0.2: Anonymous status queries answer false and never fail.
    #[test]
    fn anonymous_is_following_false() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            assert!(!svc.is_following(&Caller::Anonymous, B).expect("status"));
            assert!(!svc.is_following(&None::<UserId>, A).expect("status"));
        });
    }

    /// F0.3: Anonymous mutations are rejected before storage.
    #[test]
    fn anonymous_mutations_rejected() {
        each_backend(|svc| {
            assert_eq!(
                svc.follow(&Caller::Anonymous, B),
                Err(GraphError::Unauthenticated)
            );
            assert_eq!(
                svc.unfollow(&Caller::Anonymous, B),
                Err(GraphError::Unauthenticated)
            );
            assert_eq!(svc.store().edge_count().expect("count"), 0);
        });
    }

    /// F0.4: Counts need no identity.
    #[test]
    fn counts_without_identity() {
        each_backend(|svc| {
            assert_eq!(svc.follow_counts(C).expect("counts"), FollowCounts::default());
        });
    }
}

// =============================================================================
// TIER F1: IDEMPOTENT FOLLOW / UNFOLLOW
// =============================================================================

mod f1_idempotence {
    use super::*;

    /// F1.1: follow then unfollow flips the status.
    #[test]
    fn follow_then_unfollow() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            assert!(svc.is_following(&A, B).expect("status"));
            svc.unfollow(&A, B).expect("unfollow");
            assert!(!svc.is_following(&A, B).expect("status"));
        });
    }

    /// F1.2: A second follow is AlreadyFollowing and the edge stays single.
    #[test]
    fn double_follow() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            let second = svc.follow(&A, B).expect_err("duplicate");
            assert_eq!(second, GraphError::AlreadyFollowing);
            assert!(second.is_idempotency_signal());
            assert_eq!(svc.store().edge_count().expect("count"), 1);
            assert_eq!(svc.follow_counts(B).expect("counts").followers_count, 1);
        });
    }

    /// F1.3: unfollow with no edge is NotFollowing and changes nothing.
    #[test]
    fn unfollow_absent() {
        each_backend(|svc| {
            svc.follow(&B, A).expect("follow");
            let before = svc.store().edges().expect("edges");
            assert_eq!(svc.unfollow(&A, B), Err(GraphError::NotFollowing));
            assert_eq!(svc.store().edges().expect("edges"), before);
        });
    }

    /// F1.4: Toggle alternates between the two states.
    #[test]
    fn toggle_alternates() {
        each_backend(|svc| {
            for round in 0..4 {
                let mutation = svc.toggle(&A, B).expect("toggle");
                assert_eq!(mutation.is_following(), round % 2 == 0);
                assert_eq!(svc.is_following(&A, B).expect("status"), round % 2 == 0);
            }
        });
    }

    /// F1.5: Edges are directed.
    #[test]
    fn direction_matters() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            assert!(!svc.is_following(&B, A).expect("status"));
            svc.follow(&B, A).expect("mutual follow");
            assert_eq!(svc.store().edge_count().expect("count"), 2);
        });
    }
}

// =============================================================================
// TIER F2: COUNT CONSISTENCY
// =============================================================================

mod f2_counts {
    use super::*;

    /// F2.1: The A/B/C walkthrough.
    #[test]
    fn three_user_scenario() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("A follows B");
            assert_eq!(svc.follow_counts(B).expect("counts"), FollowCounts::new(1, 0));
            assert_eq!(svc.follow_counts(A).expect("counts"), FollowCounts::new(0, 1));

            svc.follow(&A, C).expect("A follows C");
            svc.follow(&B, C).expect("B follows C");
            assert_eq!(svc.follow_counts(C).expect("counts"), FollowCounts::new(2, 0));

            svc.unfollow(&A, B).expect("A unfollows B");
            assert_eq!(svc.follow_counts(B).expect("counts"), FollowCounts::new(0, 1));
            assert_eq!(svc.follow_counts(A).expect("counts"), FollowCounts::new(0, 1));

            assert!(svc.audit().expect("audit").is_consistent());
        });
    }

    /// F2.2: Follower listings agree with the counts.
    #[test]
    fn listings_match_counts() {
        each_backend(|svc| {
            for id in 10..25 {
                svc.follow(&UserId(id), A).expect("follow");
            }
            let counts = svc.follow_counts(A).expect("counts");
            let followers = svc.followers(A, Page::new(0, 500)).expect("followers");
            assert_eq!(followers.len() as u64, counts.followers_count);
            assert!(followers.iter().all(|e| e.following == A));
        });
    }

    /// F2.3: Profile summary ties counts and status together.
    #[test]
    fn profile_reflects_mutations() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            let profile = svc.profile(&A, B).expect("profile");
            assert!(profile.viewer_follows);
            assert_eq!(profile.counts.followers_count, 1);

            svc.unfollow(&A, B).expect("unfollow");
            let profile = svc.profile(&A, B).expect("profile");
            assert!(!profile.viewer_follows);
            assert_eq!(profile.counts.followers_count, 0);
        });
    }
}

// =============================================================================
// TIER F3: CONCURRENCY
// =============================================================================

mod f3_concurrency {
    use super::*;

    const THREADS: usize = 8;

    /// F3.1: N racing follows give one success and N-1 AlreadyFollowing.
    #[test]
    fn concurrent_follow_single_winner() {
        each_backend(|svc| {
            let barrier = Barrier::new(THREADS);
            let results: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            svc.follow(&A, B)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("thread"))
                    .collect()
            });

            let wins = results.iter().filter(|r| r.is_ok()).count();
            let dupes = results
                .iter()
                .filter(|r| matches!(r, Err(GraphError::AlreadyFollowing)))
                .count();
            assert_eq!(wins, 1);
            assert_eq!(dupes, THREADS - 1);
            assert_eq!(svc.store().edge_count().expect("count"), 1);
            assert_eq!(svc.follow_counts(B).expect("counts").followers_count, 1);
        });
    }

    /// F3.2: N racing unfollows give one success and N-1 NotFollowing.
    #[test]
    fn concurrent_unfollow_single_winner() {
        each_backend(|svc| {
            svc.follow(&A, B).expect("follow");
            let barrier = Barrier::new(THREADS);
            let results: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            svc.unfollow(&A, B)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("thread"))
                    .collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert_eq!(
                results
                    .iter()
                    .filter(|r| matches!(r, Err(GraphError::NotFollowing)))
                    .count(),
                THREADS - 1
            );
            assert_eq!(svc.store().edge_count().expect("count"), 0);
            assert_eq!(svc.follow_counts(B).expect("counts"), FollowCounts::default());
        });
    }

    /// F3.3: Distinct pairs proceed independently.
    #[test]
    fn concurrent_distinct_pairs() {
        each_backend(|svc| {
            thread::scope(|s| {
                for id in 100..100 + THREADS as u64 {
                    s.spawn(move || svc.follow(&UserId(id), C).expect("follow"));
                }
            });
            assert_eq!(
                svc.follow_counts(C).expect("counts").followers_count,
                THREADS as u64
            );
            assert!(svc.audit().expect("audit").is_consistent());
        });
    }

    /// F3.4: Racing toggles always leave counts matching the edge set.
    #[test]
    fn concurrent_toggles_stay_consistent() {
        each_backend(|svc| {
            let barrier = Barrier::new(THREADS);
            thread::scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|| {
                        barrier.wait();
                        for _ in 0..5 {
                            match svc.toggle(&A, B) {
                                Ok(_) => {}
                                Err(e) => assert!(e.is_idempotency_signal(), "{e}"),
                            }
                        }
                    });
                }
            });
            let following = svc.is_following(&A, B).expect("status");
            assert_eq!(
                svc.follow_counts(B).expect("counts").followers_count,
                u64::from(following)
            );
            assert!(svc.audit().expect("audit").is_consistent());
        });
    }
}
