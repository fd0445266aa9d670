//! # Count Projection
//!
//! Follower/following totals derived from the edge set.
//!
//! Two strategies are supported and a store declares which one it serves:
//!
//! | Strategy | Read path | Write path |
//! |----------|-----------|------------|
//! | `Maintained` | stored counters | counters adjusted in the same atomic unit as the edge |
//! | `OnDemand` | range scan of the edge indexes | nothing extra |
//!
//! Both backends in this crate write counters on every mutation and default to
//! `Maintained`. Whatever the strategy, `CountProjection::audit` recomputes
//! every count from the raw edge set and reports any drift.

use crate::store::EdgeStore;
use crate::{FollowCounts, StoreError, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// STRATEGY
// =============================================================================

/// How a store serves follower/following counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStrategy {
    /// Incrementally maintained counters, updated transactionally with edges.
    #[default]
    Maintained,
    /// Recomputed from the edge set on every read.
    OnDemand,
}

impl ProjectionStrategy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Maintained => "maintained",
            Self::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for ProjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maintained" => Ok(Self::Maintained),
            "on_demand" | "on-demand" | "ondemand" => Ok(Self::OnDemand),
            other => Err(format!(
                "unknown count strategy '{}' (expected maintained or on-demand)",
                other
            )),
        }
    }
}

// =============================================================================
// AUDIT REPORT
// =============================================================================

/// A user whose served counts differ from the edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDrift {
    pub user: UserId,
    pub served: FollowCounts,
    pub actual: FollowCounts,
}

impl fmt::Display for CountDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} served {}/{} but edge set has {}/{} (followers/following)",
            self.user,
            self.served.followers_count,
            self.served.following_count,
            self.actual.followers_count,
            self.actual.following_count
        )
    }
}

/// Result of checking every projected count against the edge set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub strategy: ProjectionStrategy,
    pub edge_count: u64,
    pub users_checked: usize,
    /// Users with an edge to themselves.
    pub self_edges: Vec<UserId>,
    pub drift: Vec<CountDrift>,
}

impl AuditReport {
    /// True when the projection and the edge set agree and no self-edge exists.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drift.is_empty() && self.self_edges.is_empty()
    }
}

// =============================================================================
// PROJECTION
// =============================================================================

/// Read path for follower/following totals.
///
/// Holds no state of its own; every call reads through to the store, so there
/// is no cache that could go stale between mutations.
pub struct CountProjection;

impl CountProjection {
    /// Counts for `user` as served by the store's strategy.
    pub fn counts<S: EdgeStore + ?Sized>(
        store: &S,
        user: UserId,
    ) -> Result<FollowCounts, StoreError> {
        Ok(FollowCounts::new(
            store.count_followers(user)?,
            store.count_following(user)?,
        ))
    }

    /// Counts for `user` recomputed from the edge set.
    pub fn recount<S: EdgeStore + ?Sized>(
        store: &S,
        user: UserId,
    ) -> Result<FollowCounts, StoreError> {
        Ok(FollowCounts::new(
            store.recount_followers(user)?,
            store.recount_following(user)?,
        ))
    }

    /// Compare served and recomputed counts for one user.
    pub fn audit_user<S: EdgeStore + ?Sized>(
        store: &S,
        user: UserId,
    ) -> Result<Option<CountDrift>, StoreError> {
        let served = Self::counts(store, user)?;
        let actual = Self::recount(store, user)?;
        Ok((served != actual).then_some(CountDrift {
            user,
            served,
            actual,
        }))
    }

    /// Check every user that appears in the edge set.
    ///
    /// Results are only meaningful when no writes are in flight.
    pub fn audit<S: EdgeStore + ?Sized>(store: &S) -> Result<AuditReport, StoreError> {
        let edges = store.edges()?;

        let mut actual: BTreeMap<UserId, FollowCounts> = BTreeMap::new();
        let mut self_edges = Vec::new();
        for edge in &edges {
            if edge.follower == edge.following {
                self_edges.push(edge.follower);
            }
            let out = actual.entry(edge.follower).or_default();
            out.following_count = out.following_count.saturating_add(1);
            let inc = actual.entry(edge.following).or_default();
            inc.followers_count = inc.followers_count.saturating_add(1);
        }

        let mut drift = Vec::new();
        for (&user, &expected) in &actual {
            let served = Self::counts(store, user)?;
            if served != expected {
                drift.push(CountDrift {
                    user,
                    served,
                    actual: expected,
                });
            }
        }

        Ok(AuditReport {
            strategy: store.projection_strategy(),
            edge_count: edges.len() as u64,
            users_checked: actual.len(),
            self_edges,
            drift,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use crate::store::MemoryEdgeStore;

    #[test]
    fn strategy_parses_both_spellings() {
        assert_eq!(
            "maintained".parse::<ProjectionStrategy>(),
            Ok(ProjectionStrategy::Maintained)
        );
        assert_eq!(
            "on-demand".parse::<ProjectionStrategy>(),
            Ok(ProjectionStrategy::OnDemand)
        );
        assert_eq!(
            "ON_DEMAND".parse::<ProjectionStrategy>(),
            Ok(ProjectionStrategy::OnDemand)
        );
        assert!("lazy".parse::<ProjectionStrategy>().is_err());
    }

    #[test]
    fn counts_for_unknown_user_are_zero() {
        let store = MemoryEdgeStore::new();
        let counts = CountProjection::counts(&store, UserId(99)).expect("counts");
        assert!(counts.is_empty());
    }

    #[test]
    fn counts_follow_edges() {
        let store = MemoryEdgeStore::new();
        store
            .insert(UserId(1), UserId(2), Timestamp(1))
            .expect("insert");
        store
            .insert(UserId(3), UserId(2), Timestamp(2))
            .expect("insert");

        assert_eq!(
            CountProjection::counts(&store, UserId(2)).expect("counts"),
            FollowCounts::new(2, 0)
        );
        assert_eq!(
            CountProjection::counts(&store, UserId(1)).expect("counts"),
            FollowCounts::new(0, 1)
        );
    }

    #[test]
    fn audit_of_consistent_store_is_clean() {
        for strategy in [ProjectionStrategy::Maintained, ProjectionStrategy::OnDemand] {
            let store = MemoryEdgeStore::with_strategy(strategy);
            store
                .insert(UserId(1), UserId(2), Timestamp(1))
                .expect("insert");
            store
                .insert(UserId(2), UserId(1), Timestamp(2))
                .expect("insert");
            store
                .insert(UserId(3), UserId(1), Timestamp(3))
                .expect("insert");
            store.remove(UserId(2), UserId(1)).expect("remove");

            let report = CountProjection::audit(&store).expect("audit");
            assert!(report.is_consistent(), "{:?}", report);
            assert_eq!(report.strategy, strategy);
            assert_eq!(report.edge_count, 2);
            assert_eq!(report.users_checked, 3);
            assert_eq!(
                CountProjection::audit_user(&store, UserId(1)).expect("audit"),
                None
            );
        }
    }

    #[test]
    fn audit_flags_self_edges() {
        let store = MemoryEdgeStore::new();
        // The store itself does not guard against self-edges.
        store
            .insert(UserId(4), UserId(4), Timestamp(1))
            .expect("insert");
        let report = CountProjection::audit(&store).expect("audit");
        assert_eq!(report.self_edges, vec![UserId(4)]);
        assert!(!report.is_consistent());
    }

    #[test]
    fn drift_display_names_user() {
        let drift = CountDrift {
            user: UserId(7),
            served: FollowCounts::new(2, 0),
            actual: FollowCounts::new(1, 0),
        };
        assert!(drift.to_string().contains("user 7"));
    }
}
