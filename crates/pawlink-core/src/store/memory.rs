//! # In-memory Edge Storage
//!
//! `MemoryEdgeStore` keeps the edge set, its reverse index and the maintained
//! counters behind one `RwLock`. A write holds the lock for the whole
//! check-then-mutate sequence, so insert-if-absent and remove-if-present are
//! atomic and counters move in the same critical section as the edge.

use super::{EdgeStore, newest_first};
use crate::projection::ProjectionStrategy;
use crate::{FollowCounts, FollowEdge, Page, StoreError, Timestamp, UserId};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The guarded state.
#[derive(Debug, Default)]
struct EdgeSet {
    /// (follower, following) -> created_at
    forward: BTreeMap<(UserId, UserId), Timestamp>,
    /// (following, follower) -> created_at
    reverse: BTreeMap<(UserId, UserId), Timestamp>,
    /// Maintained counters, updated with every edge mutation.
    counts: BTreeMap<UserId, FollowCounts>,
}

impl EdgeSet {
    fn range_len(index: &BTreeMap<(UserId, UserId), Timestamp>, user: UserId) -> u64 {
        index
            .range((user, UserId(0))..=(user, UserId(u64::MAX)))
            .count() as u64
    }

    fn bump(&mut self, follower: UserId, following: UserId) {
        let out = self.counts.entry(follower).or_default();
        out.following_count = out.following_count.saturating_add(1);
        let inc = self.counts.entry(following).or_default();
        inc.followers_count = inc.followers_count.saturating_add(1);
    }

    /// Decrement both counters, or fail without touching either.
    fn drop_counts(&mut self, follower: UserId, following: UserId) -> Result<(), StoreError> {
        let following_count = self.counts.get(&follower).map_or(0, |c| c.following_count);
        let followers_count = self.counts.get(&following).map_or(0, |c| c.followers_count);
        if following_count == 0 || followers_count == 0 {
            return Err(StoreError::Corrupted(format!(
                "counters for {} -> {} would go negative",
                follower, following
            )));
        }
        if let Some(out) = self.counts.get_mut(&follower) {
            out.following_count = out.following_count.saturating_sub(1);
        }
        if let Some(inc) = self.counts.get_mut(&following) {
            inc.followers_count = inc.followers_count.saturating_sub(1);
        }
        Ok(())
    }
}

/// A volatile, thread-safe edge store.
#[derive(Debug)]
pub struct MemoryEdgeStore {
    state: RwLock<EdgeSet>,
    strategy: ProjectionStrategy,
}

impl Default for MemoryEdgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEdgeStore {
    /// Create an empty store with maintained counters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategy(ProjectionStrategy::Maintained)
    }

    /// Create an empty store serving counts with `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: ProjectionStrategy) -> Self {
        Self {
            state: RwLock::new(EdgeSet::default()),
            strategy,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EdgeSet>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("edge set lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EdgeSet>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("edge set lock poisoned".to_string()))
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn exists(&self, follower: UserId, following: UserId) -> Result<bool, StoreError> {
        Ok(self.read()?.forward.contains_key(&(follower, following)))
    }

    fn get(&self, follower: UserId, following: UserId) -> Result<Option<FollowEdge>, StoreError> {
        Ok(self
            .read()?
            .forward
            .get(&(follower, following))
            .map(|&at| FollowEdge::new(follower, following, at)))
    }

    fn insert(
        &self,
        follower: UserId,
        following: UserId,
        created_at: Timestamp,
    ) -> Result<FollowEdge, StoreError> {
        let mut set = self.write()?;
        if set.forward.contains_key(&(follower, following)) {
            return Err(StoreError::AlreadyExists);
        }
        set.forward.insert((follower, following), created_at);
        set.reverse.insert((following, follower), created_at);
        set.bump(follower, following);
        Ok(FollowEdge::new(follower, following, created_at))
    }

    fn remove(&self, follower: UserId, following: UserId) -> Result<FollowEdge, StoreError> {
        let mut set = self.write()?;
        let Some(&created_at) = set.forward.get(&(follower, following)) else {
            return Err(StoreError::NotFound);
        };
        set.drop_counts(follower, following)?;
        set.forward.remove(&(follower, following));
        set.reverse.remove(&(following, follower));
        Ok(FollowEdge::new(follower, following, created_at))
    }

    fn count_followers(&self, user: UserId) -> Result<u64, StoreError> {
        match self.strategy {
            ProjectionStrategy::Maintained => Ok(self
                .read()?
                .counts
                .get(&user)
                .map_or(0, |c| c.followers_count)),
            ProjectionStrategy::OnDemand => self.recount_followers(user),
        }
    }

    fn count_following(&self, user: UserId) -> Result<u64, StoreError> {
        match self.strategy {
            ProjectionStrategy::Maintained => Ok(self
                .read()?
                .counts
                .get(&user)
                .map_or(0, |c| c.following_count)),
            ProjectionStrategy::OnDemand => self.recount_following(user),
        }
    }

    fn recount_followers(&self, user: UserId) -> Result<u64, StoreError> {
        Ok(EdgeSet::range_len(&self.read()?.reverse, user))
    }

    fn recount_following(&self, user: UserId) -> Result<u64, StoreError> {
        Ok(EdgeSet::range_len(&self.read()?.forward, user))
    }

    fn followers(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        let mut edges: Vec<FollowEdge> = self
            .read()?
            .reverse
            .range((user, UserId(0))..=(user, UserId(u64::MAX)))
            .map(|(&(following, follower), &at)| FollowEdge::new(follower, following, at))
            .collect();
        newest_first(&mut edges, |e| e.follower);
        Ok(page.apply(edges))
    }

    fn following(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        let mut edges: Vec<FollowEdge> = self
            .read()?
            .forward
            .range((user, UserId(0))..=(user, UserId(u64::MAX)))
            .map(|(&(follower, following), &at)| FollowEdge::new(follower, following, at))
            .collect();
        newest_first(&mut edges, |e| e.following);
        Ok(page.apply(edges))
    }

    fn edge_count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.forward.len() as u64)
    }

    fn edges(&self) -> Result<Vec<FollowEdge>, StoreError> {
        Ok(self
            .read()?
            .forward
            .iter()
            .map(|(&(follower, following), &at)| FollowEdge::new(follower, following, at))
            .collect())
    }

    fn projection_strategy(&self) -> ProjectionStrategy {
        self.strategy
    }
}

// =============================================================================
// TESTS
// =============================================================================
