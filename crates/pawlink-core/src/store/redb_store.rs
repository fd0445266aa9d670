//! # redb-backed Edge Storage
//!
//! A disk-backed edge store using the redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! redb admits one write transaction at a time, so the existence check, the
//! edge write, the reverse index write and the counter update of a follow or
//! unfollow all happen inside one serialised transaction. Either all of them
//! commit or none do; a failed commit leaves no half-created edge.

use super::{EdgeStore, newest_first};
use crate::projection::ProjectionStrategy;
use crate::{FollowEdge, Page, StoreError, Timestamp, UserId};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use std::fmt::Display;
use std::path::Path;

/// Table for edges: (follower, following) -> created_at millis
const EDGES: TableDefinition<(u64, u64), u64> = TableDefinition::new("edges");

/// Reverse index: (following, follower) -> created_at millis
const REVERSE: TableDefinition<(u64, u64), u64> = TableDefinition::new("reverse");

/// Maintained counters: user -> (followers_count, following_count)
const COUNTS: TableDefinition<u64, (u64, u64)> = TableDefinition::new("counts");

fn unavailable(e: impl Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// A disk-backed edge store using redb.
pub struct RedbEdgeStore {
    /// The redb database handle.
    db: Database,
    strategy: ProjectionStrategy,
}

impl std::fmt::Debug for RedbEdgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEdgeStore")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl RedbEdgeStore {
    /// Open or create an edge database at the given path with maintained counters.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_strategy(path, ProjectionStrategy::Maintained)
    }

    /// Open or create an edge database serving counts with `strategy`.
    ///
    /// Counters are written on every mutation regardless of strategy, so a
    /// database can be reopened under either strategy.
    pub fn open_with_strategy(
        path: impl AsRef<Path>,
        strategy: ProjectionStrategy,
    ) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(unavailable)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(unavailable)?;
            let _ = write_txn.open_table(EDGES).map_err(unavailable)?;
            let _ = write_txn.open_table(REVERSE).map_err(unavailable)?;
            let _ = write_txn.open_table(COUNTS).map_err(unavailable)?;
            write_txn.commit().map_err(unavailable)?;
        }

        Ok(Self { db, strategy })
    }

    fn begin_read(&self) -> Result<ReadTransaction, StoreError> {
        self.db.begin_read().map_err(unavailable)
    }

    /// Count entries of an index whose first key component is `user`.
    fn range_len(
        &self,
        index: TableDefinition<(u64, u64), u64>,
        user: UserId,
    ) -> Result<u64, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(index).map_err(unavailable)?;

        let mut count: u64 = 0;
        for entry in table
            .range((user.0, 0u64)..=(user.0, u64::MAX))
            .map_err(unavailable)?
        {
            entry.map_err(unavailable)?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    /// Collect `(first, second, created_at)` triples of an index for `user`.
    fn range_entries(
        &self,
        index: TableDefinition<(u64, u64), u64>,
        user: UserId,
    ) -> Result<Vec<(u64, u64, u64)>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(index).map_err(unavailable)?;

        let mut entries = Vec::new();
        for entry in table
            .range((user.0, 0u64)..=(user.0, u64::MAX))
            .map_err(unavailable)?
        {
            let (key, value) = entry.map_err(unavailable)?;
            let (first, second) = key.value();
            entries.push((first, second, value.value()));
        }
        Ok(entries)
    }

    fn stored_counts(&self, user: UserId) -> Result<(u64, u64), StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COUNTS).map_err(unavailable)?;
        Ok(table
            .get(user.0)
            .map_err(unavailable)?
            .map(|v| v.value())
            .unwrap_or((0, 0)))
    }
}

// =============================================================================
// EDGESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl EdgeStore for RedbEdgeStore {
    fn exists(&self, follower: UserId, following: UserId) -> Result<bool, StoreError> {
        Ok(self.get(follower, following)?.is_some())
    }

    fn get(&self, follower: UserId, following: UserId) -> Result<Option<FollowEdge>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(EDGES).map_err(unavailable)?;
        Ok(table
            .get((follower.0, following.0))
            .map_err(unavailable)?
            .map(|v| FollowEdge::new(follower, following, Timestamp(v.value()))))
    }

    fn insert(
        &self,
        follower: UserId,
        following: UserId,
        created_at: Timestamp,
    ) -> Result<FollowEdge, StoreError> {
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(unavailable)?;
            let present = edges
                .get((follower.0, following.0))
                .map_err(unavailable)?
                .is_some();
            if present {
                // Dropping the transaction aborts it.
                return Err(StoreError::AlreadyExists);
            }
            edges
                .insert((follower.0, following.0), created_at.0)
                .map_err(unavailable)?;

            let mut reverse = write_txn.open_table(REVERSE).map_err(unavailable)?;
            reverse
                .insert((following.0, follower.0), created_at.0)
                .map_err(unavailable)?;

            let mut counts = write_txn.open_table(COUNTS).map_err(unavailable)?;
            let (followers, following_count) = counts
                .get(follower.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            counts
                .insert(follower.0, (followers, following_count.saturating_add(1)))
                .map_err(unavailable)?;
            let (followers, following_count) = counts
                .get(following.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            counts
                .insert(following.0, (followers.saturating_add(1), following_count))
                .map_err(unavailable)?;
        }
        write_txn.commit().map_err(unavailable)?;

        Ok(FollowEdge::new(follower, following, created_at))
    }

    fn remove(&self, follower: UserId, following: UserId) -> Result<FollowEdge, StoreError> {
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        let created_at;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(unavailable)?;
            let Some(at) = edges
                .get((follower.0, following.0))
                .map_err(unavailable)?
                .map(|v| v.value())
            else {
                return Err(StoreError::NotFound);
            };
            created_at = Timestamp(at);

            let mut counts = write_txn.open_table(COUNTS).map_err(unavailable)?;
            let (_, out) = counts
                .get(follower.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            let (inc, _) = counts
                .get(following.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            if out == 0 || inc == 0 {
                return Err(StoreError::Corrupted(format!(
                    "counters for {} -> {} would go negative",
                    follower, following
                )));
            }

            edges
                .remove((follower.0, following.0))
                .map_err(unavailable)?;
            let mut reverse = write_txn.open_table(REVERSE).map_err(unavailable)?;
            reverse
                .remove((following.0, follower.0))
                .map_err(unavailable)?;

            let (followers, following_count) = counts
                .get(follower.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            counts
                .insert(follower.0, (followers, following_count.saturating_sub(1)))
                .map_err(unavailable)?;
            let (followers, following_count) = counts
                .get(following.0)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or((0, 0));
            counts
                .insert(following.0, (followers.saturating_sub(1), following_count))
                .map_err(unavailable)?;
        }
        write_txn.commit().map_err(unavailable)?;

        Ok(FollowEdge::new(follower, following, created_at))
    }

    fn count_followers(&self, user: UserId) -> Result<u64, StoreError> {
        match self.strategy {
            ProjectionStrategy::Maintained => Ok(self.stored_counts(user)?.0),
            ProjectionStrategy::OnDemand => self.recount_followers(user),
        }
    }

    fn count_following(&self, user: UserId) -> Result<u64, StoreError> {
        match self.strategy {
            ProjectionStrategy::Maintained => Ok(self.stored_counts(user)?.1),
            ProjectionStrategy::OnDemand => self.recount_following(user),
        }
    }

    fn recount_followers(&self, user: UserId) -> Result<u64, StoreError> {
        self.range_len(REVERSE, user)
    }

    fn recount_following(&self, user: UserId) -> Result<u64, StoreError> {
        self.range_len(EDGES, user)
    }

    fn followers(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        let mut edges: Vec<FollowEdge> = self
            .range_entries(REVERSE, user)?
            .into_iter()
            .map(|(following, follower, at)| {
                FollowEdge::new(UserId(follower), UserId(following), Timestamp(at))
            })
            .collect();
        newest_first(&mut edges, |e| e.follower);
        Ok(page.apply(edges))
    }

    fn following(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        let mut edges: Vec<FollowEdge> = self
            .range_entries(EDGES, user)?
            .into_iter()
            .map(|(follower, following, at)| {
                FollowEdge::new(UserId(follower), UserId(following), Timestamp(at))
            })
            .collect();
        newest_first(&mut edges, |e| e.following);
        Ok(page.apply(edges))
    }

    fn edge_count(&self) -> Result<u64, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(EDGES).map_err(unavailable)?;
        table.len().map_err(unavailable)
    }

    fn edges(&self) -> Result<Vec<FollowEdge>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(EDGES).map_err(unavailable)?;

        let mut edges = Vec::new();
        for entry in table.iter().map_err(unavailable)? {
            let (key, value) = entry.map_err(unavailable)?;
            let (follower, following) = key.value();
            edges.push(FollowEdge::new(
                UserId(follower),
                UserId(following),
                Timestamp(value.value()),
            ));
        }
        Ok(edges)
    }

    fn projection_strategy(&self) -> ProjectionStrategy {
        self.strategy
    }
}

// =============================================================================
// TESTS
// =============================================================================
