//! # Edge Storage
//!
//! The `EdgeStore` trait is the only owner of the follow edge set. Every
//! implementation must make `insert` and `remove` atomic per ordered pair:
//! two concurrent inserts of the same pair yield exactly one success and one
//! `StoreError::AlreadyExists`; likewise `remove` and `StoreError::NotFound`.
//!
//! ## Backends
//!
//! - `MemoryEdgeStore`: `RwLock`-guarded `BTreeMap`s (fast, volatile)
//! - `RedbEdgeStore`: redb tables written in single transactions (ACID, persistent)
//! - `StorageBackend`: enum dispatching to either, selected at startup

mod memory;
mod redb_store;

pub use memory::MemoryEdgeStore;
pub use redb_store::RedbEdgeStore;

use crate::projection::ProjectionStrategy;
use crate::{FollowEdge, Page, StoreError, Timestamp, UserId};
use std::path::Path;

// =============================================================================
// EDGESTORE TRAIT
// =============================================================================

/// Durable storage for directed follow edges.
///
/// All methods take `&self`; implementations synchronise internally so that
/// a single store can be shared across request threads.
pub trait EdgeStore: Send + Sync {
    /// True iff the exact ordered pair is currently present.
    fn exists(&self, follower: UserId, following: UserId) -> Result<bool, StoreError>;

    /// Fetch the edge for an ordered pair.
    fn get(&self, follower: UserId, following: UserId) -> Result<Option<FollowEdge>, StoreError>;

    /// Create the edge if absent. Fails with `AlreadyExists` otherwise.
    ///
    /// Count projections maintained by the store are updated in the same
    /// atomic unit as the edge.
    fn insert(
        &self,
        follower: UserId,
        following: UserId,
        created_at: Timestamp,
    ) -> Result<FollowEdge, StoreError>;

    /// Delete the edge if present, returning it. Fails with `NotFound` otherwise.
    fn remove(&self, follower: UserId, following: UserId) -> Result<FollowEdge, StoreError>;

    /// Number of edges whose `following` is `user`, served per the store's
    /// projection strategy.
    fn count_followers(&self, user: UserId) -> Result<u64, StoreError>;

    /// Number of edges whose `follower` is `user`, served per the store's
    /// projection strategy.
    fn count_following(&self, user: UserId) -> Result<u64, StoreError>;

    /// Exact follower count recomputed from the edge set, ignoring any
    /// maintained counters.
    fn recount_followers(&self, user: UserId) -> Result<u64, StoreError>;

    /// Exact following count recomputed from the edge set.
    fn recount_following(&self, user: UserId) -> Result<u64, StoreError>;

    /// Edges pointing at `user`, newest first (ties by follower id).
    fn followers(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError>;

    /// Edges leaving `user`, newest first (ties by followed id).
    fn following(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError>;

    /// Total number of edges.
    fn edge_count(&self) -> Result<u64, StoreError>;

    /// The full edge set in `(follower, following)` order.
    fn edges(&self) -> Result<Vec<FollowEdge>, StoreError>;

    /// How `count_followers` / `count_following` are served.
    fn projection_strategy(&self) -> ProjectionStrategy;
}

/// Sort edges newest first, breaking ties with `tie` so listings are stable.
pub(crate) fn newest_first(edges: &mut [FollowEdge], tie: impl Fn(&FollowEdge) -> UserId) {
    edges.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| tie(a).cmp(&tie(b)))
    });
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend selected at startup.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory edge set (fast, volatile).
    InMemory(MemoryEdgeStore),
    /// Disk-backed edge set using redb (ACID, persistent).
    Persistent(RedbEdgeStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryEdgeStore::new())
    }
}

impl StorageBackend {
    /// In-memory backend with the given projection strategy.
    #[must_use]
    pub fn in_memory(strategy: ProjectionStrategy) -> Self {
        Self::InMemory(MemoryEdgeStore::with_strategy(strategy))
    }

    /// Open or create a redb-backed store at `path`.
    pub fn redb(path: impl AsRef<Path>, strategy: ProjectionStrategy) -> Result<Self, StoreError> {
        RedbEdgeStore::open_with_strategy(path, strategy).map(Self::Persistent)
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    fn inner(&self) -> &dyn EdgeStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }
}

impl EdgeStore for StorageBackend {
    fn exists(&self, follower: UserId, following: UserId) -> Result<bool, StoreError> {
        self.inner().exists(follower, following)
    }

    fn get(&self, follower: UserId, following: UserId) -> Result<Option<FollowEdge>, StoreError> {
        self.inner().get(follower, following)
    }

    fn insert(
        &self,
        follower: UserId,
        following: UserId,
        created_at: Timestamp,
    ) -> Result<FollowEdge, StoreError> {
        self.inner().insert(follower, following, created_at)
    }

    fn remove(&self, follower: UserId, following: UserId) -> Result<FollowEdge, StoreError> {
        self.inner().remove(follower, following)
    }

    fn count_followers(&self, user: UserId) -> Result<u64, StoreError> {
        self.inner().count_followers(user)
    }

    fn count_following(&self, user: UserId) -> Result<u64, StoreError> {
        self.inner().count_following(user)
    }

    fn recount_followers(&self, user: UserId) -> Result<u64, StoreError> {
        self.inner().recount_followers(user)
    }

    fn recount_following(&self, user: UserId) -> Result<u64, StoreError> {
        self.inner().recount_following(user)
    }

    fn followers(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        self.inner().followers(user, page)
    }

    fn following(&self, user: UserId, page: Page) -> Result<Vec<FollowEdge>, StoreError> {
        self.inner().following(user, page)
    }

    fn edge_count(&self) -> Result<u64, StoreError> {
        self.inner().edge_count()
    }

    fn edges(&self) -> Result<Vec<FollowEdge>, StoreError> {
        self.inner().edges()
    }

    fn projection_strategy(&self) -> ProjectionStrategy {
        self.inner().projection_strategy()
    }
}

// =============================================================================
// TESTS
// =============================================================================
