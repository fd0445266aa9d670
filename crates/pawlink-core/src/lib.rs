//! # pawlink-core
//!
//! The follow-relationship graph for pawlink.
//!
//! Users follow other users. The relationship is a directed edge
//! `(follower, following)`; the edge set is the single source of truth and
//! follower/following counts are projections of it.
//!
//! ## Components
//!
//! - `store`: the `EdgeStore` trait and its in-memory and redb backends
//! - `service`: `GraphService`, the business rules (auth, self-follow,
//!   idempotent follow/unfollow, toggles, profile summaries)
//! - `projection`: `CountProjection`, counts and drift audits
//! - `identity`: the `IdentityResolver` contract callers plug into
//! - `snapshot`: canonical postcard export/import of the edge set
//!
//! ## Architectural Constraints
//!
//! - Synchronous, no network dependencies
//! - Deterministic ordering (`BTreeMap` only)
//! - Identity is always passed in, never read from ambient state

// =============================================================================
// MODULES
// =============================================================================

pub mod identity;
pub mod primitives;
pub mod projection;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    FollowCounts, FollowEdge, GraphError, Mutation, MutationKind, Page, StoreError, Timestamp,
    UserId,
};

// =============================================================================
// RE-EXPORTS: Graph
// =============================================================================

pub use identity::{Caller, IdentityResolver};
pub use projection::{AuditReport, CountDrift, CountProjection, ProjectionStrategy};
pub use service::{GraphService, ProfileSummary};
pub use store::{EdgeStore, MemoryEdgeStore, RedbEdgeStore, StorageBackend};

// =============================================================================
// RE-EXPORTS: Snapshot
// =============================================================================

pub use snapshot::{
    Snapshot, SnapshotEdge, SnapshotHeader, export_snapshot, import_snapshot, restore_snapshot,
    snapshot_checksum, snapshot_to_bytes,
};

#[cfg(feature = "crypto-hash")]
pub use snapshot::{compute_blake3_hash, snapshot_digest, verify_snapshot_digest};
