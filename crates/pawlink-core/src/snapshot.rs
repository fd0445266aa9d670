//! # Edge Set Snapshots
//!
//! redb files are not bit-identical across runs, so backups and migrations go
//! through a canonical `postcard` stream instead:
//!
//! ```text
//! [header_len: u32 LE] [SnapshotHeader (postcard)] [Snapshot (postcard)]
//! ```
//!
//! Edges are sorted by `(follower, following)`, so two stores holding the same
//! edge set always export the same bytes. Counts are not part of the snapshot;
//! they are rebuilt by the store on restore.

use crate::primitives::{MAX_SNAPSHOT_EDGES, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::store::EdgeStore;
use crate::{FollowEdge, GraphError, StoreError, Timestamp, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// FORMAT
// =============================================================================

/// Header preceding the snapshot body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub edge_count: u64,
    /// `Snapshot::checksum` of the body.
    pub checksum: u64,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new(edge_count: u64, checksum: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            edge_count,
            checksum,
        }
    }

    /// Reject foreign files, unknown versions and oversized snapshots.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(GraphError::Snapshot("Invalid file format".to_string()));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(GraphError::Snapshot("Unsupported file version".to_string()));
        }
        if self.edge_count > MAX_SNAPSHOT_EDGES {
            return Err(GraphError::Snapshot(format!(
                "Edge count {} exceeds maximum allowed {}",
                self.edge_count, MAX_SNAPSHOT_EDGES
            )));
        }
        Ok(())
    }
}

/// One edge in snapshot form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotEdge {
    pub follower: u64,
    pub following: u64,
    pub created_at: u64,
}

impl From<&FollowEdge> for SnapshotEdge {
    fn from(edge: &FollowEdge) -> Self {
        Self {
            follower: edge.follower.0,
            following: edge.following.0,
            created_at: edge.created_at.0,
        }
    }
}

impl From<SnapshotEdge> for FollowEdge {
    fn from(edge: SnapshotEdge) -> Self {
        FollowEdge::new(
            UserId(edge.follower),
            UserId(edge.following),
            Timestamp(edge.created_at),
        )
    }
}

/// The snapshot body: the full edge set in canonical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub edges: Vec<SnapshotEdge>,
}

impl Snapshot {
    /// Build a canonical snapshot from edges in any order.
    #[must_use]
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a FollowEdge>) -> Self {
        let mut edges: Vec<SnapshotEdge> = edges.into_iter().map(SnapshotEdge::from).collect();
        edges.sort();
        Self { edges }
    }

    /// FNV-1a over every edge field, in order.
    ///
    /// Detects truncation and accidental corruption. Not collision resistant;
    /// use the `crypto-hash` digests for that.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;

        let mut hash = OFFSET;
        for edge in &self.edges {
            for word in [edge.follower, edge.following, edge.created_at] {
                for byte in word.to_le_bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(PRIME);
                }
            }
        }
        hash
    }

    /// Check the body against its header and the edge-set invariants.
    fn verify(&self, header: &SnapshotHeader) -> Result<(), GraphError> {
        if self.edges.len() as u64 != header.edge_count {
            return Err(GraphError::Snapshot("Edge count mismatch".to_string()));
        }
        let computed = self.checksum();
        if computed != header.checksum {
            return Err(GraphError::Snapshot(format!(
                "Checksum mismatch: expected {}, got {}",
                header.checksum, computed
            )));
        }
        for edge in &self.edges {
            if edge.follower == edge.following {
                return Err(GraphError::Snapshot(format!(
                    "Self-follow edge for user {}",
                    edge.follower
                )));
            }
        }
        for pair in self.edges.windows(2) {
            if let [a, b] = pair {
                let (ka, kb) = ((a.follower, a.following), (b.follower, b.following));
                if ka == kb {
                    return Err(GraphError::Snapshot(format!(
                        "Duplicate edge {} -> {}",
                        a.follower, a.following
                    )));
                }
                if ka > kb {
                    return Err(GraphError::Snapshot("Edges out of order".to_string()));
                }
            }
        }
        Ok(())
    }

    /// The edges as domain values.
    pub fn follow_edges(&self) -> impl Iterator<Item = FollowEdge> + '_ {
        self.edges.iter().copied().map(FollowEdge::from)
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Serialize the store's full edge set.
pub fn export_snapshot<S: EdgeStore + ?Sized>(store: &S) -> Result<Vec<u8>, GraphError> {
    let edges = store.edges().map_err(storage_error)?;
    snapshot_to_bytes(&Snapshot::from_edges(&edges))
}

/// Encode an already-built snapshot.
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, GraphError> {
    let header = SnapshotHeader::new(snapshot.edges.len() as u64, snapshot.checksum());

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| GraphError::Snapshot(format!("Header: {}", e)))?;
    let body_bytes = postcard::to_allocvec(snapshot)
        .map_err(|e| GraphError::Snapshot(format!("Data: {}", e)))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + body_bytes.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body_bytes);
    Ok(out)
}

/// Decode and validate a snapshot.
///
/// The header is checked before the body is decoded so oversized inputs are
/// rejected without allocating for them.
pub fn import_snapshot(data: &[u8]) -> Result<Snapshot, GraphError> {
    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| GraphError::Snapshot("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    let (header_bytes, body_bytes) = rest
        .split_at_checked(header_len)
        .ok_or_else(|| GraphError::Snapshot("Data too short for header".to_string()))?;

    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| GraphError::Snapshot(format!("Header: {}", e)))?;
    header.validate()?;

    let snapshot: Snapshot = postcard::from_bytes(body_bytes)
        .map_err(|e| GraphError::Snapshot(format!("Data: {}", e)))?;
    snapshot.verify(&header)?;
    Ok(snapshot)
}

/// Load a snapshot into an empty store, returning the number of edges written.
///
/// Refuses a non-empty store; merging would have to decide between two
/// `created_at` values for the same pair.
pub fn restore_snapshot<S: EdgeStore + ?Sized>(
    store: &S,
    snapshot: &Snapshot,
) -> Result<u64, GraphError> {
    let existing = store.edge_count().map_err(storage_error)?;
    if existing != 0 {
        return Err(GraphError::InvalidRequest(format!(
            "restore target already holds {} edges",
            existing
        )));
    }

    let mut written = 0u64;
    for edge in snapshot.follow_edges() {
        store
            .insert(edge.follower, edge.following, edge.created_at)
            .map_err(|e| match e {
                StoreError::AlreadyExists => GraphError::InvariantViolation(format!(
                    "edge {} -> {} appeared during restore",
                    edge.follower, edge.following
                )),
                other => storage_error(other),
            })?;
        written += 1;
    }
    tracing::info!(event = "snapshot_restored", edges = written);
    Ok(written)
}

/// Checksum of the store's current edge set, as it would appear in a header.
pub fn snapshot_checksum<S: EdgeStore + ?Sized>(store: &S) -> Result<u64, GraphError> {
    let edges = store.edges().map_err(storage_error)?;
    Ok(Snapshot::from_edges(&edges).checksum())
}

fn storage_error(err: StoreError) -> GraphError {
    match err {
        StoreError::Corrupted(msg) => GraphError::InvariantViolation(msg),
        other => GraphError::TransientStorageFailure(other.to_string()),
    }
}

// =============================================================================
// CRYPTOGRAPHIC DIGESTS
// =============================================================================

/// BLAKE3 hex digest of the store's snapshot bytes.
#[cfg(feature = "crypto-hash")]
pub fn snapshot_digest<S: EdgeStore + ?Sized>(store: &S) -> Result<String, GraphError> {
    Ok(compute_blake3_hash(&export_snapshot(store)?))
}

/// True if the store's snapshot matches `expected_hash`.
#[cfg(feature = "crypto-hash")]
pub fn verify_snapshot_digest<S: EdgeStore + ?Sized>(
    store: &S,
    expected_hash: &str,
) -> Result<bool, GraphError> {
    Ok(snapshot_digest(store)? == expected_hash)
}

/// BLAKE3 hex digest of raw bytes.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
