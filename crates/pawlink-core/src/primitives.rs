//! # Fixed Limits
//!
//! Compile-time constants for the pawlink graph. All queries and imports are
//! bounded by these values.

// =============================================================================
// PAGINATION
// =============================================================================

/// Page size used when a caller asks for a zero-length page.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page a follower/following listing may return.
pub const MAX_PAGE_LIMIT: usize = 500;

/// Maximum number of targets in one batch status query.
pub const MAX_STATUS_BATCH: usize = 500;

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Magic bytes identifying a pawlink snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"PWLK";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot layout.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Maximum number of edges accepted from a snapshot.
///
/// Validated from the header before the body is decoded.
pub const MAX_SNAPSHOT_EDGES: u64 = 50_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limits_are_ordered() {
        assert!(DEFAULT_PAGE_LIMIT <= MAX_PAGE_LIMIT);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(&SNAPSHOT_MAGIC, b"PWLK");
    }
}
