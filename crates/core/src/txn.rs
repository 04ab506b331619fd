//! Transaction management.
//!
//! The transaction manager issues globally monotonic transaction ids and
//! timestamps from atomic counters. Engine operations run in short implicit
//! transactions: begin → mutate → commit (which assigns the commit
//! timestamp) or rollback. A [`TxnIndexStore`] tracks the segment-index
//! entries a transaction created so commit and rollback can visit exactly
//! those, in segment-id order for deterministic recovery.

use crate::catalog::segment_index::SegmentIndexEntry;
use crate::types::{SegmentId, TxnId, TxnTimestamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues transaction ids and timestamps.
pub struct TxnManager {
    next_txn_id: AtomicU64,
    /// Last issued timestamp; also the current read timestamp.
    ts: AtomicU64,
}

impl TxnManager {
    pub fn new() -> Self {
        TxnManager {
            next_txn_id: AtomicU64::new(1),
            ts: AtomicU64::new(1),
        }
    }

    /// Start a transaction at the current read timestamp.
    pub fn begin(&self) -> Txn {
        Txn {
            txn_id: self.next_txn_id.fetch_add(1, Ordering::Relaxed),
            begin_ts: self.read_ts(),
        }
    }

    /// Latest committed timestamp: new reads see everything committed at or
    /// before it.
    pub fn read_ts(&self) -> TxnTimestamp {
        self.ts.load(Ordering::Acquire)
    }

    /// Allocate the next commit timestamp.
    pub fn next_commit_ts(&self) -> TxnTimestamp {
        self.ts.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for TxnManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-flight transaction.
#[derive(Debug, Clone, Copy)]
pub struct Txn {
    pub txn_id: TxnId,
    pub begin_ts: TxnTimestamp,
}

/// The segment-index entries one transaction created for one table index.
///
/// Ordered by segment id so commit-time dumps are deterministic.
#[derive(Default)]
pub struct TxnIndexStore {
    pub index_entry_map: BTreeMap<SegmentId, Arc<SegmentIndexEntry>>,
}

impl TxnIndexStore {
    pub fn new() -> Self {
        TxnIndexStore::default()
    }

    pub fn add(&mut self, entry: Arc<SegmentIndexEntry>) {
        self.index_entry_map.insert(entry.segment_id, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_timestamps_are_monotonic() {
        let mgr = TxnManager::new();
        let a = mgr.next_commit_ts();
        let b = mgr.next_commit_ts();
        assert!(b > a);
        assert!(mgr.read_ts() >= b);
    }

    #[test]
    fn test_begin_snapshots_read_ts() {
        let mgr = TxnManager::new();
        let txn = mgr.begin();
        let committed = mgr.next_commit_ts();
        assert!(txn.begin_ts < committed, "older txn must not see new commit");
        let newer = mgr.begin();
        assert!(newer.begin_ts >= committed);
        assert_ne!(txn.txn_id, newer.txn_id);
    }
}
