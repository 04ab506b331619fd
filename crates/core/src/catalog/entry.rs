//! The common MVCC record shared by all catalog entries.
//!
//! Every versioned catalog object embeds a [`BaseEntry`]: the creating
//! transaction, its begin timestamp, an atomically-stamped commit timestamp
//! (`0` = uncommitted), and a tombstone flag. Visibility at a read
//! timestamp follows one rule everywhere: an entry is visible iff it was
//! begun and committed no later than the read timestamp, or it belongs to
//! the reading transaction.

use crate::types::{TxnId, TxnTimestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind tag carried by every catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Database,
    Table,
    TableIndex,
    SegmentIndex,
}

/// MVCC header embedded in every versioned catalog entry.
#[derive(Debug)]
pub struct BaseEntry {
    pub entry_kind: EntryKind,
    pub txn_id: TxnId,
    pub begin_ts: TxnTimestamp,
    commit_ts: AtomicU64,
    pub deleted: bool,
}

impl BaseEntry {
    pub fn new(entry_kind: EntryKind, txn_id: TxnId, begin_ts: TxnTimestamp, deleted: bool) -> Self {
        BaseEntry {
            entry_kind,
            txn_id,
            begin_ts,
            commit_ts: AtomicU64::new(0),
            deleted,
        }
    }

    /// Replay constructor: the commit timestamp is the exact recovered one.
    pub fn replay(
        entry_kind: EntryKind,
        txn_id: TxnId,
        begin_ts: TxnTimestamp,
        commit_ts: TxnTimestamp,
        deleted: bool,
    ) -> Self {
        let entry = BaseEntry::new(entry_kind, txn_id, begin_ts, deleted);
        entry.commit_ts.store(commit_ts, Ordering::Release);
        entry
    }

    pub fn commit_ts(&self) -> TxnTimestamp {
        self.commit_ts.load(Ordering::Acquire)
    }

    pub fn committed(&self) -> bool {
        self.commit_ts() != 0
    }

    /// Stamp the commit timestamp.
    pub fn commit(&self, commit_ts: TxnTimestamp) {
        self.commit_ts.store(commit_ts, Ordering::Release);
    }

    /// Visibility at `read_ts` for `read_txn_id`: own writes are always
    /// visible; otherwise the entry must be begun and committed by the read
    /// timestamp.
    pub fn visible_at(&self, read_ts: TxnTimestamp, read_txn_id: TxnId) -> bool {
        if self.txn_id == read_txn_id {
            return true;
        }
        let commit_ts = self.commit_ts();
        self.begin_ts <= read_ts && commit_ts != 0 && commit_ts <= read_ts
    }
}

/// Among `entries`, the latest visible version at `read_ts`: newest commit
/// timestamp wins; an own-write uncommitted entry wins over everything.
///
/// The returned entry may be a tombstone — callers decide whether the
/// object "exists".
pub fn latest_visible<T>(
    entries: &[Arc<T>],
    read_ts: TxnTimestamp,
    read_txn_id: TxnId,
    base: impl Fn(&T) -> &BaseEntry,
) -> Option<Arc<T>> {
    let mut best: Option<&Arc<T>> = None;
    for entry in entries {
        let b = base(entry);
        if !b.visible_at(read_ts, read_txn_id) {
            continue;
        }
        if b.txn_id == read_txn_id && !b.committed() {
            return Some(entry.clone());
        }
        match best {
            Some(current) if base(current).commit_ts() >= b.commit_ts() => {}
            _ => best = Some(entry),
        }
    }
    best.cloned()
}
