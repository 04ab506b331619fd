//! Table-wide index entries: the MVCC unit for index DDL.
//!
//! A [`TableIndexEntry`] is one logical version of a table's index. It owns
//! the per-segment entries, the `last_segment` pointer for the unsealed
//! segment, and the pools the posting builders borrow. Its rw-lock guards
//! the segment map and commit stamping; create/commit/rollback/cleanup take
//! the write side, snapshots take the read side.

use crate::catalog::entry::{latest_visible, BaseEntry, EntryKind};
use crate::catalog::index_base::{IndexBase, IndexType};
use crate::catalog::index_meta::TableIndexMeta;
use crate::catalog::segment_index::{
    get_create_index_param, ChunkIndexEntry, SegmentIndexEntry,
};
use crate::config;
use crate::mem::{ByteSlicePool, RecyclePool};
use crate::segment::{BlockIndex, SegmentEntry};
use crate::status::{unrecoverable, Status};
use crate::txn::{Txn, TxnIndexStore};
use crate::types::{ColumnDef, SegmentId, TxnTimestamp};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};

/// Collects segment-index entries whose deletion is deferred to the
/// background workers.
#[derive(Default)]
pub struct CleanupScanner {
    entries: Vec<Arc<SegmentIndexEntry>>,
}

impl CleanupScanner {
    pub fn new() -> Self {
        CleanupScanner::default()
    }

    pub fn add_entry(&mut self, entry: Arc<SegmentIndexEntry>) {
        self.entries.push(entry);
    }

    pub fn into_entries(self) -> Vec<Arc<SegmentIndexEntry>> {
        self.entries
    }
}

/// One logical version of a table's index.
pub struct TableIndexEntry {
    base: BaseEntry,
    index_base: Option<Arc<IndexBase>>,
    index_dir: PathBuf,
    column_def: Option<Arc<ColumnDef>>,
    column_id: Option<usize>,
    meta: Weak<TableIndexMeta>,
    byte_slice_pool: Arc<ByteSlicePool>,
    buffer_pool: Arc<RecyclePool>,
    index_by_segment: RwLock<BTreeMap<SegmentId, Arc<SegmentIndexEntry>>>,
    last_segment: RwLock<Option<Arc<SegmentIndexEntry>>>,
}

impl TableIndexEntry {
    /// Ordinary create. Tombstones (`is_delete`) carry no payload.
    pub fn new_table_index_entry(
        meta: &Arc<TableIndexMeta>,
        is_delete: bool,
        index_base: Option<Arc<IndexBase>>,
        txn: &Txn,
    ) -> Result<Arc<Self>, Status> {
        let (index_dir, column_def, column_id) = if is_delete {
            (PathBuf::new(), None, None)
        } else {
            let index_base = index_base
                .as_ref()
                .ok_or_else(|| Status::syntax_error("create index without a specification"))?;
            let column_name = index_base.column_name()?;
            let table = meta.table();
            let (column_id, column_def) = table
                .column_def_by_name(column_name)
                .ok_or_else(|| Status::syntax_error(format!("unknown column '{column_name}'")))?;
            let index_dir = determine_index_dir(table.table_dir(), &index_base.index_name);
            (index_dir, Some(column_def), Some(column_id))
        };
        Ok(Arc::new(TableIndexEntry {
            base: BaseEntry::new(EntryKind::TableIndex, txn.txn_id, txn.begin_ts, is_delete),
            index_base,
            index_dir,
            column_def,
            column_id,
            meta: Arc::downgrade(meta),
            byte_slice_pool: Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET)),
            buffer_pool: Arc::new(RecyclePool::new()),
            index_by_segment: RwLock::new(BTreeMap::new()),
            last_segment: RwLock::new(None),
        }))
    }

    /// Replay constructor: `commit_ts` is the exact recovered timestamp,
    /// never one derived at replay time.
    pub fn replay_table_index_entry(
        meta: &Arc<TableIndexMeta>,
        is_delete: bool,
        index_base: Option<Arc<IndexBase>>,
        index_dir: PathBuf,
        txn_id: u64,
        begin_ts: TxnTimestamp,
        commit_ts: TxnTimestamp,
    ) -> Arc<Self> {
        let (column_def, column_id) = match (&index_base, is_delete) {
            (Some(base), false) => match base
                .column_name()
                .ok()
                .and_then(|name| meta.table().column_def_by_name(name))
            {
                Some((id, def)) => (Some(def), Some(id)),
                None => (None, None),
            },
            _ => (None, None),
        };
        Arc::new(TableIndexEntry {
            base: BaseEntry::replay(EntryKind::TableIndex, txn_id, begin_ts, commit_ts, is_delete),
            index_base,
            index_dir,
            column_def,
            column_id,
            meta: Arc::downgrade(meta),
            byte_slice_pool: Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET)),
            buffer_pool: Arc::new(RecyclePool::new()),
            index_by_segment: RwLock::new(BTreeMap::new()),
            last_segment: RwLock::new(None),
        })
    }

    pub fn base(&self) -> &BaseEntry {
        &self.base
    }

    pub fn deleted(&self) -> bool {
        self.base.deleted
    }

    pub fn commit_ts(&self) -> TxnTimestamp {
        self.base.commit_ts()
    }

    pub fn commit(&self, commit_ts: TxnTimestamp) {
        self.base.commit(commit_ts);
    }

    /// The index specification. Only live entries carry one.
    pub fn index_base(&self) -> &Arc<IndexBase> {
        match &self.index_base {
            Some(base) => base,
            None => unrecoverable("tombstoned index entry has no specification"),
        }
    }

    pub fn index_type(&self) -> IndexType {
        self.index_base().index_type
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn column_def(&self) -> Option<&Arc<ColumnDef>> {
        self.column_def.as_ref()
    }

    /// Positional id of the indexed column in the table's column list.
    pub fn column_id(&self) -> Result<usize, Status> {
        self.column_id
            .ok_or_else(|| Status::syntax_error("index entry has no resolved column"))
    }

    pub fn byte_slice_pool(&self) -> Arc<ByteSlicePool> {
        self.byte_slice_pool.clone()
    }

    pub fn buffer_pool(&self) -> Arc<RecyclePool> {
        self.buffer_pool.clone()
    }

    pub fn meta(&self) -> Arc<TableIndexMeta> {
        match self.meta.upgrade() {
            Some(meta) => meta,
            None => unrecoverable("table index entry outlived its meta"),
        }
    }

    /// Snapshot of the segment map, taken under the read lock.
    pub fn index_by_segment_snapshot(&self) -> BTreeMap<SegmentId, Arc<SegmentIndexEntry>> {
        self.index_by_segment.read().clone()
    }

    pub fn segment_entry(&self, segment_id: SegmentId) -> Option<Arc<SegmentIndexEntry>> {
        self.index_by_segment.read().get(&segment_id).cloned()
    }

    pub fn last_segment(&self) -> Option<Arc<SegmentIndexEntry>> {
        self.last_segment.read().clone()
    }

    /// Point `last_segment` at the entry of the currently unsealed segment.
    pub fn set_last_segment(&self, entry: Arc<SegmentIndexEntry>) {
        *self.last_segment.write() = Some(entry);
    }

    /// Find or create the entry for `segment_id` under the write lock.
    /// Returns the entry and whether it was created.
    pub fn get_or_create_segment(
        self: &Arc<Self>,
        segment_id: SegmentId,
        txn: &Txn,
    ) -> Result<(Arc<SegmentIndexEntry>, bool), Status> {
        let mut map = self.index_by_segment.write();
        if let Some(entry) = map.get(&segment_id) {
            return Ok((entry.clone(), false));
        }
        let param = get_create_index_param(self.index_base(), config::SEGMENT_CAPACITY);
        let entry = SegmentIndexEntry::new_index_entry(self, segment_id, txn, param)?;
        map.insert(segment_id, entry.clone());
        Ok((entry.clone(), true))
    }

    /// Commit every segment entry the transaction created: save its files
    /// (unless replaying), stamp it, then lift this entry's own commit.
    /// Iteration follows segment-id order for deterministic recovery.
    pub fn commit_create_index(
        &self,
        txn_index_store: &TxnIndexStore,
        commit_ts: TxnTimestamp,
        is_replay: bool,
    ) -> Result<(), Status> {
        {
            let _guard = self.index_by_segment.write();
            for segment_index_entry in txn_index_store.index_entry_map.values() {
                if !is_replay {
                    segment_index_entry.save_index_file()?;
                }
                segment_index_entry.commit(commit_ts);
            }
            if !self.base.committed() {
                self.base.commit(commit_ts);
            }
        }
        if self.index_type() == IndexType::FullText {
            self.meta().table().update_fulltext_segment_ts(commit_ts);
        }
        Ok(())
    }

    /// Roll back every segment entry the transaction created. A segment id
    /// missing from the map is an invariant violation.
    pub fn rollback_create_index(&self, txn_index_store: &TxnIndexStore) {
        let mut map = self.index_by_segment.write();
        for (segment_id, segment_index_entry) in &txn_index_store.index_entry_map {
            segment_index_entry.cleanup();
            if map.remove(segment_id).is_none() {
                unrecoverable("segment index entry missing during rollback");
            }
        }
    }

    /// Full-text only: build one segment entirely and register it. Other
    /// index types return `None`.
    pub fn populate_entirely(
        self: &Arc<Self>,
        segment: &Arc<SegmentEntry>,
        txn: &Txn,
    ) -> Result<Option<Arc<SegmentIndexEntry>>, Status> {
        if self.index_type() != IndexType::FullText {
            return Ok(None);
        }
        let param = get_create_index_param(self.index_base(), segment.capacity);
        let entry = SegmentIndexEntry::new_index_entry(self, segment.segment_id, txn, param)?;
        entry.populate_entirely(segment, txn)?;
        self.index_by_segment
            .write()
            .insert(segment.segment_id, entry.clone());
        Ok(Some(entry))
    }

    /// Create one segment entry per covered segment. Sets `last_segment` to
    /// the entry of the table's unsealed segment.
    pub fn create_index_prepare(
        self: &Arc<Self>,
        block_index: &BlockIndex,
        txn: &Txn,
        prepare: bool,
        is_replay: bool,
        check_ts: bool,
    ) -> Result<Vec<Arc<SegmentIndexEntry>>, Status> {
        let unsealed_id = self.meta().table().unsealed_segment_id();
        let mut created = Vec::with_capacity(block_index.segments.len());
        for segment in &block_index.segments {
            let param = get_create_index_param(self.index_base(), segment.row_count());
            let entry =
                SegmentIndexEntry::new_index_entry(self, segment.segment_id, txn, param)?;
            if !is_replay {
                entry.create_index_prepare(segment, txn, prepare, check_ts)?;
            }
            self.index_by_segment
                .write()
                .insert(segment.segment_id, entry.clone());
            created.push(entry.clone());
            if unsealed_id == Some(segment.segment_id) {
                *self.last_segment.write() = Some(entry);
            }
        }
        Ok(created)
    }

    /// Fan the cooperative build out to every segment entry, each with its
    /// own progress counter. Returns the first failure.
    pub fn create_index_do(
        &self,
        create_index_idxes: &HashMap<SegmentId, Arc<AtomicU64>>,
    ) -> Result<(), Status> {
        if self.index_base().column_names.len() != 1 {
            return Err(Status::not_support("composite index build"));
        }
        let snapshot = self.index_by_segment_snapshot();
        for (segment_id, segment_index_entry) in snapshot {
            if let Some(progress) = create_index_idxes.get(&segment_id) {
                segment_index_entry.create_index_do(progress)?;
            }
        }
        Ok(())
    }

    /// Apply newly appended rows of the unsealed segment to its memtable.
    pub fn mem_index_commit(&self) -> Result<(), Status> {
        if let Some(last) = self.last_segment() {
            last.mem_index_commit()?;
        }
        Ok(())
    }

    /// Promote the unsealed segment's memtable to an immutable chunk.
    pub fn mem_index_dump(&self, spill: bool) -> Result<Option<Arc<ChunkIndexEntry>>, Status> {
        match self.last_segment() {
            Some(last) => last.mem_index_dump(spill),
            None => Ok(None),
        }
    }

    /// Remove the segment entries whose ids appear in `sorted_segment_ids`
    /// (exactly the intersection with the map) and hand them to the scanner
    /// for deferred deletion.
    pub fn pick_cleanup_by_segments(
        &self,
        sorted_segment_ids: &[SegmentId],
        scanner: &mut CleanupScanner,
    ) {
        let mut map = self.index_by_segment.write();
        let picked: Vec<SegmentId> = map
            .keys()
            .filter(|id| sorted_segment_ids.binary_search(id).is_ok())
            .copied()
            .collect();
        for segment_id in picked {
            if let Some(entry) = map.remove(&segment_id) {
                scanner.add_entry(entry);
            }
        }
    }

    /// Delete the on-disk index directory after per-segment cleanup.
    /// Skipped for tombstones: the artifacts belong to the replaced entry.
    pub fn cleanup(&self) {
        if self.base.deleted {
            return;
        }
        let snapshot = self.index_by_segment_snapshot();
        for segment_index_entry in snapshot.values() {
            segment_index_entry.cleanup();
        }
        tracing::info!("cleanup index dir: {:?}", self.index_dir);
        if self.index_dir.as_os_str().is_empty() || !self.index_dir.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.index_dir) {
            tracing::warn!("failed to remove index dir {:?}: {}", self.index_dir, e);
        }
    }

    /// Snapshot to the persistent JSON form. Tombstones carry only the MVCC
    /// header. Segment entries committed after `max_commit_ts` are left out.
    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let mut doc = json!({
            "txn_id": self.base.txn_id,
            "begin_ts": self.base.begin_ts,
            "commit_ts": self.commit_ts(),
            "deleted": self.base.deleted,
        });
        if self.base.deleted {
            return doc;
        }
        let candidates: Vec<Arc<SegmentIndexEntry>> = {
            let map = self.index_by_segment.read();
            map.values()
                .filter(|e| {
                    let ts = e.commit_ts();
                    ts != 0 && ts <= max_commit_ts
                })
                .cloned()
                .collect()
        };
        doc["index_dir"] = json!(self.index_dir.to_string_lossy());
        doc["index_base"] = self.index_base().serialize();
        doc["segment_indexes"] = candidates.iter().map(|e| e.serialize()).collect();
        doc
    }

    /// Inverse of `serialize`; always goes through the replay constructor.
    pub fn deserialize(
        value: &serde_json::Value,
        meta: &Arc<TableIndexMeta>,
    ) -> Result<Arc<Self>, Status> {
        let malformed = || Status::syntax_error("malformed table index entry");
        let txn_id = value["txn_id"].as_u64().ok_or_else(malformed)?;
        let begin_ts = value["begin_ts"].as_u64().ok_or_else(malformed)?;
        let commit_ts = value["commit_ts"].as_u64().ok_or_else(malformed)?;
        let deleted = value["deleted"].as_bool().ok_or_else(malformed)?;

        if deleted {
            return Ok(Self::replay_table_index_entry(
                meta,
                true,
                None,
                PathBuf::new(),
                txn_id,
                begin_ts,
                commit_ts,
            ));
        }

        let index_dir = PathBuf::from(value["index_dir"].as_str().ok_or_else(malformed)?);
        let index_base = Arc::new(IndexBase::deserialize(&value["index_base"])?);
        let entry = Self::replay_table_index_entry(
            meta,
            false,
            Some(index_base),
            index_dir,
            txn_id,
            begin_ts,
            commit_ts,
        );

        if let Some(segment_indexes) = value["segment_indexes"].as_array() {
            let mut map = entry.index_by_segment.write();
            for segment_json in segment_indexes {
                let segment_index_entry = SegmentIndexEntry::deserialize(segment_json, &entry)?;
                map.insert(segment_index_entry.segment_id, segment_index_entry);
            }
        }
        Ok(entry)
    }
}

/// `<table_dir>/<index_name>`, disambiguated with a numeric suffix when the
/// name is reused after a drop and the old directory still exists.
fn determine_index_dir(table_dir: &Path, index_name: &str) -> PathBuf {
    let base = table_dir.join(index_name);
    if !base.exists() {
        return base;
    }
    let mut suffix = 1;
    loop {
        let candidate = table_dir.join(format!("{index_name}_{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

/// Latest visible index entry among `entries`; tombstones surface as
/// "not found" at the meta layer.
pub(crate) fn latest_visible_index(
    entries: &[Arc<TableIndexEntry>],
    read_ts: TxnTimestamp,
    read_txn_id: u64,
) -> Option<Arc<TableIndexEntry>> {
    latest_visible(entries, read_ts, read_txn_id, |e| &e.base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::TableEntry;
    use crate::catalog::ConflictType;
    use crate::types::{ColumnDef, DataType, Value};

    fn txn_at(txn_id: u64, begin_ts: TxnTimestamp) -> Txn {
        Txn { txn_id, begin_ts }
    }

    /// A committed table with a varchar column and a full-text index entry.
    fn fulltext_stack(
        tmp: &tempfile::TempDir,
    ) -> (Arc<TableEntry>, Arc<TableIndexMeta>, Arc<TableIndexEntry>) {
        let txn = txn_at(1, 1);
        let table = TableEntry::new(
            tmp.path(),
            "t",
            vec![Arc::new(ColumnDef::new(0, "body", DataType::Varchar))],
            &txn,
            false,
        );
        table.commit(2);
        let meta = TableIndexMeta::new(&table, "ft");
        let index_base = Arc::new(IndexBase::new(
            "ft",
            IndexType::FullText,
            vec!["body".into()],
            Vec::new(),
        ));
        let entry = meta
            .create_table_index(index_base, ConflictType::Error, &txn_at(2, 2))
            .unwrap()
            .entry
            .unwrap();
        (table, meta, entry)
    }

    #[test]
    fn test_determine_index_dir_disambiguates() {
        let tmp = tempfile::tempdir().unwrap();
        let first = determine_index_dir(tmp.path(), "idx");
        assert_eq!(first, tmp.path().join("idx"));
        fs::create_dir_all(&first).unwrap();
        let second = determine_index_dir(tmp.path(), "idx");
        assert_eq!(second, tmp.path().join("idx_1"));
        fs::create_dir_all(&second).unwrap();
        assert_eq!(determine_index_dir(tmp.path(), "idx"), tmp.path().join("idx_2"));
    }

    #[test]
    fn test_get_or_create_segment_is_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let (_table, _meta, entry) = fulltext_stack(&tmp);
        let txn = txn_at(3, 3);
        let (first, created) = entry.get_or_create_segment(7, &txn).unwrap();
        assert!(created);
        let (second, created) = entry.get_or_create_segment(7, &txn).unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(entry.index_by_segment_snapshot().len(), 1);
    }

    #[test]
    fn test_commit_create_index_stamps_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let (table, _meta, entry) = fulltext_stack(&tmp);
        table
            .append_rows(&[vec![Value::Varchar("hello posting world".into())]], 2)
            .unwrap();

        let txn = txn_at(3, 3);
        let created = entry
            .create_index_prepare(&table.block_index(), &txn, false, false, true)
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(entry.last_segment().is_some(), "unsealed segment tracked");

        let mut store = TxnIndexStore::new();
        for segment_entry in &created {
            store.add(segment_entry.clone());
        }
        entry.commit_create_index(&store, 9, false).unwrap();
        assert!(entry.commit_ts() >= 9);
        for segment_entry in created {
            assert_eq!(segment_entry.commit_ts(), 9);
        }
        // Full-text commits advance the table's segment timestamp.
        assert_eq!(table.fulltext_segment_ts(), 9);
    }

    #[test]
    fn test_rollback_removes_created_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let (_table, _meta, entry) = fulltext_stack(&tmp);
        let txn = txn_at(3, 3);
        let (segment_entry, _) = entry.get_or_create_segment(0, &txn).unwrap();

        let mut store = TxnIndexStore::new();
        store.add(segment_entry);
        entry.rollback_create_index(&store);
        assert!(entry.index_by_segment_snapshot().is_empty());
    }

    #[test]
    #[should_panic(expected = "unrecoverable")]
    fn test_rollback_of_missing_segment_is_unrecoverable() {
        let tmp = tempfile::tempdir().unwrap();
        let (_table, _meta, entry) = fulltext_stack(&tmp);
        let txn = txn_at(3, 3);
        let (segment_entry, _) = entry.get_or_create_segment(0, &txn).unwrap();

        let mut store = TxnIndexStore::new();
        store.add(segment_entry);
        entry.rollback_create_index(&store);
        // The segment is gone from the map; rolling back again violates the
        // append-only invariant.
        entry.rollback_create_index(&store);
    }

    #[test]
    fn test_pick_cleanup_exact_intersection() {
        let tmp = tempfile::tempdir().unwrap();
        let (_table, _meta, entry) = fulltext_stack(&tmp);
        let txn = txn_at(3, 3);
        for segment_id in [0u64, 1, 2, 3] {
            entry.get_or_create_segment(segment_id, &txn).unwrap();
        }

        let mut scanner = CleanupScanner::new();
        entry.pick_cleanup_by_segments(&[1, 3, 7], &mut scanner);
        let picked: Vec<SegmentId> = scanner
            .into_entries()
            .iter()
            .map(|e| e.segment_id)
            .collect();
        assert_eq!(picked, vec![1, 3]);
        let remaining: Vec<SegmentId> =
            entry.index_by_segment_snapshot().keys().copied().collect();
        assert_eq!(remaining, vec![0, 2]);
    }

    #[test]
    fn test_serialize_deserialize_preserves_commit_ts() {
        let tmp = tempfile::tempdir().unwrap();
        let (table, meta, entry) = fulltext_stack(&tmp);
        table
            .append_rows(&[vec![Value::Varchar("posting stream".into())]], 2)
            .unwrap();
        let txn = txn_at(3, 3);
        let created = entry
            .create_index_prepare(&table.block_index(), &txn, false, false, true)
            .unwrap();
        let mut store = TxnIndexStore::new();
        for segment_entry in &created {
            store.add(segment_entry.clone());
        }
        entry.commit_create_index(&store, 11, false).unwrap();

        let doc = entry.serialize(TxnTimestamp::MAX);
        let restored = TableIndexEntry::deserialize(&doc, &meta).unwrap();
        assert_eq!(restored.commit_ts(), 11, "replay keeps the exact timestamp");
        assert!(!restored.deleted());
        assert_eq!(restored.index_base().index_name, "ft");
        assert_eq!(restored.index_by_segment_snapshot().len(), 1);
        let segment_entry = restored.segment_entry(0).unwrap();
        assert_eq!(segment_entry.commit_ts(), 11);
    }

    #[test]
    fn test_tombstone_serializes_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let (_table, meta, _entry) = fulltext_stack(&tmp);
        let tombstone = TableIndexEntry::new_table_index_entry(&meta, true, None, &txn_at(4, 4))
            .unwrap();
        tombstone.commit(5);
        let doc = tombstone.serialize(TxnTimestamp::MAX);
        assert_eq!(doc["deleted"], serde_json::json!(true));
        assert!(doc.get("index_base").is_none());

        let restored = TableIndexEntry::deserialize(&doc, &meta).unwrap();
        assert!(restored.deleted());
        assert_eq!(restored.commit_ts(), 5);
    }
}
