//! Table catalog nodes: versioned table entries and their name history.
//!
//! A [`TableEntry`] owns the column definitions, the segment map with the
//! unsealed-segment pointer, the per-index-name [`TableIndexMeta`] set, and
//! the table's monotonic full-text segment timestamp. A [`TableMeta`] is
//! the name→history mapping with the standard visibility rule.

use crate::catalog::entry::{latest_visible, BaseEntry, EntryKind};
use crate::catalog::index_meta::TableIndexMeta;
use crate::catalog::ConflictType;
use crate::segment::{BlockIndex, SegmentEntry};
use crate::status::Status;
use crate::txn::Txn;
use crate::types::{ColumnDef, SegmentId, TxnId, TxnTimestamp, Value};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sentinel for "no unsealed segment yet".
const NO_UNSEALED: u64 = u64::MAX;

/// One version of a table.
pub struct TableEntry {
    base: BaseEntry,
    pub table_name: String,
    table_dir: PathBuf,
    pub columns: Vec<Arc<ColumnDef>>,
    index_metas: RwLock<HashMap<String, Arc<TableIndexMeta>>>,
    segments: RwLock<BTreeMap<SegmentId, Arc<SegmentEntry>>>,
    unsealed_segment_id: AtomicU64,
    next_segment_id: AtomicU64,
    /// Advances monotonically as full-text index commits land.
    fulltext_segment_ts: Mutex<TxnTimestamp>,
}

impl std::fmt::Debug for TableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEntry")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl TableEntry {
    pub fn new(
        db_dir: &Path,
        table_name: impl Into<String>,
        columns: Vec<Arc<ColumnDef>>,
        txn: &Txn,
        deleted: bool,
    ) -> Arc<Self> {
        let table_name = table_name.into();
        Arc::new(TableEntry {
            base: BaseEntry::new(EntryKind::Table, txn.txn_id, txn.begin_ts, deleted),
            table_dir: db_dir.join(&table_name),
            table_name,
            columns,
            index_metas: RwLock::new(HashMap::new()),
            segments: RwLock::new(BTreeMap::new()),
            unsealed_segment_id: AtomicU64::new(NO_UNSEALED),
            next_segment_id: AtomicU64::new(0),
            fulltext_segment_ts: Mutex::new(0),
        })
    }

    pub fn replay(
        db_dir: &Path,
        table_name: String,
        columns: Vec<Arc<ColumnDef>>,
        txn_id: TxnId,
        begin_ts: TxnTimestamp,
        commit_ts: TxnTimestamp,
        deleted: bool,
    ) -> Arc<Self> {
        Arc::new(TableEntry {
            base: BaseEntry::replay(EntryKind::Table, txn_id, begin_ts, commit_ts, deleted),
            table_dir: db_dir.join(&table_name),
            table_name,
            columns,
            index_metas: RwLock::new(HashMap::new()),
            segments: RwLock::new(BTreeMap::new()),
            unsealed_segment_id: AtomicU64::new(NO_UNSEALED),
            next_segment_id: AtomicU64::new(0),
            fulltext_segment_ts: Mutex::new(0),
        })
    }

    pub fn base(&self) -> &BaseEntry {
        &self.base
    }

    pub fn deleted(&self) -> bool {
        self.base.deleted
    }

    pub fn commit(&self, commit_ts: TxnTimestamp) {
        self.base.commit(commit_ts);
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    pub fn column_def_by_name(&self, name: &str) -> Option<(usize, Arc<ColumnDef>)> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| (i, self.columns[i].clone()))
    }

    pub fn segment(&self, segment_id: SegmentId) -> Option<Arc<SegmentEntry>> {
        self.segments.read().get(&segment_id).cloned()
    }

    pub fn segments_snapshot(&self) -> Vec<Arc<SegmentEntry>> {
        self.segments.read().values().cloned().collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn row_count(&self) -> usize {
        self.segments
            .read()
            .values()
            .map(|s| s.row_count())
            .sum()
    }

    /// The segment currently accepting appends, if any.
    pub fn unsealed_segment_id(&self) -> Option<SegmentId> {
        match self.unsealed_segment_id.load(Ordering::Acquire) {
            NO_UNSEALED => None,
            id => Some(id),
        }
    }

    /// Append rows, creating segments as they fill. Returns the segments
    /// the rows landed in.
    pub fn append_rows(
        &self,
        mut rows: &[Vec<Value>],
        commit_ts: TxnTimestamp,
    ) -> Result<Vec<Arc<SegmentEntry>>, Status> {
        let mut touched = Vec::new();
        while !rows.is_empty() {
            let segment = self.unsealed_segment().unwrap_or_else(|| self.new_segment());
            let taken = segment.append_rows(rows, &self.columns, commit_ts)?;
            if taken > 0 {
                touched.push(segment.clone());
            }
            if segment.is_full() {
                self.unsealed_segment_id.store(NO_UNSEALED, Ordering::Release);
            }
            rows = &rows[taken..];
        }
        Ok(touched)
    }

    fn unsealed_segment(&self) -> Option<Arc<SegmentEntry>> {
        let id = self.unsealed_segment_id()?;
        let segment = self.segment(id)?;
        if segment.is_full() {
            return None;
        }
        Some(segment)
    }

    fn new_segment(&self) -> Arc<SegmentEntry> {
        let segment_id = self.next_segment_id.fetch_add(1, Ordering::AcqRel);
        let segment = Arc::new(SegmentEntry::new(segment_id));
        self.segments.write().insert(segment_id, segment.clone());
        self.unsealed_segment_id.store(segment_id, Ordering::Release);
        segment
    }

    /// Read-only listing of every segment, for index builds.
    pub fn block_index(&self) -> BlockIndex {
        BlockIndex {
            segments: self.segments_snapshot(),
        }
    }

    /// Advance the table's full-text segment timestamp. Monotonic under its
    /// dedicated mutex.
    pub fn update_fulltext_segment_ts(&self, ts: TxnTimestamp) {
        let mut current = self.fulltext_segment_ts.lock();
        if ts > *current {
            *current = ts;
        }
    }

    pub fn fulltext_segment_ts(&self) -> TxnTimestamp {
        *self.fulltext_segment_ts.lock()
    }

    /// The index meta for `name`, creating the (empty) history on demand.
    pub fn get_or_create_index_meta(
        self: &Arc<Self>,
        name: &str,
    ) -> Arc<TableIndexMeta> {
        if let Some(meta) = self.index_metas.read().get(name) {
            return meta.clone();
        }
        let mut metas = self.index_metas.write();
        metas
            .entry(name.to_string())
            .or_insert_with(|| TableIndexMeta::new(self, name))
            .clone()
    }

    pub fn index_meta(&self, name: &str) -> Option<Arc<TableIndexMeta>> {
        self.index_metas.read().get(name).cloned()
    }

    pub fn index_metas_snapshot(&self) -> Vec<Arc<TableIndexMeta>> {
        self.index_metas.read().values().cloned().collect()
    }

    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let mut doc = json!({
            "table_name": self.table_name,
            "txn_id": self.base.txn_id,
            "begin_ts": self.base.begin_ts,
            "commit_ts": self.base.commit_ts(),
            "deleted": self.base.deleted,
        });
        if self.base.deleted {
            return doc;
        }
        doc["columns"] = serde_json::to_value(
            self.columns.iter().map(|c| c.as_ref()).collect::<Vec<_>>(),
        )
        .expect("column serialization is infallible");
        let metas = self.index_metas.read();
        doc["index_metas"] = metas
            .values()
            .map(|m| m.serialize(max_commit_ts))
            .collect();
        doc
    }

    pub fn deserialize(value: &serde_json::Value, db_dir: &Path) -> Result<Arc<Self>, Status> {
        let malformed = || Status::syntax_error("malformed table entry");
        let table_name = value["table_name"].as_str().ok_or_else(malformed)?;
        let deleted = value["deleted"].as_bool().ok_or_else(malformed)?;
        let columns: Vec<Arc<ColumnDef>> = if deleted {
            Vec::new()
        } else {
            serde_json::from_value::<Vec<ColumnDef>>(value["columns"].clone())
                .map_err(|_| malformed())?
                .into_iter()
                .map(Arc::new)
                .collect()
        };
        let entry = TableEntry::replay(
            db_dir,
            table_name.to_string(),
            columns,
            value["txn_id"].as_u64().ok_or_else(malformed)?,
            value["begin_ts"].as_u64().ok_or_else(malformed)?,
            value["commit_ts"].as_u64().ok_or_else(malformed)?,
            deleted,
        );
        if let Some(metas) = value["index_metas"].as_array() {
            let mut index_metas = entry.index_metas.write();
            for meta_json in metas {
                let meta = TableIndexMeta::deserialize(meta_json, &entry)?;
                index_metas.insert(meta.index_name.clone(), meta);
            }
        }
        Ok(entry)
    }
}

/// Name→history mapping for tables of one database.
pub struct TableMeta {
    pub table_name: String,
    entries: RwLock<Vec<Arc<TableEntry>>>,
}

impl TableMeta {
    pub fn new(table_name: impl Into<String>) -> Arc<Self> {
        Arc::new(TableMeta {
            table_name: table_name.into(),
            entries: RwLock::new(Vec::new()),
        })
    }

    fn latest_alive(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Option<Arc<TableEntry>> {
        let entries = self.entries.read();
        latest_visible(&entries, read_ts, txn_id, |e| &e.base).filter(|e| !e.deleted())
    }

    pub fn get(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Result<Arc<TableEntry>, Status> {
        self.latest_alive(read_ts, txn_id)
            .ok_or_else(|| Status::table_not_found(&self.table_name))
    }

    /// Append a new table version, honoring the conflict policy. Returns
    /// every appended entry (a Replace also appends a tombstone) for the
    /// caller to commit; empty on an Ignore short-circuit.
    pub fn create_entry(
        &self,
        db_dir: &Path,
        columns: Vec<Arc<ColumnDef>>,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Vec<Arc<TableEntry>>, Status> {
        let mut appended = Vec::new();
        if self.latest_alive(txn.begin_ts, txn.txn_id).is_some() {
            match conflict {
                ConflictType::Ignore => return Ok(appended),
                ConflictType::Error => return Err(Status::duplicate_table(&self.table_name)),
                ConflictType::Replace => {
                    let tombstone =
                        TableEntry::new(db_dir, self.table_name.clone(), Vec::new(), txn, true);
                    self.entries.write().push(tombstone.clone());
                    appended.push(tombstone);
                }
            }
        }
        let entry = TableEntry::new(db_dir, self.table_name.clone(), columns, txn, false);
        self.entries.write().push(entry.clone());
        appended.push(entry);
        Ok(appended)
    }

    /// Append a tombstone. Returns `None` on an Ignore short-circuit.
    pub fn drop_entry(
        &self,
        db_dir: &Path,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Option<Arc<TableEntry>>, Status> {
        match self.latest_alive(txn.begin_ts, txn.txn_id) {
            None => match conflict {
                ConflictType::Ignore => Ok(None),
                _ => Err(Status::table_not_found(&self.table_name)),
            },
            Some(_) => {
                let tombstone =
                    TableEntry::new(db_dir, self.table_name.clone(), Vec::new(), txn, true);
                self.entries.write().push(tombstone.clone());
                Ok(Some(tombstone))
            }
        }
    }

    pub fn push_replay(&self, entry: Arc<TableEntry>) {
        self.entries.write().push(entry);
    }

    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let entries = self.entries.read();
        json!({
            "table_name": self.table_name,
            "entries": entries
                .iter()
                .filter(|e| {
                    let ts = e.base.commit_ts();
                    ts != 0 && ts <= max_commit_ts
                })
                .map(|e| e.serialize(max_commit_ts))
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn txn_at(txn_id: TxnId, begin_ts: TxnTimestamp) -> Txn {
        Txn { txn_id, begin_ts }
    }

    fn columns() -> Vec<Arc<ColumnDef>> {
        vec![Arc::new(ColumnDef::new(0, "a", DataType::Integer))]
    }

    #[test]
    fn test_create_ignore_twice() {
        let meta = TableMeta::new("t");
        let dir = PathBuf::from("/tmp/db");
        let txn = txn_at(1, 1);
        let first = meta
            .create_entry(&dir, columns(), ConflictType::Ignore, &txn)
            .unwrap()
            .pop()
            .unwrap();
        first.commit(2);

        let second = meta
            .create_entry(&dir, columns(), ConflictType::Ignore, &txn_at(2, 2))
            .unwrap();
        assert!(second.is_empty(), "ignore on existing table is a no-op");
    }

    #[test]
    fn test_create_error_twice() {
        let meta = TableMeta::new("t");
        let dir = PathBuf::from("/tmp/db");
        let first = meta
            .create_entry(&dir, columns(), ConflictType::Error, &txn_at(1, 1))
            .unwrap()
            .pop()
            .unwrap();
        first.commit(2);

        let err = meta
            .create_entry(&dir, columns(), ConflictType::Error, &txn_at(2, 2))
            .unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::DuplicateTable);
    }

    #[test]
    fn test_replace_tombstones_old() {
        let meta = TableMeta::new("t");
        let dir = PathBuf::from("/tmp/db");
        let first = meta
            .create_entry(&dir, columns(), ConflictType::Error, &txn_at(1, 1))
            .unwrap()
            .pop()
            .unwrap();
        first.commit(2);

        let appended = meta
            .create_entry(&dir, columns(), ConflictType::Replace, &txn_at(2, 2))
            .unwrap();
        assert_eq!(appended.len(), 2, "replace appends a tombstone plus the new entry");
        assert!(appended[0].deleted());
        let replacement = appended[1].clone();
        // Commit tombstone and replacement at the same timestamp.
        for entry in &appended {
            entry.commit(3);
        }
        let visible = meta.get(3, 99).unwrap();
        assert!(Arc::ptr_eq(&visible, &replacement));
    }

    #[test]
    fn test_drop_then_get_fails() {
        let meta = TableMeta::new("t");
        let dir = PathBuf::from("/tmp/db");
        let entry = meta
            .create_entry(&dir, columns(), ConflictType::Error, &txn_at(1, 1))
            .unwrap()
            .pop()
            .unwrap();
        entry.commit(2);
        assert!(meta.get(2, 99).is_ok());

        let tombstone = meta
            .drop_entry(&dir, ConflictType::Error, &txn_at(2, 2))
            .unwrap()
            .unwrap();
        tombstone.commit(3);
        assert!(meta.get(3, 99).is_err());
        // Time travel: the table is still visible at the older timestamp.
        assert!(meta.get(2, 99).is_ok());
    }

    #[test]
    fn test_append_rows_seals_segments() {
        let txn = txn_at(1, 1);
        let entry = TableEntry::new(Path::new("/tmp/db"), "t", columns(), &txn, false);
        let rows: Vec<Vec<Value>> = (0..3).map(|i| vec![Value::Integer(i)]).collect();
        entry.append_rows(&rows, 2).unwrap();
        assert_eq!(entry.row_count(), 3);
        assert_eq!(entry.unsealed_segment_id(), Some(0));

        // Fill the segment to capacity; the unsealed pointer moves on.
        let fill: Vec<Vec<Value>> = (0..crate::config::SEGMENT_CAPACITY as i32)
            .map(|i| vec![Value::Integer(i)])
            .collect();
        entry.append_rows(&fill, 3).unwrap();
        assert_eq!(entry.segment_count(), 2);
        assert_eq!(entry.unsealed_segment_id(), Some(1));
    }

    #[test]
    fn test_fulltext_ts_monotonic() {
        let txn = txn_at(1, 1);
        let entry = TableEntry::new(Path::new("/tmp/db"), "t", columns(), &txn, false);
        entry.update_fulltext_segment_ts(5);
        entry.update_fulltext_segment_ts(3);
        assert_eq!(entry.fulltext_segment_ts(), 5);
        entry.update_fulltext_segment_ts(9);
        assert_eq!(entry.fulltext_segment_ts(), 9);
    }
}
