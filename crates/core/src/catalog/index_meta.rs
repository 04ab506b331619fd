//! Per-(table, index name) version history.
//!
//! A [`TableIndexMeta`] owns the ordered history of [`TableIndexEntry`]
//! versions for one index name. Readers pick the latest visible version at
//! their read timestamp; DDL verbs append under the write lock and return
//! the new entry for the caller to commit.

use crate::catalog::table::TableEntry;
use crate::catalog::table_index::{latest_visible_index, TableIndexEntry};
use crate::catalog::ConflictType;
use crate::catalog::index_base::IndexBase;
use crate::status::{unrecoverable, Status};
use crate::txn::Txn;
use crate::types::{TxnId, TxnTimestamp};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::{Arc, Weak};

/// Result of a create verb: the appended entries, if any.
pub struct CreateIndexResult {
    /// The new live entry. `None` when an Ignore conflict short-circuited.
    pub entry: Option<Arc<TableIndexEntry>>,
    /// The tombstone appended by a Replace, to commit alongside.
    pub replaced_tombstone: Option<Arc<TableIndexEntry>>,
    /// The previous live entry displaced by a Replace (for deferred
    /// cleanup).
    pub replaced_entry: Option<Arc<TableIndexEntry>>,
}

/// Result of a drop verb.
pub struct DropIndexResult {
    /// The tombstone entry. `None` when an Ignore conflict short-circuited.
    pub tombstone: Option<Arc<TableIndexEntry>>,
    /// The live entry that was dropped (for deferred cleanup).
    pub dropped: Option<Arc<TableIndexEntry>>,
}

/// Ordered history of index-entry versions for one (table, index name).
pub struct TableIndexMeta {
    pub index_name: String,
    table: Weak<TableEntry>,
    entries: RwLock<Vec<Arc<TableIndexEntry>>>,
}

impl TableIndexMeta {
    pub fn new(table: &Arc<TableEntry>, index_name: impl Into<String>) -> Arc<Self> {
        Arc::new(TableIndexMeta {
            index_name: index_name.into(),
            table: Arc::downgrade(table),
            entries: RwLock::new(Vec::new()),
        })
    }

    pub fn table(&self) -> Arc<TableEntry> {
        match self.table.upgrade() {
            Some(table) => table,
            None => unrecoverable("index meta outlived its table entry"),
        }
    }

    fn latest_alive(
        &self,
        read_ts: TxnTimestamp,
        txn_id: TxnId,
    ) -> Option<Arc<TableIndexEntry>> {
        let entries = self.entries.read();
        latest_visible_index(&entries, read_ts, txn_id).filter(|e| !e.deleted())
    }

    /// Latest visible live entry, or `IndexNotFound`.
    pub fn get(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Result<Arc<TableIndexEntry>, Status> {
        self.latest_alive(read_ts, txn_id)
            .ok_or_else(|| Status::index_not_found(&self.index_name))
    }

    /// Append a new index version, honoring the conflict policy.
    pub fn create_table_index(
        self: &Arc<Self>,
        index_base: Arc<IndexBase>,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<CreateIndexResult, Status> {
        let existing = self.latest_alive(txn.begin_ts, txn.txn_id);
        let mut result = CreateIndexResult {
            entry: None,
            replaced_tombstone: None,
            replaced_entry: None,
        };
        if let Some(existing) = existing {
            match conflict {
                ConflictType::Ignore => return Ok(result),
                ConflictType::Error => {
                    return Err(Status::duplicate_index(&self.index_name));
                }
                ConflictType::Replace => {
                    let tombstone =
                        TableIndexEntry::new_table_index_entry(self, true, None, txn)?;
                    self.entries.write().push(tombstone.clone());
                    result.replaced_tombstone = Some(tombstone);
                    result.replaced_entry = Some(existing);
                }
            }
        }
        let entry = TableIndexEntry::new_table_index_entry(self, false, Some(index_base), txn)?;
        self.entries.write().push(entry.clone());
        result.entry = Some(entry);
        Ok(result)
    }

    /// Append a tombstone, honoring the conflict policy (Replace is a
    /// create-only policy and is rejected upstream).
    pub fn drop_table_index(
        self: &Arc<Self>,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<DropIndexResult, Status> {
        let existing = self.latest_alive(txn.begin_ts, txn.txn_id);
        match existing {
            None => match conflict {
                ConflictType::Ignore => Ok(DropIndexResult {
                    tombstone: None,
                    dropped: None,
                }),
                _ => Err(Status::index_not_found(&self.index_name)),
            },
            Some(dropped) => {
                let tombstone = TableIndexEntry::new_table_index_entry(self, true, None, txn)?;
                self.entries.write().push(tombstone.clone());
                Ok(DropIndexResult {
                    tombstone: Some(tombstone),
                    dropped: Some(dropped),
                })
            }
        }
    }

    /// Append a replayed entry during catalog load.
    pub fn push_replay(&self, entry: Arc<TableIndexEntry>) {
        self.entries.write().push(entry);
    }

    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let entries = self.entries.read();
        json!({
            "index_name": self.index_name,
            "entries": entries
                .iter()
                .filter(|e| {
                    let ts = e.commit_ts();
                    ts != 0 && ts <= max_commit_ts
                })
                .map(|e| e.serialize(max_commit_ts))
                .collect::<Vec<_>>(),
        })
    }

    pub fn deserialize(
        value: &serde_json::Value,
        table: &Arc<TableEntry>,
    ) -> Result<Arc<Self>, Status> {
        let malformed = || Status::syntax_error("malformed index meta");
        let index_name = value["index_name"].as_str().ok_or_else(malformed)?;
        let meta = TableIndexMeta::new(table, index_name);
        if let Some(entries) = value["entries"].as_array() {
            for entry_json in entries {
                let entry = TableIndexEntry::deserialize(entry_json, &meta)?;
                meta.push_replay(entry);
            }
        }
        Ok(meta)
    }
}
