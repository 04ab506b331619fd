//! The MVCC catalog.
//!
//! Databases, tables, and indexes are tracked as name→versioned-entry
//! mappings. Every version embeds a [`entry::BaseEntry`] and visibility is
//! decided by one rule: latest commit at or before the read timestamp wins,
//! tombstones make the object not exist. DDL appends versions; nothing is
//! rewritten in place.
//!
//! The whole tree checkpoints to a JSON document and replays through the
//! entries' replay constructors, so recovered commit timestamps are exact.

/// Database entries and their name history.
pub mod database;
/// The shared MVCC header and visibility rule.
pub mod entry;
/// Index specifications.
pub mod index_base;
/// Per-(table, index-name) version history.
pub mod index_meta;
/// File-backed index artifacts.
pub mod file_worker;
/// Per-segment index materialization.
pub mod segment_index;
/// Table entries, segment ownership, and their name history.
pub mod table;
/// Table-wide index entries.
pub mod table_index;

use crate::config;
use crate::status::Status;
use crate::txn::Txn;
use crate::types::{TxnId, TxnTimestamp};
use database::{DbEntry, DbMeta};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a DDL verb treats an existing (or missing) object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Existing object → success, no change.
    Ignore,
    /// Existing object → error status.
    Error,
    /// Existing object → tombstone it and proceed (create paths only).
    Replace,
}

/// The catalog root: database metas plus checkpoint I/O.
pub struct Catalog {
    data_dir: PathBuf,
    db_metas: RwLock<HashMap<String, Arc<DbMeta>>>,
}

impl Catalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Catalog {
            data_dir: data_dir.into(),
            db_metas: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn db_meta(&self, name: &str) -> Arc<DbMeta> {
        if let Some(meta) = self.db_metas.read().get(name) {
            return meta.clone();
        }
        let mut metas = self.db_metas.write();
        metas
            .entry(name.to_string())
            .or_insert_with(|| DbMeta::new(name))
            .clone()
    }

    /// Append a database version. Returns the appended entries for the
    /// caller to commit; empty on an Ignore short-circuit.
    pub fn create_database(
        &self,
        name: &str,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Vec<Arc<DbEntry>>, Status> {
        self.db_meta(name).create_entry(&self.data_dir, conflict, txn)
    }

    pub fn drop_database(
        &self,
        name: &str,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Option<Arc<DbEntry>>, Status> {
        self.db_meta(name).drop_entry(&self.data_dir, conflict, txn)
    }

    pub fn get_database(
        &self,
        name: &str,
        read_ts: TxnTimestamp,
        txn_id: TxnId,
    ) -> Result<Arc<DbEntry>, Status> {
        match self.db_metas.read().get(name) {
            Some(meta) => meta.get(read_ts, txn_id),
            None => Err(Status::database_not_found(name)),
        }
    }

    /// Names of the databases visible at `read_ts`, sorted.
    pub fn list_databases(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Vec<String> {
        let metas = self.db_metas.read();
        let mut names: Vec<String> = metas
            .values()
            .filter(|m| m.get(read_ts, txn_id).is_ok())
            .map(|m| m.db_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Serialize every committed entry at or before `max_commit_ts`.
    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let metas = self.db_metas.read();
        json!({
            "databases": metas
                .values()
                .map(|m| m.serialize(max_commit_ts))
                .collect::<Vec<_>>(),
        })
    }

    /// Write the checkpoint atomically (temp file + rename).
    pub fn save(&self, max_commit_ts: TxnTimestamp) -> Result<(), Status> {
        fs::create_dir_all(&self.data_dir).map_err(|e| Status::io_error(&e))?;
        let path = self.data_dir.join(config::CATALOG_FILE_NAME);
        let tmp_path = path.with_extension("json.tmp");
        let doc = self.serialize(max_commit_ts);
        let bytes =
            serde_json::to_vec_pretty(&doc).map_err(|e| Status::syntax_error(e.to_string()))?;
        fs::write(&tmp_path, &bytes).map_err(|e| Status::io_error(&e))?;
        fs::rename(&tmp_path, &path).map_err(|e| Status::io_error(&e))?;
        tracing::info!("catalog checkpoint saved to {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Load a checkpoint if one exists. Returns the largest commit
    /// timestamp seen, so the transaction manager can resume past it.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<(Self, TxnTimestamp), Status> {
        let catalog = Catalog::new(data_dir);
        let path = catalog.data_dir.join(config::CATALOG_FILE_NAME);
        if !path.exists() {
            return Ok((catalog, 0));
        }
        let bytes = fs::read(&path).map_err(|e| Status::io_error(&e))?;
        let doc: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Status::syntax_error(format!("malformed catalog checkpoint: {e}")))?;

        let mut max_ts = 0;
        if let Some(databases) = doc["databases"].as_array() {
            let mut metas = catalog.db_metas.write();
            for db_json in databases {
                let db_name = db_json["db_name"]
                    .as_str()
                    .ok_or_else(|| Status::syntax_error("malformed database meta"))?
                    .to_string();
                let meta = DbMeta::new(db_name.clone());
                if let Some(entries) = db_json["entries"].as_array() {
                    for entry_json in entries {
                        let entry = DbEntry::deserialize(entry_json, &catalog.data_dir)?;
                        max_ts = max_ts.max(entry.base().commit_ts());
                        max_ts = max_ts.max(max_table_commit_ts(entry_json));
                        meta.push_replay(entry);
                    }
                }
                metas.insert(db_name, meta);
            }
        }
        tracing::info!("catalog loaded from {:?} (max commit ts {})", path, max_ts);
        Ok((catalog, max_ts))
    }
}

/// Largest commit timestamp anywhere under one serialized database entry.
fn max_table_commit_ts(db_json: &serde_json::Value) -> TxnTimestamp {
    let mut max_ts = 0;
    let Some(table_metas) = db_json["table_metas"].as_array() else {
        return 0;
    };
    for meta in table_metas {
        let Some(entries) = meta["entries"].as_array() else {
            continue;
        };
        for entry in entries {
            max_ts = max_ts.max(entry["commit_ts"].as_u64().unwrap_or(0));
            let Some(index_metas) = entry["index_metas"].as_array() else {
                continue;
            };
            for index_meta in index_metas {
                let Some(index_entries) = index_meta["entries"].as_array() else {
                    continue;
                };
                for index_entry in index_entries {
                    max_ts = max_ts.max(index_entry["commit_ts"].as_u64().unwrap_or(0));
                }
            }
        }
    }
    max_ts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnManager;

    fn commit_all(entry: &Arc<DbEntry>, ts: TxnTimestamp) {
        entry.commit(ts);
    }

    #[test]
    fn test_default_database_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = TxnManager::new();
        let catalog = Catalog::new(tmp.path());

        let txn = mgr.begin();
        let entry = catalog
            .create_database("default", ConflictType::Error, &txn)
            .unwrap()
            .pop()
            .unwrap();
        commit_all(&entry, mgr.next_commit_ts());

        assert_eq!(catalog.list_databases(mgr.read_ts(), 0), vec!["default"]);

        catalog.save(mgr.read_ts()).unwrap();
        let (loaded, max_ts) = Catalog::load(tmp.path()).unwrap();
        assert!(max_ts >= entry.base().commit_ts());
        assert_eq!(loaded.list_databases(max_ts, 0), vec!["default"]);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, max_ts) = Catalog::load(tmp.path()).unwrap();
        assert_eq!(max_ts, 0);
        assert!(catalog.list_databases(1, 0).is_empty());
    }

    #[test]
    fn test_dropped_database_not_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = TxnManager::new();
        let catalog = Catalog::new(tmp.path());

        let txn = mgr.begin();
        let entry = catalog
            .create_database("d", ConflictType::Error, &txn)
            .unwrap()
            .pop()
            .unwrap();
        entry.commit(mgr.next_commit_ts());

        let txn = mgr.begin();
        let tombstone = catalog
            .drop_database("d", ConflictType::Error, &txn)
            .unwrap()
            .unwrap();
        tombstone.commit(mgr.next_commit_ts());

        assert!(catalog.list_databases(mgr.read_ts(), 0).is_empty());
        assert!(catalog.get_database("d", mgr.read_ts(), 0).is_err());
    }
}
