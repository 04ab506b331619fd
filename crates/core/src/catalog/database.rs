//! Database catalog nodes: versioned database entries and their name
//! history.

use crate::catalog::entry::{latest_visible, BaseEntry, EntryKind};
use crate::catalog::table::{TableEntry, TableMeta};
use crate::catalog::ConflictType;
use crate::status::Status;
use crate::txn::Txn;
use crate::types::{ColumnDef, TxnId, TxnTimestamp};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One version of a database.
pub struct DbEntry {
    base: BaseEntry,
    pub db_name: String,
    db_dir: PathBuf,
    table_metas: RwLock<HashMap<String, Arc<TableMeta>>>,
}

impl DbEntry {
    pub fn new(data_dir: &Path, db_name: impl Into<String>, txn: &Txn, deleted: bool) -> Arc<Self> {
        let db_name = db_name.into();
        Arc::new(DbEntry {
            base: BaseEntry::new(EntryKind::Database, txn.txn_id, txn.begin_ts, deleted),
            db_dir: data_dir.join(&db_name),
            db_name,
            table_metas: RwLock::new(HashMap::new()),
        })
    }

    pub fn replay(
        data_dir: &Path,
        db_name: String,
        txn_id: TxnId,
        begin_ts: TxnTimestamp,
        commit_ts: TxnTimestamp,
        deleted: bool,
    ) -> Arc<Self> {
        Arc::new(DbEntry {
            base: BaseEntry::replay(EntryKind::Database, txn_id, begin_ts, commit_ts, deleted),
            db_dir: data_dir.join(&db_name),
            db_name,
            table_metas: RwLock::new(HashMap::new()),
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

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    fn table_meta(&self, name: &str) -> Arc<TableMeta> {
        if let Some(meta) = self.table_metas.read().get(name) {
            return meta.clone();
        }
        let mut metas = self.table_metas.write();
        metas
            .entry(name.to_string())
            .or_insert_with(|| TableMeta::new(name))
            .clone()
    }

    /// Create a table version under this database. Returns the appended
    /// entries for the caller to commit.
    pub fn create_table(
        &self,
        table_name: &str,
        columns: Vec<Arc<ColumnDef>>,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Vec<Arc<TableEntry>>, Status> {
        self.table_meta(table_name)
            .create_entry(&self.db_dir, columns, conflict, txn)
    }

    /// Tombstone a table version.
    pub fn drop_table(
        &self,
        table_name: &str,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Option<Arc<TableEntry>>, Status> {
        self.table_meta(table_name)
            .drop_entry(&self.db_dir, conflict, txn)
    }

    /// Latest visible live table, or `TableNotFound`.
    pub fn get_table(
        &self,
        table_name: &str,
        read_ts: TxnTimestamp,
        txn_id: TxnId,
    ) -> Result<Arc<TableEntry>, Status> {
        match self.table_metas.read().get(table_name) {
            Some(meta) => meta.get(read_ts, txn_id),
            None => Err(Status::table_not_found(table_name)),
        }
    }

    /// Names of the tables visible at `read_ts`, sorted.
    pub fn list_table_names(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Vec<String> {
        let metas = self.table_metas.read();
        let mut names: Vec<String> = metas
            .values()
            .filter(|m| m.get(read_ts, txn_id).is_ok())
            .map(|m| m.table_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Tables visible at `read_ts`.
    pub fn visible_tables(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Vec<Arc<TableEntry>> {
        let metas = self.table_metas.read();
        metas
            .values()
            .filter_map(|m| m.get(read_ts, txn_id).ok())
            .collect()
    }

    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let mut doc = json!({
            "db_name": self.db_name,
            "txn_id": self.base.txn_id,
            "begin_ts": self.base.begin_ts,
            "commit_ts": self.base.commit_ts(),
            "deleted": self.base.deleted,
        });
        if self.base.deleted {
            return doc;
        }
        let metas = self.table_metas.read();
        doc["table_metas"] = metas
            .values()
            .map(|m| m.serialize(max_commit_ts))
            .collect();
        doc
    }

    pub fn deserialize(value: &serde_json::Value, data_dir: &Path) -> Result<Arc<Self>, Status> {
        let malformed = || Status::syntax_error("malformed database entry");
        let db_name = value["db_name"].as_str().ok_or_else(malformed)?;
        let entry = DbEntry::replay(
            data_dir,
            db_name.to_string(),
            value["txn_id"].as_u64().ok_or_else(malformed)?,
            value["begin_ts"].as_u64().ok_or_else(malformed)?,
            value["commit_ts"].as_u64().ok_or_else(malformed)?,
            value["deleted"].as_bool().ok_or_else(malformed)?,
        );
        if let Some(metas) = value["table_metas"].as_array() {
            let mut table_metas = entry.table_metas.write();
            for meta_json in metas {
                let table_name = meta_json["table_name"]
                    .as_str()
                    .ok_or_else(malformed)?
                    .to_string();
                let meta = TableMeta::new(table_name.clone());
                if let Some(entries) = meta_json["entries"].as_array() {
                    for entry_json in entries {
                        meta.push_replay(TableEntry::deserialize(entry_json, &entry.db_dir)?);
                    }
                }
                table_metas.insert(table_name, meta);
            }
        }
        Ok(entry)
    }
}

/// Name→history mapping for databases.
pub struct DbMeta {
    pub db_name: String,
    entries: RwLock<Vec<Arc<DbEntry>>>,
}

impl DbMeta {
    pub fn new(db_name: impl Into<String>) -> Arc<Self> {
        Arc::new(DbMeta {
            db_name: db_name.into(),
            entries: RwLock::new(Vec::new()),
        })
    }

    fn latest_alive(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Option<Arc<DbEntry>> {
        let entries = self.entries.read();
        latest_visible(&entries, read_ts, txn_id, |e| &e.base).filter(|e| !e.deleted())
    }

    pub fn get(&self, read_ts: TxnTimestamp, txn_id: TxnId) -> Result<Arc<DbEntry>, Status> {
        self.latest_alive(read_ts, txn_id)
            .ok_or_else(|| Status::database_not_found(&self.db_name))
    }

    /// Append a new version, honoring the conflict policy. Returns every
    /// appended entry (a Replace also appends a tombstone) for the caller
    /// to commit; empty on an Ignore short-circuit.
    pub fn create_entry(
        &self,
        data_dir: &Path,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Vec<Arc<DbEntry>>, Status> {
        let mut appended = Vec::new();
        if self.latest_alive(txn.begin_ts, txn.txn_id).is_some() {
            match conflict {
                ConflictType::Ignore => return Ok(appended),
                ConflictType::Error => return Err(Status::duplicate_database(&self.db_name)),
                ConflictType::Replace => {
                    let tombstone = DbEntry::new(data_dir, self.db_name.clone(), txn, true);
                    self.entries.write().push(tombstone.clone());
                    appended.push(tombstone);
                }
            }
        }
        let entry = DbEntry::new(data_dir, self.db_name.clone(), txn, false);
        self.entries.write().push(entry.clone());
        appended.push(entry);
        Ok(appended)
    }

    pub fn drop_entry(
        &self,
        data_dir: &Path,
        conflict: ConflictType,
        txn: &Txn,
    ) -> Result<Option<Arc<DbEntry>>, Status> {
        match self.latest_alive(txn.begin_ts, txn.txn_id) {
            None => match conflict {
                ConflictType::Ignore => Ok(None),
                _ => Err(Status::database_not_found(&self.db_name)),
            },
            Some(_) => {
                let tombstone = DbEntry::new(data_dir, self.db_name.clone(), txn, true);
                self.entries.write().push(tombstone.clone());
                Ok(Some(tombstone))
            }
        }
    }

    pub fn push_replay(&self, entry: Arc<DbEntry>) {
        self.entries.write().push(entry);
    }

    pub fn serialize(&self, max_commit_ts: TxnTimestamp) -> serde_json::Value {
        let entries = self.entries.read();
        json!({
            "db_name": self.db_name,
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
