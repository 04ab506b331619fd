//! The engine facade.
//!
//! An [`EngineHandle`] is the object sessions talk to: every RPC verb maps
//! to one method here, each running as a short implicit transaction against
//! the catalog and returning a [`QueryResult`]. A minimal execution path
//! (projection scan, brute-force KNN, BM25 match over the in-memory
//! postings, score fusion) makes the operations exercisable end to end; the
//! full planner and physical operators are external collaborators.

use crate::catalog::database::DbEntry;
use crate::catalog::index_base::{IndexBase, IndexType};
use crate::catalog::table::TableEntry;
use crate::catalog::table_index::TableIndexEntry;
use crate::catalog::{Catalog, ConflictType};
use crate::config;
use crate::data_block::{ColumnVector, DataBlock};
use crate::expr::{
    ConstantExpr, EmbeddingQuery, InitParameter, KnnDistance, KnnExpr, MatchExpr, ParsedExpr,
    SearchExpr,
};
use crate::fulltext::{analyze, scorer};
use crate::search::distance;
use crate::search::fusion;
use crate::segment::SegmentEntry;
use crate::status::Status;
use crate::task::{run_build_workers, WorkerPool};
use crate::txn::{Txn, TxnIndexStore, TxnManager};
use crate::types::{
    ColumnDef, DataType, EmbeddingElementType, RowId, SegmentId, TxnTimestamp, Value,
};
use ordered_float::OrderedFloat;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Source file format for `Import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFileType {
    Csv,
    Json,
    Jsonl,
    Fvecs,
}

/// Options for `Import`.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub file_type: CopyFileType,
    pub delimiter: char,
}

/// One index to create: type, column, parameters.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub index_type: IndexType,
    pub column_name: String,
    pub parameters: Vec<InitParameter>,
}

/// One `SET column = expr` clause of an update.
#[derive(Debug, Clone)]
pub struct UpdateExpr {
    pub column_name: String,
    pub value: ParsedExpr,
}

/// Requested explain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainType {
    Analyze,
    Ast,
    Physical,
    Pipeline,
    UnOpt,
    Opt,
    Fragment,
}

impl ExplainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainType::Analyze => "ANALYZE",
            ExplainType::Ast => "AST",
            ExplainType::Physical => "PHYSICAL",
            ExplainType::Pipeline => "PIPELINE",
            ExplainType::UnOpt => "UNOPT",
            ExplainType::Opt => "OPT",
            ExplainType::Fragment => "FRAGMENT",
        }
    }
}

/// A rowset result: column definitions plus data blocks.
#[derive(Debug, Default)]
pub struct ResultTable {
    pub column_defs: Vec<Arc<ColumnDef>>,
    pub blocks: Vec<DataBlock>,
}

impl ResultTable {
    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(|b| b.row_count()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.column_defs.len()
    }
}

/// Outcome of one engine operation.
#[derive(Debug)]
pub struct QueryResult {
    pub status: Status,
    pub result_table: Option<ResultTable>,
}

impl QueryResult {
    pub fn ok() -> Self {
        QueryResult {
            status: Status::ok(),
            result_table: None,
        }
    }

    pub fn with_table(table: ResultTable) -> Self {
        QueryResult {
            status: Status::ok(),
            result_table: Some(table),
        }
    }

    pub fn error(status: Status) -> Self {
        QueryResult {
            status,
            result_table: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

impl From<Status> for QueryResult {
    fn from(status: Status) -> Self {
        if status.is_ok() {
            QueryResult::ok()
        } else {
            QueryResult::error(status)
        }
    }
}

/// The engine root: catalog, transaction manager, background workers.
pub struct EngineHandle {
    catalog: Catalog,
    txn_mgr: TxnManager,
    bg_pool: WorkerPool,
}

impl EngineHandle {
    /// Open the engine over `data_dir`: load the catalog checkpoint when
    /// one exists, resume the timestamp sequence past it, and make sure the
    /// `default` database exists.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Arc<Self>, Status> {
        let (catalog, max_ts) = Catalog::load(data_dir)?;
        let txn_mgr = TxnManager::new();
        while txn_mgr.read_ts() <= max_ts {
            txn_mgr.next_commit_ts();
        }
        let engine = Arc::new(EngineHandle {
            catalog,
            txn_mgr,
            bg_pool: WorkerPool::new(config::BACKGROUND_WORKERS),
        });

        let txn = engine.txn_mgr.begin();
        let appended = engine
            .catalog
            .create_database("default", ConflictType::Ignore, &txn)?;
        if !appended.is_empty() {
            let ts = engine.txn_mgr.next_commit_ts();
            for entry in appended {
                entry.commit(ts);
            }
        }
        Ok(engine)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Checkpoint the catalog at the current read timestamp.
    pub fn save_catalog(&self) -> Result<(), Status> {
        self.catalog.save(self.txn_mgr.read_ts())
    }

    fn db_at(&self, db_name: &str, txn: &Txn) -> Result<Arc<DbEntry>, Status> {
        self.catalog.get_database(db_name, txn.begin_ts, txn.txn_id)
    }

    fn table_at(&self, db_name: &str, table_name: &str, txn: &Txn) -> Result<Arc<TableEntry>, Status> {
        self.db_at(db_name, txn)?
            .get_table(table_name, txn.begin_ts, txn.txn_id)
    }

    // ── Database DDL ─────────────────────────────────────────────────

    pub fn create_database(&self, db_name: &str, conflict: ConflictType) -> QueryResult {
        if db_name.is_empty() {
            return QueryResult::error(Status::syntax_error("empty database name"));
        }
        let txn = self.txn_mgr.begin();
        match self.catalog.create_database(db_name, conflict, &txn) {
            Ok(appended) => {
                if !appended.is_empty() {
                    let ts = self.txn_mgr.next_commit_ts();
                    for entry in appended {
                        entry.commit(ts);
                    }
                }
                QueryResult::ok()
            }
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn drop_database(&self, db_name: &str, conflict: ConflictType) -> QueryResult {
        let txn = self.txn_mgr.begin();
        match self.catalog.drop_database(db_name, conflict, &txn) {
            Ok(Some(tombstone)) => {
                tombstone.commit(self.txn_mgr.next_commit_ts());
                QueryResult::ok()
            }
            Ok(None) => QueryResult::ok(),
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn list_databases(&self) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let names = self.catalog.list_databases(txn.begin_ts, txn.txn_id);
        QueryResult::with_table(ResultTable {
            column_defs: vec![Arc::new(ColumnDef::new(0, "database", DataType::Varchar))],
            blocks: vec![DataBlock::new(vec![ColumnVector::Varchar(names)])],
        })
    }

    pub fn show_database(&self, db_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let db = match self.db_at(db_name, &txn) {
            Ok(db) => db,
            Err(status) => return QueryResult::error(status),
        };
        let table_count = db.list_table_names(txn.begin_ts, txn.txn_id).len() as i64;
        QueryResult::with_table(ResultTable {
            column_defs: vec![
                Arc::new(ColumnDef::new(0, "database", DataType::Varchar)),
                Arc::new(ColumnDef::new(1, "store_dir", DataType::Varchar)),
                Arc::new(ColumnDef::new(2, "table_count", DataType::BigInt)),
            ],
            blocks: vec![DataBlock::new(vec![
                ColumnVector::Varchar(vec![db.db_name.clone()]),
                ColumnVector::Varchar(vec![db.db_dir().to_string_lossy().into_owned()]),
                ColumnVector::BigInt(vec![table_count]),
            ])],
        })
    }

    pub fn get_database(&self, db_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        match self.db_at(db_name, &txn) {
            Ok(_) => QueryResult::ok(),
            Err(status) => QueryResult::error(status),
        }
    }

    // ── Table DDL ────────────────────────────────────────────────────

    pub fn create_table(
        &self,
        db_name: &str,
        table_name: &str,
        columns: Vec<ColumnDef>,
        conflict: ConflictType,
    ) -> QueryResult {
        if columns.is_empty() {
            return QueryResult::error(Status::syntax_error("table without columns"));
        }
        let txn = self.txn_mgr.begin();
        let db = match self.db_at(db_name, &txn) {
            Ok(db) => db,
            Err(status) => return QueryResult::error(status),
        };
        let columns = columns.into_iter().map(Arc::new).collect();
        match db.create_table(table_name, columns, conflict, &txn) {
            Ok(appended) => {
                if !appended.is_empty() {
                    let ts = self.txn_mgr.next_commit_ts();
                    for entry in appended {
                        entry.commit(ts);
                    }
                }
                QueryResult::ok()
            }
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn drop_table(&self, db_name: &str, table_name: &str, conflict: ConflictType) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let db = match self.db_at(db_name, &txn) {
            Ok(db) => db,
            Err(status) => return QueryResult::error(status),
        };
        match db.drop_table(table_name, conflict, &txn) {
            Ok(Some(tombstone)) => {
                tombstone.commit(self.txn_mgr.next_commit_ts());
                QueryResult::ok()
            }
            Ok(None) => QueryResult::ok(),
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn list_tables(&self, db_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let db = match self.db_at(db_name, &txn) {
            Ok(db) => db,
            Err(status) => return QueryResult::error(status),
        };
        let names = db.list_table_names(txn.begin_ts, txn.txn_id);
        QueryResult::with_table(ResultTable {
            column_defs: vec![Arc::new(ColumnDef::new(0, "table", DataType::Varchar))],
            blocks: vec![DataBlock::new(vec![ColumnVector::Varchar(names)])],
        })
    }

    pub fn show_table(&self, db_name: &str, table_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        QueryResult::with_table(ResultTable {
            column_defs: vec![
                Arc::new(ColumnDef::new(0, "database", DataType::Varchar)),
                Arc::new(ColumnDef::new(1, "table", DataType::Varchar)),
                Arc::new(ColumnDef::new(2, "store_dir", DataType::Varchar)),
                Arc::new(ColumnDef::new(3, "column_count", DataType::BigInt)),
                Arc::new(ColumnDef::new(4, "segment_count", DataType::BigInt)),
                Arc::new(ColumnDef::new(5, "row_count", DataType::BigInt)),
            ],
            blocks: vec![DataBlock::new(vec![
                ColumnVector::Varchar(vec![db_name.to_string()]),
                ColumnVector::Varchar(vec![table.table_name.clone()]),
                ColumnVector::Varchar(vec![table.table_dir().to_string_lossy().into_owned()]),
                ColumnVector::BigInt(vec![table.columns.len() as i64]),
                ColumnVector::BigInt(vec![table.segment_count() as i64]),
                ColumnVector::BigInt(vec![table.row_count() as i64]),
            ])],
        })
    }

    pub fn show_tables(&self, db_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let db = match self.db_at(db_name, &txn) {
            Ok(db) => db,
            Err(status) => return QueryResult::error(status),
        };
        let mut tables = db.visible_tables(txn.begin_ts, txn.txn_id);
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));

        let mut names = Vec::with_capacity(tables.len());
        let mut column_counts = Vec::with_capacity(tables.len());
        let mut segment_counts = Vec::with_capacity(tables.len());
        let mut row_counts = Vec::with_capacity(tables.len());
        for table in &tables {
            names.push(table.table_name.clone());
            column_counts.push(table.columns.len() as i64);
            segment_counts.push(table.segment_count() as i64);
            row_counts.push(table.row_count() as i64);
        }
        QueryResult::with_table(ResultTable {
            column_defs: vec![
                Arc::new(ColumnDef::new(0, "table", DataType::Varchar)),
                Arc::new(ColumnDef::new(1, "column_count", DataType::BigInt)),
                Arc::new(ColumnDef::new(2, "segment_count", DataType::BigInt)),
                Arc::new(ColumnDef::new(3, "row_count", DataType::BigInt)),
            ],
            blocks: vec![DataBlock::new(vec![
                ColumnVector::Varchar(names),
                ColumnVector::BigInt(column_counts),
                ColumnVector::BigInt(segment_counts),
                ColumnVector::BigInt(row_counts),
            ])],
        })
    }

    pub fn show_columns(&self, db_name: &str, table_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let mut names = Vec::with_capacity(table.columns.len());
        let mut types = Vec::with_capacity(table.columns.len());
        let mut constraints = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            names.push(column.name.clone());
            types.push(format!("{:?}", column.data_type));
            constraints.push(
                column
                    .constraints
                    .iter()
                    .map(|c| format!("{c:?}"))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        QueryResult::with_table(ResultTable {
            column_defs: vec![
                Arc::new(ColumnDef::new(0, "name", DataType::Varchar)),
                Arc::new(ColumnDef::new(1, "type", DataType::Varchar)),
                Arc::new(ColumnDef::new(2, "constraint", DataType::Varchar)),
            ],
            blocks: vec![DataBlock::new(vec![
                ColumnVector::Varchar(names),
                ColumnVector::Varchar(types),
                ColumnVector::Varchar(constraints),
            ])],
        })
    }

    pub fn get_table(&self, db_name: &str, table_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        match self.table_at(db_name, table_name, &txn) {
            Ok(_) => QueryResult::ok(),
            Err(status) => QueryResult::error(status),
        }
    }

    // ── Index DDL ────────────────────────────────────────────────────

    pub fn create_index(
        &self,
        db_name: &str,
        table_name: &str,
        index_name: &str,
        index_info: IndexInfo,
        conflict: ConflictType,
    ) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let index_base = Arc::new(IndexBase::new(
            index_name,
            index_info.index_type,
            vec![index_info.column_name],
            index_info.parameters,
        ));
        if let Err(status) = index_base.column_name() {
            return QueryResult::error(status);
        }

        let meta = table.get_or_create_index_meta(index_name);
        let created = match meta.create_table_index(index_base, conflict, &txn) {
            Ok(created) => created,
            Err(status) => return QueryResult::error(status),
        };
        let entry = match created.entry {
            Some(entry) => entry,
            // Ignore short-circuit: an index with this name already exists.
            None => return QueryResult::ok(),
        };

        match self.build_index(&table, &entry, &txn) {
            Ok(store) => {
                let ts = self.txn_mgr.next_commit_ts();
                if let Err(status) = entry.commit_create_index(&store, ts, false) {
                    return QueryResult::error(status);
                }
                if let Some(tombstone) = created.replaced_tombstone {
                    tombstone.commit(ts);
                }
                if let Some(replaced) = created.replaced_entry {
                    self.bg_pool.execute(move || replaced.cleanup());
                }
                QueryResult::ok()
            }
            Err(status) => {
                tracing::warn!("index build failed, rolling back: {status}");
                QueryResult::error(status)
            }
        }
    }

    /// Prepare per-segment entries, fan the cooperative build out over the
    /// worker threads, and roll back on any failure.
    fn build_index(
        &self,
        table: &Arc<TableEntry>,
        entry: &Arc<TableIndexEntry>,
        txn: &Txn,
    ) -> Result<TxnIndexStore, Status> {
        let block_index = table.block_index();
        let segment_entries =
            entry.create_index_prepare(&block_index, txn, true, false, true)?;

        let mut store = TxnIndexStore::new();
        let mut progress: HashMap<SegmentId, Arc<AtomicU64>> = HashMap::new();
        for segment_entry in &segment_entries {
            store.add(segment_entry.clone());
            progress.insert(segment_entry.segment_id, Arc::new(AtomicU64::new(0)));
        }

        let build = run_build_workers(config::INDEX_BUILD_WORKERS, |_| {
            entry.create_index_do(&progress)
        });
        if let Err(status) = build {
            entry.rollback_create_index(&store);
            return Err(status);
        }
        Ok(store)
    }

    pub fn drop_index(
        &self,
        db_name: &str,
        table_name: &str,
        index_name: &str,
        conflict: ConflictType,
    ) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let meta = match table.index_meta(index_name) {
            Some(meta) => meta,
            None => {
                return match conflict {
                    ConflictType::Ignore => QueryResult::ok(),
                    _ => QueryResult::error(Status::index_not_found(index_name)),
                }
            }
        };
        match meta.drop_table_index(conflict, &txn) {
            Ok(result) => {
                if let Some(tombstone) = result.tombstone {
                    tombstone.commit(self.txn_mgr.next_commit_ts());
                }
                if let Some(dropped) = result.dropped {
                    self.bg_pool.execute(move || dropped.cleanup());
                }
                QueryResult::ok()
            }
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn list_indexes(&self, db_name: &str, table_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let mut names: Vec<String> = table
            .index_metas_snapshot()
            .iter()
            .filter(|m| m.get(txn.begin_ts, txn.txn_id).is_ok())
            .map(|m| m.index_name.clone())
            .collect();
        names.sort();
        QueryResult::with_table(ResultTable {
            column_defs: vec![Arc::new(ColumnDef::new(0, "index", DataType::Varchar))],
            blocks: vec![DataBlock::new(vec![ColumnVector::Varchar(names)])],
        })
    }

    pub fn show_index(&self, db_name: &str, table_name: &str, index_name: &str) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let meta = match table.index_meta(index_name) {
            Some(meta) => meta,
            None => return QueryResult::error(Status::index_not_found(index_name)),
        };
        let entry = match meta.get(txn.begin_ts, txn.txn_id) {
            Ok(entry) => entry,
            Err(status) => return QueryResult::error(status),
        };
        let base = entry.index_base();
        let parameters = base
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let column_ids = base
            .column_names
            .iter()
            .filter_map(|n| table.column_def_by_name(n).map(|(id, _)| id.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        let values = vec![
            db_name.to_string(),
            table.table_name.clone(),
            base.index_name.clone(),
            base.index_type.as_str().to_string(),
            base.column_names.join(","),
            column_ids,
            parameters,
            entry.index_dir().to_string_lossy().into_owned(),
            entry.index_by_segment_snapshot().len().to_string(),
        ];
        let names = vec![
            "database",
            "table",
            "index_name",
            "index_type",
            "index_column_names",
            "index_column_ids",
            "other_parameters",
            "store_dir",
            "segment_index_count",
        ];
        QueryResult::with_table(ResultTable {
            column_defs: names
                .iter()
                .enumerate()
                .map(|(i, n)| Arc::new(ColumnDef::new(i as i64, *n, DataType::Varchar)))
                .collect(),
            blocks: vec![DataBlock::new(
                values.into_iter().map(|v| ColumnVector::Varchar(vec![v])).collect(),
            )],
        })
    }

    // ── DML ──────────────────────────────────────────────────────────

    pub fn insert(
        &self,
        db_name: &str,
        table_name: &str,
        columns: Vec<String>,
        rows: Vec<Vec<ConstantExpr>>,
    ) -> QueryResult {
        if rows.is_empty() {
            return QueryResult::error(Status::insert_without_values());
        }
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };

        // Resolve the target column order; an empty list means table order.
        let column_order: Vec<usize> = if columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            if columns.len() != table.columns.len() {
                return QueryResult::error(Status::not_support(
                    "insert must provide every column",
                ));
            }
            let mut order = Vec::with_capacity(columns.len());
            for name in &columns {
                match table.column_def_by_name(name) {
                    Some((id, _)) => order.push(id),
                    None => {
                        return QueryResult::error(Status::syntax_error(format!(
                            "unknown column '{name}'"
                        )))
                    }
                }
            }
            order
        };

        let mut converted = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.len() != column_order.len() {
                return QueryResult::error(Status::column_count_mismatch(format!(
                    "expect: {}, actual: {}",
                    column_order.len(),
                    row.len()
                )));
            }
            let mut values = vec![Value::Null; table.columns.len()];
            for (expr, &column_id) in row.iter().zip(&column_order) {
                let column = &table.columns[column_id];
                match constant_to_value(expr, &column.data_type) {
                    Ok(value) => values[column_id] = value,
                    Err(status) => return QueryResult::error(status),
                }
            }
            converted.push(values);
        }

        let ts = self.txn_mgr.next_commit_ts();
        let touched = match table.append_rows(&converted, ts) {
            Ok(touched) => touched,
            Err(status) => return QueryResult::error(status),
        };

        if let Err(status) = self.refresh_fulltext_indexes(&table, &touched, &txn) {
            return QueryResult::error(status);
        }
        QueryResult::ok()
    }

    /// Feed freshly appended rows into every visible full-text index.
    fn refresh_fulltext_indexes(
        &self,
        table: &Arc<TableEntry>,
        touched: &[Arc<SegmentEntry>],
        txn: &Txn,
    ) -> Result<(), Status> {
        for meta in table.index_metas_snapshot() {
            let Ok(entry) = meta.get(txn.begin_ts, txn.txn_id) else {
                continue;
            };
            if entry.index_type() != IndexType::FullText {
                continue;
            }
            for segment in touched {
                let (segment_index, created) =
                    entry.get_or_create_segment(segment.segment_id, txn)?;
                segment_index.attach_segment(segment);
                if created {
                    segment_index.commit(self.txn_mgr.next_commit_ts());
                }
                if table.unsealed_segment_id() == Some(segment.segment_id) {
                    entry.set_last_segment(segment_index.clone());
                }
                segment_index.mem_index_commit()?;
            }
        }
        Ok(())
    }

    pub fn import(
        &self,
        db_name: &str,
        table_name: &str,
        file_path: &Path,
        options: ImportOptions,
    ) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let rows = match parse_import_file(file_path, &options, &table.columns) {
            Ok(rows) => rows,
            Err(status) => return QueryResult::error(status),
        };
        if rows.is_empty() {
            return QueryResult::ok();
        }
        self.insert(db_name, table_name, Vec::new(), rows)
    }

    pub fn delete(&self, db_name: &str, table_name: &str, filter: Option<&ParsedExpr>) -> QueryResult {
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };
        let ts = self.txn_mgr.next_commit_ts();
        for segment in table.segments_snapshot() {
            let row_count = segment.row_count();
            let result = segment.with_write(|data| -> Result<(), Status> {
                for row_offset in 0..row_count {
                    if !data.row_visible(row_offset, txn.begin_ts) {
                        continue;
                    }
                    let matched = match filter {
                        Some(expr) => eval_predicate(expr, &table.columns, data, row_offset)?,
                        None => true,
                    };
                    if matched {
                        data.mark_deleted(row_offset, ts);
                    }
                }
                Ok(())
            });
            if let Err(status) = result {
                return QueryResult::error(status);
            }
        }
        QueryResult::ok()
    }

    pub fn update(
        &self,
        db_name: &str,
        table_name: &str,
        filter: Option<&ParsedExpr>,
        updates: &[UpdateExpr],
    ) -> QueryResult {
        if updates.is_empty() {
            return QueryResult::error(Status::syntax_error("update without set clauses"));
        }
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };

        let mut resolved = Vec::with_capacity(updates.len());
        for update in updates {
            let Some((column_id, column)) = table.column_def_by_name(&update.column_name) else {
                return QueryResult::error(Status::syntax_error(format!(
                    "unknown column '{}'",
                    update.column_name
                )));
            };
            let ParsedExpr::Constant(constant) = &update.value else {
                return QueryResult::error(Status::not_support(
                    "update expressions must be constants",
                ));
            };
            match constant_to_value(constant, &column.data_type) {
                Ok(value) => resolved.push((column_id, value)),
                Err(status) => return QueryResult::error(status),
            }
        }

        let ts = self.txn_mgr.next_commit_ts();
        for segment in table.segments_snapshot() {
            let row_count = segment.row_count();
            let result = segment.with_write(|data| -> Result<(), Status> {
                for row_offset in 0..row_count {
                    if !data.row_visible(row_offset, txn.begin_ts) {
                        continue;
                    }
                    let matched = match filter {
                        Some(expr) => eval_predicate(expr, &table.columns, data, row_offset)?,
                        None => true,
                    };
                    if matched {
                        for (column_id, value) in &resolved {
                            data.set_value(*column_id, row_offset, value.clone())?;
                        }
                        data.bump_commit_ts(row_offset, ts);
                    }
                }
                Ok(())
            });
            if let Err(status) = result {
                return QueryResult::error(status);
            }
        }
        QueryResult::ok()
    }

    // ── Query ────────────────────────────────────────────────────────

    pub fn search(
        &self,
        db_name: &str,
        table_name: &str,
        search_expr: Option<&SearchExpr>,
        filter: Option<&ParsedExpr>,
        output_columns: &[ParsedExpr],
    ) -> QueryResult {
        if output_columns.is_empty() {
            return QueryResult::error(Status::empty_select_fields());
        }
        let txn = self.txn_mgr.begin();
        let table = match self.table_at(db_name, table_name, &txn) {
            Ok(table) => table,
            Err(status) => return QueryResult::error(status),
        };

        let rows = match self.collect_rows(&table, search_expr, filter, &txn) {
            Ok(rows) => rows,
            Err(status) => return QueryResult::error(status),
        };

        match project_rows(&table, &rows, output_columns) {
            Ok(result_table) => QueryResult::with_table(result_table),
            Err(status) => QueryResult::error(status),
        }
    }

    pub fn explain(
        &self,
        db_name: &str,
        table_name: &str,
        explain_type: ExplainType,
        search_expr: Option<&SearchExpr>,
        filter: Option<&ParsedExpr>,
        output_columns: &[ParsedExpr],
    ) -> QueryResult {
        if output_columns.is_empty() {
            return QueryResult::error(Status::empty_select_fields());
        }
        let txn = self.txn_mgr.begin();
        if let Err(status) = self.table_at(db_name, table_name, &txn) {
            return QueryResult::error(status);
        }
        let mut lines = vec![format!("EXPLAIN {}", explain_type.as_str())];
        lines.push(format!("PROJECT ({} expressions)", output_columns.len()));
        if let Some(search) = search_expr {
            for expr in search.exprs() {
                match expr {
                    ParsedExpr::Knn(knn) => lines.push(format!(
                        "KNN SCAN column={} metric={:?} topn={}",
                        knn.column.names.join("."),
                        knn.distance,
                        knn.topn
                    )),
                    ParsedExpr::Match(m) => {
                        lines.push(format!("MATCH fields={} text={}", m.fields, m.matching_text))
                    }
                    ParsedExpr::Fusion(f) => lines.push(format!("FUSION method={}", f.method)),
                    _ => {}
                }
            }
        }
        if filter.is_some() {
            lines.push("FILTER".to_string());
        }
        lines.push(format!("TABLE SCAN {db_name}.{table_name}"));
        QueryResult::with_table(ResultTable {
            column_defs: vec![Arc::new(ColumnDef::new(0, "plan", DataType::Varchar))],
            blocks: vec![DataBlock::new(vec![ColumnVector::Varchar(lines)])],
        })
    }

    pub fn show_variable(&self, variable_name: &str) -> QueryResult {
        let value = match variable_name {
            "version" => env!("CARGO_PKG_VERSION").to_string(),
            "read_ts" => self.txn_mgr.read_ts().to_string(),
            other => {
                return QueryResult::error(Status::invalid_parameter_value(
                    "variable_name",
                    other,
                    "unknown variable",
                ))
            }
        };
        QueryResult::with_table(ResultTable {
            column_defs: vec![Arc::new(ColumnDef::new(0, "value", DataType::Varchar))],
            blocks: vec![DataBlock::new(vec![ColumnVector::Varchar(vec![value])])],
        })
    }

    /// The ranked (or scan-ordered) row ids a query touches.
    fn collect_rows(
        &self,
        table: &Arc<TableEntry>,
        search_expr: Option<&SearchExpr>,
        filter: Option<&ParsedExpr>,
        txn: &Txn,
    ) -> Result<Vec<RowId>, Status> {
        let candidates: Vec<RowId> = match search_expr {
            Some(search) => {
                let mut inputs = Vec::new();
                for expr in search.inputs() {
                    match expr {
                        ParsedExpr::Knn(knn) => {
                            inputs.push(self.knn_scan(table, knn, txn.begin_ts)?)
                        }
                        ParsedExpr::Match(m) => {
                            inputs.push(self.match_scan(table, m, txn)?)
                        }
                        _ => return Err(Status::invalid_parsed_expr_type()),
                    }
                }
                let ranked: Vec<(RowId, f32)> = if let Some(fusion_expr) = search.fusion() {
                    let rank_constant = fusion_expr
                        .option("rank_constant")
                        .and_then(|v| v.parse().ok());
                    let weight = fusion_expr.option("weight").and_then(|v| v.parse().ok());
                    let topn = fusion_expr
                        .option("topn")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(DEFAULT_MATCH_TOPN);
                    fusion::fuse(&inputs, &fusion_expr.method, rank_constant, weight, topn)
                } else if inputs.len() == 1 {
                    inputs.into_iter().next().expect("one input")
                } else if inputs.is_empty() {
                    Vec::new()
                } else {
                    return Err(Status::syntax_error(
                        "multiple search expressions require a fusion expression",
                    ));
                };
                ranked.into_iter().map(|(row_id, _)| row_id).collect()
            }
            None => {
                let mut rows = Vec::new();
                for segment in table.segments_snapshot() {
                    let data = segment.read();
                    for row_offset in 0..data.row_count {
                        if data.row_visible(row_offset, txn.begin_ts) {
                            rows.push(RowId::new(segment.segment_id, row_offset as u32));
                        }
                    }
                }
                rows
            }
        };

        let Some(filter) = filter else {
            return Ok(candidates);
        };
        let mut kept = Vec::with_capacity(candidates.len());
        for row_id in candidates {
            let Some(segment) = table.segment(row_id.segment_id()) else {
                continue;
            };
            let data = segment.read();
            if eval_predicate(filter, &table.columns, &data, row_id.segment_offset() as usize)? {
                kept.push(row_id);
            }
        }
        Ok(kept)
    }

    /// Brute-force KNN over the embedding column: top-n by metric distance.
    fn knn_scan(
        &self,
        table: &Arc<TableEntry>,
        knn: &KnnExpr,
        read_ts: TxnTimestamp,
    ) -> Result<Vec<(RowId, f32)>, Status> {
        if knn.topn == 0 {
            return Err(Status::invalid_parameter_value(
                "topn",
                "0",
                "topn should be greater than 0",
            ));
        }
        let column_name = knn
            .column
            .names
            .last()
            .ok_or_else(|| Status::syntax_error("knn expression without a column"))?;
        let Some((column_id, column)) = table.column_def_by_name(column_name) else {
            return Err(Status::syntax_error(format!("unknown column '{column_name}'")));
        };
        let DataType::Embedding { element, dimension } = &column.data_type else {
            return Err(Status::invalid_data_type());
        };
        if *element != EmbeddingElementType::Float32 {
            return Err(Status::invalid_embedding_data_type());
        }
        let query: &[f32] = match &knn.query {
            EmbeddingQuery::Float32(v) => v,
            _ => return Err(Status::invalid_embedding_data_type()),
        };
        if query.len() != *dimension {
            return Err(Status::invalid_parameter_value(
                "embedding_data",
                &query.len().to_string(),
                "query dimension must match the column",
            ));
        }
        let metric = match knn.distance {
            KnnDistance::L2 => distance::l2_distance,
            KnnDistance::Cosine => distance::cosine_distance,
            KnnDistance::InnerProduct => distance::inner_product_distance,
            KnnDistance::Hamming => {
                return Err(Status::not_support(
                    "hamming distance applies to bit embeddings",
                ))
            }
        };

        // Max-heap of size topn keyed on distance: the worst candidate sits
        // on top and is evicted first.
        let mut heap: BinaryHeap<(OrderedFloat<f32>, RowId)> =
            BinaryHeap::with_capacity(knn.topn + 1);
        for segment in table.segments_snapshot() {
            let data = segment.read();
            for row_offset in 0..data.row_count {
                if !data.row_visible(row_offset, read_ts) {
                    continue;
                }
                let block = &data.blocks[row_offset / config::BLOCK_CAPACITY];
                let Some(vector) = block.columns[column_id]
                    .embedding_f32_owned(row_offset % config::BLOCK_CAPACITY)
                else {
                    continue;
                };
                let d = metric(query, &vector);
                heap.push((OrderedFloat(d), RowId::new(segment.segment_id, row_offset as u32)));
                if heap.len() > knn.topn {
                    heap.pop();
                }
            }
        }
        let mut results: Vec<(RowId, f32)> = heap
            .into_iter()
            .map(|(d, row_id)| (row_id, -d.0))
            .collect();
        // Ascending distance == descending score.
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    /// BM25 match through the table's full-text index memtables.
    fn match_scan(
        &self,
        table: &Arc<TableEntry>,
        match_expr: &MatchExpr,
        txn: &Txn,
    ) -> Result<Vec<(RowId, f32)>, Status> {
        let column_name = match_expr.fields.trim();
        let entry = self
            .fulltext_index_for(table, column_name, txn)
            .ok_or_else(|| {
                Status::not_support(format!(
                    "match on '{column_name}' requires a full-text index"
                ))
            })?;

        let analyzed = analyze(&match_expr.matching_text);
        let terms: Vec<String> = analyzed.iter().map(|(t, _)| t.to_string()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let topn = match_expr
            .options_text
            .split(';')
            .find_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                (k.trim() == "topn").then(|| v.trim().parse().ok()).flatten()
            })
            .unwrap_or(DEFAULT_MATCH_TOPN);

        let mut results = Vec::new();
        for (segment_id, segment_index) in entry.index_by_segment_snapshot() {
            let Some(reader) = segment_index.fulltext_reader(&terms) else {
                continue;
            };
            let scored = scorer::bm25_search(
                reader.decoders,
                &reader.doc_lengths,
                reader.doc_count,
                topn,
            );
            // Postings may still reference rows deleted after indexing.
            let segment = table.segment(segment_id);
            for (doc_id, score) in scored {
                let visible = segment.as_ref().is_some_and(|s| {
                    let data = s.read();
                    (doc_id as usize) < data.row_count
                        && data.row_visible(doc_id as usize, txn.begin_ts)
                });
                if visible {
                    results.push((RowId::new(segment_id, doc_id), score));
                }
            }
        }
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(topn);
        Ok(results)
    }

    fn fulltext_index_for(
        &self,
        table: &Arc<TableEntry>,
        column_name: &str,
        txn: &Txn,
    ) -> Option<Arc<TableIndexEntry>> {
        for meta in table.index_metas_snapshot() {
            let Ok(entry) = meta.get(txn.begin_ts, txn.txn_id) else {
                continue;
            };
            if entry.index_type() == IndexType::FullText
                && entry
                    .index_base()
                    .column_names
                    .iter()
                    .any(|n| n == column_name)
            {
                return Some(entry);
            }
        }
        None
    }
}

/// Default result size for match and fusion when no `topn` option is given.
const DEFAULT_MATCH_TOPN: usize = 10;

/// Materialize the projection for `rows`.
fn project_rows(
    table: &Arc<TableEntry>,
    rows: &[RowId],
    output_columns: &[ParsedExpr],
) -> Result<ResultTable, Status> {
    // Resolve the projection list: `*` expands to every table column.
    let mut projected: Vec<(usize, Arc<ColumnDef>)> = Vec::new();
    for expr in output_columns {
        match expr {
            ParsedExpr::Column(column) if column.star => {
                for (id, def) in table.columns.iter().enumerate() {
                    projected.push((id, def.clone()));
                }
            }
            ParsedExpr::Column(column) => {
                let name = column
                    .names
                    .last()
                    .ok_or_else(|| Status::syntax_error("empty column reference"))?;
                let (id, def) = table
                    .column_def_by_name(name)
                    .ok_or_else(|| Status::syntax_error(format!("unknown column '{name}'")))?;
                projected.push((id, def));
            }
            _ => return Err(Status::not_support("only column projections are supported")),
        }
    }

    let mut columns: Vec<ColumnVector> = projected
        .iter()
        .map(|(_, def)| ColumnVector::for_type(&def.data_type))
        .collect();
    for row_id in rows {
        let Some(segment) = table.segment(row_id.segment_id()) else {
            continue;
        };
        let data = segment.read();
        for ((column_id, _), column) in projected.iter().zip(columns.iter_mut()) {
            column.push(data.get_value(*column_id, row_id.segment_offset() as usize))?;
        }
    }

    Ok(ResultTable {
        column_defs: projected
            .into_iter()
            .enumerate()
            .map(|(i, (_, def))| {
                Arc::new(ColumnDef::new(i as i64, def.name.clone(), def.data_type.clone()))
            })
            .collect(),
        blocks: vec![DataBlock::new(columns)],
    })
}

/// Convert a literal to a typed cell value.
pub fn constant_to_value(expr: &ConstantExpr, target: &DataType) -> Result<Value, Status> {
    let value = match expr {
        ConstantExpr::Null => Value::Null,
        ConstantExpr::Boolean(b) => Value::Boolean(*b),
        ConstantExpr::Int64(v) => Value::BigInt(*v),
        ConstantExpr::Double(v) => Value::Double(*v),
        ConstantExpr::Str(s) => Value::Varchar(s.clone()),
        ConstantExpr::IntegerArray(values) => {
            return integer_array_to_embedding(values, target)
        }
        ConstantExpr::DoubleArray(values) => return double_array_to_embedding(values, target),
    };
    value.cast_to(target)
}

fn integer_array_to_embedding(values: &[i64], target: &DataType) -> Result<Value, Status> {
    let DataType::Embedding { element, dimension } = target else {
        return Err(Status::invalid_constant_type());
    };
    if values.len() != *dimension {
        return Err(Status::column_count_mismatch(format!(
            "embedding dimension expect: {dimension}, actual: {}",
            values.len()
        )));
    }
    let mut bytes = Vec::new();
    match element {
        EmbeddingElementType::Int8 => {
            for v in values {
                bytes.push(*v as i8 as u8);
            }
        }
        EmbeddingElementType::Int16 => {
            for v in values {
                bytes.extend_from_slice(&(*v as i16).to_le_bytes());
            }
        }
        EmbeddingElementType::Int32 => {
            for v in values {
                bytes.extend_from_slice(&(*v as i32).to_le_bytes());
            }
        }
        EmbeddingElementType::Int64 => {
            for v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        EmbeddingElementType::Float32 => {
            for v in values {
                bytes.extend_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        EmbeddingElementType::Float64 => {
            for v in values {
                bytes.extend_from_slice(&(*v as f64).to_le_bytes());
            }
        }
        EmbeddingElementType::Bit => return Err(Status::invalid_embedding_data_type()),
    }
    Ok(Value::Embedding(bytes))
}

fn double_array_to_embedding(values: &[f64], target: &DataType) -> Result<Value, Status> {
    let DataType::Embedding { element, dimension } = target else {
        return Err(Status::invalid_constant_type());
    };
    if values.len() != *dimension {
        return Err(Status::column_count_mismatch(format!(
            "embedding dimension expect: {dimension}, actual: {}",
            values.len()
        )));
    }
    let mut bytes = Vec::new();
    match element {
        EmbeddingElementType::Float32 => {
            for v in values {
                bytes.extend_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        EmbeddingElementType::Float64 => {
            for v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        _ => return Err(Status::invalid_embedding_data_type()),
    }
    Ok(Value::Embedding(bytes))
}

/// Evaluate a scalar predicate over one row. Supports comparisons between a
/// column and a constant plus `and` / `or` / `not`.
fn eval_predicate(
    expr: &ParsedExpr,
    columns: &[Arc<ColumnDef>],
    data: &crate::segment::SegmentData,
    row_offset: usize,
) -> Result<bool, Status> {
    match expr {
        ParsedExpr::Function(function) => {
            let name = function.name.to_lowercase();
            match name.as_str() {
                "and" | "or" => {
                    if function.arguments.len() != 2 {
                        return Err(Status::syntax_error(format!("{name} takes two arguments")));
                    }
                    let lhs = eval_predicate(&function.arguments[0], columns, data, row_offset)?;
                    let rhs = eval_predicate(&function.arguments[1], columns, data, row_offset)?;
                    Ok(if name == "and" { lhs && rhs } else { lhs || rhs })
                }
                "not" => {
                    if function.arguments.len() != 1 {
                        return Err(Status::syntax_error("not takes one argument"));
                    }
                    Ok(!eval_predicate(&function.arguments[0], columns, data, row_offset)?)
                }
                "=" | "==" | "!=" | "<>" | "<" | "<=" | ">" | ">=" => {
                    if function.arguments.len() != 2 {
                        return Err(Status::syntax_error("comparison takes two arguments"));
                    }
                    let lhs = eval_scalar(&function.arguments[0], columns, data, row_offset)?;
                    let rhs = eval_scalar(&function.arguments[1], columns, data, row_offset)?;
                    compare_values(&name, &lhs, &rhs)
                }
                other => Err(Status::not_support(format!("function '{other}'"))),
            }
        }
        _ => Err(Status::invalid_parsed_expr_type()),
    }
}

fn eval_scalar(
    expr: &ParsedExpr,
    columns: &[Arc<ColumnDef>],
    data: &crate::segment::SegmentData,
    row_offset: usize,
) -> Result<Value, Status> {
    match expr {
        ParsedExpr::Column(column) => {
            let name = column
                .names
                .last()
                .ok_or_else(|| Status::syntax_error("empty column reference"))?;
            let column_id = columns
                .iter()
                .position(|c| &c.name == name)
                .ok_or_else(|| Status::syntax_error(format!("unknown column '{name}'")))?;
            Ok(data.get_value(column_id, row_offset))
        }
        ParsedExpr::Constant(constant) => Ok(match constant {
            ConstantExpr::Null => Value::Null,
            ConstantExpr::Boolean(b) => Value::Boolean(*b),
            ConstantExpr::Int64(v) => Value::BigInt(*v),
            ConstantExpr::Double(v) => Value::Double(*v),
            ConstantExpr::Str(s) => Value::Varchar(s.clone()),
            _ => return Err(Status::invalid_constant_type()),
        }),
        _ => Err(Status::invalid_parsed_expr_type()),
    }
}

fn compare_values(op: &str, lhs: &Value, rhs: &Value) -> Result<bool, Status> {
    let ordering = match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (lhs, rhs) {
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return Err(Status::invalid_data_type());
    };
    Ok(match op {
        "=" | "==" => ordering.is_eq(),
        "!=" | "<>" => ordering.is_ne(),
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        _ => return Err(Status::not_support(format!("comparison '{op}'"))),
    })
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::TinyInt(v) => Some(*v as f64),
        Value::SmallInt(v) => Some(*v as f64),
        Value::Integer(v) => Some(*v as f64),
        Value::BigInt(v) => Some(*v as f64),
        Value::HugeInt(v) => Some(*v as f64),
        Value::Float(v) => Some(*v as f64),
        Value::Double(v) => Some(*v),
        _ => None,
    }
}

/// Parse an import file into literal rows.
fn parse_import_file(
    path: &Path,
    options: &ImportOptions,
    columns: &[Arc<ColumnDef>],
) -> Result<Vec<Vec<ConstantExpr>>, Status> {
    match options.file_type {
        CopyFileType::Csv => parse_csv(path, options.delimiter, columns),
        CopyFileType::Json => {
            let bytes = std::fs::read(path).map_err(|e| Status::io_error(&e))?;
            let doc: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| Status::import_file_format_error(format!("malformed JSON: {e}")))?;
            let rows = doc
                .as_array()
                .ok_or_else(|| Status::import_file_format_error("expected a JSON array"))?;
            rows.iter().map(|row| json_row(row, columns)).collect()
        }
        CopyFileType::Jsonl => {
            let text = std::fs::read_to_string(path).map_err(|e| Status::io_error(&e))?;
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| {
                    let doc: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                        Status::import_file_format_error(format!("malformed JSONL: {e}"))
                    })?;
                    json_row(&doc, columns)
                })
                .collect()
        }
        CopyFileType::Fvecs => parse_fvecs(path, columns),
    }
}

fn parse_csv(
    path: &Path,
    delimiter: char,
    columns: &[Arc<ColumnDef>],
) -> Result<Vec<Vec<ConstantExpr>>, Status> {
    let text = std::fs::read_to_string(path).map_err(|e| Status::io_error(&e))?;
    let mut rows = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != columns.len() {
            return Err(Status::column_count_mismatch(format!(
                "expect: {}, actual: {}",
                columns.len(),
                fields.len()
            )));
        }
        let mut row = Vec::with_capacity(fields.len());
        for (field, column) in fields.iter().zip(columns) {
            row.push(csv_field(field.trim(), &column.data_type)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn csv_field(field: &str, data_type: &DataType) -> Result<ConstantExpr, Status> {
    match data_type {
        DataType::Boolean => field
            .parse::<bool>()
            .map(ConstantExpr::Boolean)
            .map_err(|_| Status::import_file_format_error(format!("bad boolean '{field}'"))),
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt
        | DataType::HugeInt => field
            .parse::<i64>()
            .map(ConstantExpr::Int64)
            .map_err(|_| Status::import_file_format_error(format!("bad integer '{field}'"))),
        DataType::Float | DataType::Double | DataType::Decimal => field
            .parse::<f64>()
            .map(ConstantExpr::Double)
            .map_err(|_| Status::import_file_format_error(format!("bad number '{field}'"))),
        DataType::Varchar => Ok(ConstantExpr::Str(field.to_string())),
        DataType::Embedding { .. } => Err(Status::not_support(
            "embedding columns cannot be imported from CSV",
        )),
        DataType::RowId => Err(Status::invalid_data_type()),
    }
}

fn json_row(
    doc: &serde_json::Value,
    columns: &[Arc<ColumnDef>],
) -> Result<Vec<ConstantExpr>, Status> {
    let object = doc
        .as_object()
        .ok_or_else(|| Status::import_file_format_error("expected a JSON object per row"))?;
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        let field = object.get(&column.name).ok_or_else(|| {
            Status::import_file_format_error(format!("missing field '{}'", column.name))
        })?;
        row.push(json_field(field, &column.data_type)?);
    }
    Ok(row)
}

fn json_field(field: &serde_json::Value, data_type: &DataType) -> Result<ConstantExpr, Status> {
    match data_type {
        DataType::Boolean => field
            .as_bool()
            .map(ConstantExpr::Boolean)
            .ok_or_else(|| Status::import_file_format_error("bad boolean")),
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt
        | DataType::HugeInt => field
            .as_i64()
            .map(ConstantExpr::Int64)
            .ok_or_else(|| Status::import_file_format_error("bad integer")),
        DataType::Float | DataType::Double | DataType::Decimal => field
            .as_f64()
            .map(ConstantExpr::Double)
            .ok_or_else(|| Status::import_file_format_error("bad number")),
        DataType::Varchar => field
            .as_str()
            .map(|s| ConstantExpr::Str(s.to_string()))
            .ok_or_else(|| Status::import_file_format_error("bad string")),
        DataType::Embedding { .. } => {
            let values = field
                .as_array()
                .ok_or_else(|| Status::import_file_format_error("bad embedding"))?;
            let doubles: Option<Vec<f64>> = values.iter().map(|v| v.as_f64()).collect();
            doubles
                .map(ConstantExpr::DoubleArray)
                .ok_or_else(|| Status::import_file_format_error("bad embedding element"))
        }
        DataType::RowId => Err(Status::invalid_data_type()),
    }
}

/// fvecs: repeated `[dimension i32 LE][dimension * f32 LE]` records; the
/// table must have exactly one `f32` embedding column.
fn parse_fvecs(path: &Path, columns: &[Arc<ColumnDef>]) -> Result<Vec<Vec<ConstantExpr>>, Status> {
    if columns.len() != 1 {
        return Err(Status::import_file_format_error(
            "fvecs import requires a single embedding column",
        ));
    }
    let DataType::Embedding { element, dimension } = &columns[0].data_type else {
        return Err(Status::import_file_format_error(
            "fvecs import requires an embedding column",
        ));
    };
    if *element != EmbeddingElementType::Float32 {
        return Err(Status::invalid_embedding_data_type());
    }
    let bytes = std::fs::read(path).map_err(|e| Status::io_error(&e))?;
    let mut rows = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= bytes.len() {
        let dim = i32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        offset += 4;
        if dim != *dimension {
            return Err(Status::import_file_format_error(format!(
                "fvecs dimension {dim} does not match column dimension {dimension}"
            )));
        }
        if offset + dim * 4 > bytes.len() {
            return Err(Status::import_file_format_error("truncated fvecs record"));
        }
        let mut values = Vec::with_capacity(dim);
        for i in 0..dim {
            let p = offset + i * 4;
            values.push(
                f32::from_le_bytes([bytes[p], bytes[p + 1], bytes[p + 2], bytes[p + 3]]) as f64,
            );
        }
        offset += dim * 4;
        rows.push(vec![ConstantExpr::DoubleArray(values)]);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::status::ErrorCode;

    fn engine() -> (Arc<EngineHandle>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let engine = EngineHandle::open(tmp.path()).unwrap();
        (engine, tmp)
    }

    fn int_float4_table(engine: &EngineHandle, name: &str) {
        let result = engine.create_table(
            "default",
            name,
            vec![
                ColumnDef::new(0, "a", DataType::Integer),
                ColumnDef::new(
                    1,
                    "v",
                    DataType::Embedding {
                        element: EmbeddingElementType::Float32,
                        dimension: 4,
                    },
                ),
            ],
            ConflictType::Error,
        );
        assert!(result.is_ok(), "{:?}", result.status);
    }

    fn insert_two_rows(engine: &EngineHandle, table: &str) {
        let result = engine.insert(
            "default",
            table,
            vec!["a".into(), "v".into()],
            vec![
                vec![
                    ConstantExpr::Int64(1),
                    ConstantExpr::DoubleArray(vec![1.0, 0.0, 0.0, 0.0]),
                ],
                vec![
                    ConstantExpr::Int64(2),
                    ConstantExpr::DoubleArray(vec![0.0, 1.0, 0.0, 0.0]),
                ],
            ],
        );
        assert!(result.is_ok(), "{:?}", result.status);
    }

    fn star() -> ParsedExpr {
        ParsedExpr::Column(ColumnExpr {
            names: Vec::new(),
            star: true,
        })
    }

    #[test]
    fn test_default_database_exists() {
        let (engine, _tmp) = engine();
        let result = engine.list_databases();
        let table = result.result_table.unwrap();
        match &table.blocks[0].columns[0] {
            ColumnVector::Varchar(names) => assert_eq!(names, &vec!["default".to_string()]),
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn test_create_database_conflicts() {
        let (engine, _tmp) = engine();
        assert!(engine.create_database("d", ConflictType::Ignore).is_ok());
        assert!(engine.create_database("d", ConflictType::Ignore).is_ok());
        let result = engine.create_database("d", ConflictType::Error);
        assert_eq!(result.status.code, ErrorCode::DuplicateDatabase);

        let listed = engine.list_databases().result_table.unwrap();
        match &listed.blocks[0].columns[0] {
            ColumnVector::Varchar(names) => {
                assert_eq!(names.iter().filter(|n| *n == "d").count(), 1);
            }
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn test_insert_then_select_star() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        insert_two_rows(&engine, "t");

        let result = engine.search("default", "t", None, None, &[star()]);
        assert!(result.is_ok(), "{:?}", result.status);
        let table = result.result_table.unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        match &table.blocks[0].columns[0] {
            ColumnVector::Integer(values) => assert_eq!(values, &vec![1, 2]),
            other => panic!("unexpected column {other:?}"),
        }
        match &table.blocks[0].columns[1] {
            ColumnVector::Embedding { data, .. } => assert_eq!(data.len(), 32),
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn test_knn_returns_nearest_row() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        insert_two_rows(&engine, "t");

        let knn = ParsedExpr::Knn(KnnExpr {
            column: ColumnExpr {
                names: vec!["v".into()],
                star: false,
            },
            query: EmbeddingQuery::Float32(vec![1.0, 0.0, 0.0, 0.0]),
            distance: KnnDistance::L2,
            topn: 1,
            opt_params: Vec::new(),
        });
        let search = SearchExpr::new(vec![knn]).unwrap();
        let result = engine.search("default", "t", Some(&search), None, &[star()]);
        assert!(result.is_ok(), "{:?}", result.status);
        let table = result.result_table.unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.blocks[0].get_value(0, 0), Value::Integer(1));
    }

    #[test]
    fn test_fulltext_match_after_insert() {
        let (engine, _tmp) = engine();
        let result = engine.create_table(
            "default",
            "docs",
            vec![
                ColumnDef::new(0, "id", DataType::Integer),
                ColumnDef::new(1, "body", DataType::Varchar),
            ],
            ConflictType::Error,
        );
        assert!(result.is_ok());
        let result = engine.create_index(
            "default",
            "docs",
            "ft",
            IndexInfo {
                index_type: IndexType::FullText,
                column_name: "body".into(),
                parameters: Vec::new(),
            },
            ConflictType::Error,
        );
        assert!(result.is_ok(), "{:?}", result.status);

        let result = engine.insert(
            "default",
            "docs",
            Vec::new(),
            vec![
                vec![
                    ConstantExpr::Int64(1),
                    ConstantExpr::Str("rust systems programming".into()),
                ],
                vec![
                    ConstantExpr::Int64(2),
                    ConstantExpr::Str("python scripting language".into()),
                ],
            ],
        );
        assert!(result.is_ok(), "{:?}", result.status);

        let m = ParsedExpr::Match(MatchExpr {
            fields: "body".into(),
            matching_text: "rust".into(),
            options_text: "topn=10".into(),
        });
        let search = SearchExpr::new(vec![m]).unwrap();
        let result = engine.search("default", "docs", Some(&search), None, &[star()]);
        assert!(result.is_ok(), "{:?}", result.status);
        let table = result.result_table.unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.blocks[0].get_value(0, 0), Value::Integer(1));
    }

    #[test]
    fn test_fusion_of_knn_and_match() {
        let (engine, _tmp) = engine();
        let result = engine.create_table(
            "default",
            "hybrid",
            vec![
                ColumnDef::new(0, "id", DataType::Integer),
                ColumnDef::new(1, "body", DataType::Varchar),
                ColumnDef::new(
                    2,
                    "v",
                    DataType::Embedding {
                        element: EmbeddingElementType::Float32,
                        dimension: 2,
                    },
                ),
            ],
            ConflictType::Error,
        );
        assert!(result.is_ok());
        assert!(engine
            .create_index(
                "default",
                "hybrid",
                "ft",
                IndexInfo {
                    index_type: IndexType::FullText,
                    column_name: "body".into(),
                    parameters: Vec::new(),
                },
                ConflictType::Error,
            )
            .is_ok());
        let result = engine.insert(
            "default",
            "hybrid",
            Vec::new(),
            vec![
                vec![
                    ConstantExpr::Int64(1),
                    ConstantExpr::Str("storage engine internals".into()),
                    ConstantExpr::DoubleArray(vec![1.0, 0.0]),
                ],
                vec![
                    ConstantExpr::Int64(2),
                    ConstantExpr::Str("query engine design".into()),
                    ConstantExpr::DoubleArray(vec![0.0, 1.0]),
                ],
            ],
        );
        assert!(result.is_ok(), "{:?}", result.status);

        let knn = ParsedExpr::Knn(KnnExpr {
            column: ColumnExpr {
                names: vec!["v".into()],
                star: false,
            },
            query: EmbeddingQuery::Float32(vec![1.0, 0.0]),
            distance: KnnDistance::Cosine,
            topn: 2,
            opt_params: Vec::new(),
        });
        let m = ParsedExpr::Match(MatchExpr {
            fields: "body".into(),
            matching_text: "engine".into(),
            options_text: String::new(),
        });
        let f = ParsedExpr::Fusion(crate::expr::FusionExpr {
            method: "rrf".into(),
            options_text: "rank_constant=60".into(),
        });
        let search = SearchExpr::new(vec![knn, m, f]).unwrap();
        let result = engine.search("default", "hybrid", Some(&search), None, &[star()]);
        assert!(result.is_ok(), "{:?}", result.status);
        let table = result.result_table.unwrap();
        assert_eq!(table.row_count(), 2);
        // Row 1 matches both modalities and must rank first.
        assert_eq!(table.blocks[0].get_value(0, 0), Value::Integer(1));
    }

    #[test]
    fn test_delete_with_filter() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        insert_two_rows(&engine, "t");

        let filter = ParsedExpr::Function(crate::expr::FunctionExpr {
            name: "=".into(),
            arguments: vec![
                ParsedExpr::Column(ColumnExpr {
                    names: vec!["a".into()],
                    star: false,
                }),
                ParsedExpr::Constant(ConstantExpr::Int64(1)),
            ],
        });
        assert!(engine.delete("default", "t", Some(&filter)).is_ok());

        let result = engine.search("default", "t", None, None, &[star()]);
        let table = result.result_table.unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.blocks[0].get_value(0, 0), Value::Integer(2));
    }

    #[test]
    fn test_update_with_filter() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        insert_two_rows(&engine, "t");

        let filter = ParsedExpr::Function(crate::expr::FunctionExpr {
            name: ">".into(),
            arguments: vec![
                ParsedExpr::Column(ColumnExpr {
                    names: vec!["a".into()],
                    star: false,
                }),
                ParsedExpr::Constant(ConstantExpr::Int64(1)),
            ],
        });
        let result = engine.update(
            "default",
            "t",
            Some(&filter),
            &[UpdateExpr {
                column_name: "a".into(),
                value: ParsedExpr::Constant(ConstantExpr::Int64(20)),
            }],
        );
        assert!(result.is_ok(), "{:?}", result.status);

        let result = engine.search("default", "t", None, None, &[star()]);
        let table = result.result_table.unwrap();
        match &table.blocks[0].columns[0] {
            ColumnVector::Integer(values) => assert_eq!(values, &vec![1, 20]),
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn test_vector_index_files_saved() {
        let (engine, tmp) = engine();
        int_float4_table(&engine, "t");
        insert_two_rows(&engine, "t");

        let result = engine.create_index(
            "default",
            "t",
            "ann",
            IndexInfo {
                index_type: IndexType::Hnsw,
                column_name: "v".into(),
                parameters: vec![InitParameter {
                    name: "m".into(),
                    value: "16".into(),
                }],
            },
            ConflictType::Error,
        );
        assert!(result.is_ok(), "{:?}", result.status);

        // One file per segment under <data>/<db>/<table>/<index_name>.
        let index_dir = tmp.path().join("default").join("t").join("ann");
        assert!(index_dir.join("0").exists());

        let shown = engine.show_index("default", "t", "ann");
        assert!(shown.is_ok());
    }

    #[test]
    fn test_catalog_checkpoint_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let engine = EngineHandle::open(tmp.path()).unwrap();
            int_float4_table(&engine, "t");
            engine.save_catalog().unwrap();
        }
        let engine = EngineHandle::open(tmp.path()).unwrap();
        let result = engine.show_table("default", "t");
        assert!(result.is_ok(), "{:?}", result.status);
    }

    #[test]
    fn test_empty_select_fields_rejected() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        let result = engine.search("default", "t", None, None, &[]);
        assert_eq!(result.status.code, ErrorCode::EmptySelectFields);
    }

    #[test]
    fn test_insert_without_values_rejected() {
        let (engine, _tmp) = engine();
        int_float4_table(&engine, "t");
        let result = engine.insert("default", "t", Vec::new(), Vec::new());
        assert_eq!(result.status.code, ErrorCode::InsertWithoutValues);
    }
}
