//! Request dispatch: session table, per-verb handlers, result encoding.
//!
//! Every handler follows the same shape: look up the session, convert the
//! wire enums and expression trees (failing before any engine call), invoke
//! the engine operation, and encode the outcome — a status pair for simple
//! verbs, column buffers plus column definitions for rowsets.

use crate::convert;
use crate::protocol::*;
use fusedb_core::data_block::ColumnVector;
use fusedb_core::engine::{EngineHandle, ImportOptions, QueryResult};
use fusedb_core::expr::ParsedExpr;
use fusedb_core::status::{ErrorCode, Status};
use fusedb_core::types::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide session table: id → engine handle.
pub struct SessionManager {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<EngineHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new session over `engine` and return its id.
    pub fn connect(&self, engine: Arc<EngineHandle>) -> u64 {
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().insert(session_id, engine);
        session_id
    }

    pub fn get(&self, session_id: u64) -> Result<Arc<EngineHandle>, Status> {
        self.sessions
            .lock()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Status::session_not_found(session_id))
    }

    /// Remove a session; `SessionNotFound` if it is already gone.
    pub fn disconnect(&self, session_id: u64) -> Status {
        match self.sessions.lock().remove(&session_id) {
            Some(_) => Status::ok(),
            None => Status::session_not_found(session_id),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state handed to every connection task.
pub struct ServerState {
    pub engine: Arc<EngineHandle>,
    pub sessions: SessionManager,
    pub temp_dir: PathBuf,
}

impl ServerState {
    pub fn new(engine: Arc<EngineHandle>, temp_dir: impl Into<PathBuf>) -> Self {
        ServerState {
            engine,
            sessions: SessionManager::new(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Upload target path: `<temp_dir>_<db>_<table>_<name>`.
    fn upload_path(&self, db_name: &str, table_name: &str, file_name: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}_{}_{}_{}",
            self.temp_dir.display(),
            db_name,
            table_name,
            file_name
        ))
    }
}

/// Fill the shared status fields of a response from a `Status`.
fn status_fields(status: &Status) -> (i64, Option<String>) {
    if !status.is_ok() {
        tracing::error!("[RPC ERROR]: {status}");
    }
    (status.code as i64, status.message.clone())
}

/// Encode a status-only outcome into a `CommonResponse`.
fn common_response(status: Status) -> CommonResponse {
    let (error_code, error_msg) = status_fields(&status);
    CommonResponse {
        error_code,
        error_msg,
        session_id: None,
    }
}

/// Dispatch one framed request; the reply reuses the request type code.
pub fn dispatch(state: &ServerState, msg_type: u32, payload: &[u8]) -> (u32, Vec<u8>) {
    let body = match msg_type {
        MSG_CONNECT => encode(handle_connect(state)),
        MSG_DISCONNECT => with_request(payload, |req| handle_disconnect(state, req)),
        MSG_CREATE_DATABASE => with_request(payload, |req| handle_create_database(state, req)),
        MSG_DROP_DATABASE => with_request(payload, |req| handle_drop_database(state, req)),
        MSG_LIST_DATABASE => with_request(payload, |req| handle_list_database(state, req)),
        MSG_SHOW_DATABASE => with_request(payload, |req| handle_show_database(state, req)),
        MSG_GET_DATABASE => with_request(payload, |req| handle_get_database(state, req)),
        MSG_CREATE_TABLE => with_request(payload, |req| handle_create_table(state, req)),
        MSG_DROP_TABLE => with_request(payload, |req| handle_drop_table(state, req)),
        MSG_LIST_TABLE => with_request(payload, |req| handle_list_table(state, req)),
        MSG_SHOW_TABLE => with_request(payload, |req| handle_show_table(state, req)),
        MSG_SHOW_TABLES => with_request(payload, |req| handle_show_tables(state, req)),
        MSG_SHOW_COLUMNS => with_request(payload, |req| handle_show_columns(state, req)),
        MSG_GET_TABLE => with_request(payload, |req| handle_get_table(state, req)),
        MSG_CREATE_INDEX => with_request(payload, |req| handle_create_index(state, req)),
        MSG_DROP_INDEX => with_request(payload, |req| handle_drop_index(state, req)),
        MSG_LIST_INDEX => with_request(payload, |req| handle_list_index(state, req)),
        MSG_SHOW_INDEX => with_request(payload, |req| handle_show_index(state, req)),
        MSG_INSERT => with_request(payload, |req| handle_insert(state, req)),
        MSG_IMPORT => with_request(payload, |req| handle_import(state, req)),
        MSG_UPLOAD_FILE_CHUNK => with_request(payload, |req| handle_upload_file_chunk(state, req)),
        MSG_DELETE => with_request(payload, |req| handle_delete(state, req)),
        MSG_UPDATE => with_request(payload, |req| handle_update(state, req)),
        MSG_SELECT => with_request(payload, |req| handle_select(state, req)),
        MSG_EXPLAIN => with_request(payload, |req| handle_explain(state, req)),
        MSG_SHOW_VARIABLE => with_request(payload, |req| handle_show_variable(state, req)),
        unknown => {
            tracing::warn!("unknown message type {unknown:#x}");
            encode(common_response(Status::not_support(format!(
                "unknown message type {unknown:#x}"
            ))))
        }
    };
    (msg_type, body)
}

/// Decode the request or answer with a syntax-error status.
fn with_request<R, T>(payload: &[u8], handler: impl FnOnce(R) -> T) -> Vec<u8>
where
    R: for<'de> serde::Deserialize<'de>,
    T: serde::Serialize,
{
    match decode_json::<R>(payload) {
        Ok(request) => encode(handler(request)),
        Err(e) => encode(common_response(Status::syntax_error(format!(
            "malformed request: {e}"
        )))),
    }
}

fn encode<T: serde::Serialize>(response: T) -> Vec<u8> {
    encode_json(&response).unwrap_or_else(|e| {
        tracing::error!("response encoding failed: {e}");
        br#"{"error_code":4001,"error_msg":"response encoding failed"}"#.to_vec()
    })
}

// ── Session verbs ────────────────────────────────────────────────────

fn handle_connect(state: &ServerState) -> CommonResponse {
    let session_id = state.sessions.connect(state.engine.clone());
    tracing::debug!(session_id, "connect");
    CommonResponse {
        error_code: ErrorCode::Ok as i64,
        error_msg: None,
        session_id: Some(session_id),
    }
}

fn handle_disconnect(state: &ServerState, request: CommonRequest) -> CommonResponse {
    let status = state.sessions.disconnect(request.session_id);
    tracing::debug!(session_id = request.session_id, ok = status.is_ok(), "disconnect");
    common_response(status)
}

// ── Database verbs ───────────────────────────────────────────────────

fn handle_create_database(state: &ServerState, request: CreateDatabaseRequest) -> CommonResponse {
    let conflict = match convert::create_conflict_from_wire(request.create_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(engine.create_database(&request.db_name, conflict).status),
        Err(status) => common_response(status),
    }
}

fn handle_drop_database(state: &ServerState, request: DropDatabaseRequest) -> CommonResponse {
    let conflict = match convert::drop_conflict_from_wire(request.drop_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(engine.drop_database(&request.db_name, conflict).status),
        Err(status) => common_response(status),
    }
}

fn handle_list_database(state: &ServerState, request: CommonRequest) -> ListDatabaseResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            return ListDatabaseResponse {
                error_code,
                error_msg,
                db_names: Vec::new(),
            };
        }
    };
    let result = engine.list_databases();
    let (error_code, error_msg) = status_fields(&result.status);
    ListDatabaseResponse {
        error_code,
        error_msg,
        db_names: varchar_column(&result, 0),
    }
}

fn handle_show_database(state: &ServerState, request: ShowDatabaseRequest) -> ShowDatabaseResponse {
    let outcome = state
        .sessions
        .get(request.session_id)
        .map(|engine| engine.show_database(&request.db_name));
    match outcome {
        Ok(result) if result.is_ok() => {
            let (error_code, error_msg) = status_fields(&result.status);
            let table = result.result_table.as_ref();
            ShowDatabaseResponse {
                error_code,
                error_msg,
                database_name: first_varchar(table, 0),
                store_dir: first_varchar(table, 1),
                table_count: first_bigint(table, 2),
            }
        }
        Ok(result) => {
            let (error_code, error_msg) = status_fields(&result.status);
            ShowDatabaseResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            ShowDatabaseResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
    }
}

fn handle_get_database(state: &ServerState, request: ShowDatabaseRequest) -> CommonResponse {
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(engine.get_database(&request.db_name).status),
        Err(status) => common_response(status),
    }
}

// ── Table verbs ──────────────────────────────────────────────────────

fn handle_create_table(state: &ServerState, request: CreateTableRequest) -> CommonResponse {
    let conflict = match convert::create_conflict_from_wire(request.create_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    let mut columns = Vec::with_capacity(request.column_defs.len());
    for wire_column in &request.column_defs {
        match convert::column_def_from_wire(wire_column) {
            Ok(column) => columns.push(column),
            Err(status) => return common_response(status),
        }
    }
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .create_table(&request.db_name, &request.table_name, columns, conflict)
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_drop_table(state: &ServerState, request: DropTableRequest) -> CommonResponse {
    let conflict = match convert::drop_conflict_from_wire(request.drop_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .drop_table(&request.db_name, &request.table_name, conflict)
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_list_table(state: &ServerState, request: ListTableRequest) -> ListTableResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            return ListTableResponse {
                error_code,
                error_msg,
                table_names: Vec::new(),
            };
        }
    };
    let result = engine.list_tables(&request.db_name);
    let (error_code, error_msg) = status_fields(&result.status);
    ListTableResponse {
        error_code,
        error_msg,
        table_names: varchar_column(&result, 0),
    }
}

fn handle_show_table(state: &ServerState, request: ShowTableRequest) -> ShowTableResponse {
    let outcome = state
        .sessions
        .get(request.session_id)
        .map(|engine| engine.show_table(&request.db_name, &request.table_name));
    match outcome {
        Ok(result) if result.is_ok() => {
            let (error_code, error_msg) = status_fields(&result.status);
            let table = result.result_table.as_ref();
            ShowTableResponse {
                error_code,
                error_msg,
                database_name: first_varchar(table, 0),
                table_name: first_varchar(table, 1),
                store_dir: first_varchar(table, 2),
                column_count: first_bigint(table, 3),
                segment_count: first_bigint(table, 4),
                row_count: first_bigint(table, 5),
            }
        }
        Ok(result) => {
            let (error_code, error_msg) = status_fields(&result.status);
            ShowTableResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            ShowTableResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
    }
}

fn handle_show_tables(state: &ServerState, request: ListTableRequest) -> SelectResponse {
    match state.sessions.get(request.session_id) {
        Ok(engine) => rowset_response(engine.show_tables(&request.db_name)),
        Err(status) => rowset_response(QueryResult::error(status)),
    }
}

fn handle_show_columns(state: &ServerState, request: ShowTableRequest) -> SelectResponse {
    match state.sessions.get(request.session_id) {
        Ok(engine) => rowset_response(engine.show_columns(&request.db_name, &request.table_name)),
        Err(status) => rowset_response(QueryResult::error(status)),
    }
}

fn handle_get_table(state: &ServerState, request: ShowTableRequest) -> CommonResponse {
    match state.sessions.get(request.session_id) {
        Ok(engine) => {
            common_response(engine.get_table(&request.db_name, &request.table_name).status)
        }
        Err(status) => common_response(status),
    }
}

// ── Index verbs ──────────────────────────────────────────────────────

fn handle_create_index(state: &ServerState, request: CreateIndexRequest) -> CommonResponse {
    let conflict = match convert::create_conflict_from_wire(request.create_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    // All conversions complete before the engine is touched.
    let mut index_infos = Vec::with_capacity(request.index_info_list.len());
    for wire_info in &request.index_info_list {
        match convert::index_info_from_wire(wire_info) {
            Ok(info) => index_infos.push(info),
            Err(status) => return common_response(status),
        }
    }
    let Some(index_info) = index_infos.into_iter().next() else {
        return common_response(Status::syntax_error("create index without index info"));
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .create_index(
                    &request.db_name,
                    &request.table_name,
                    &request.index_name,
                    index_info,
                    conflict,
                )
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_drop_index(state: &ServerState, request: DropIndexRequest) -> CommonResponse {
    let conflict = match convert::drop_conflict_from_wire(request.drop_option.conflict_type) {
        Ok(conflict) => conflict,
        Err(status) => return common_response(status),
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .drop_index(&request.db_name, &request.table_name, &request.index_name, conflict)
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_list_index(state: &ServerState, request: ListIndexRequest) -> ListIndexResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            return ListIndexResponse {
                error_code,
                error_msg,
                index_names: Vec::new(),
            };
        }
    };
    let result = engine.list_indexes(&request.db_name, &request.table_name);
    let (error_code, error_msg) = status_fields(&result.status);
    ListIndexResponse {
        error_code,
        error_msg,
        index_names: varchar_column(&result, 0),
    }
}

fn handle_show_index(state: &ServerState, request: ShowIndexRequest) -> ShowIndexResponse {
    let outcome = state
        .sessions
        .get(request.session_id)
        .map(|engine| engine.show_index(&request.db_name, &request.table_name, &request.index_name));
    match outcome {
        Ok(result) if result.is_ok() => {
            let (error_code, error_msg) = status_fields(&result.status);
            let table = result.result_table.as_ref();
            ShowIndexResponse {
                error_code,
                error_msg,
                db_name: first_varchar(table, 0),
                table_name: first_varchar(table, 1),
                index_name: first_varchar(table, 2),
                index_type: first_varchar(table, 3),
                index_column_names: first_varchar(table, 4),
                index_column_ids: first_varchar(table, 5),
                other_parameters: first_varchar(table, 6),
                store_dir: first_varchar(table, 7),
                segment_index_count: first_varchar(table, 8),
            }
        }
        Ok(result) => {
            let (error_code, error_msg) = status_fields(&result.status);
            ShowIndexResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
        Err(status) => {
            let (error_code, error_msg) = status_fields(&status);
            ShowIndexResponse {
                error_code,
                error_msg,
                ..Default::default()
            }
        }
    }
}

// ── DML verbs ────────────────────────────────────────────────────────

fn handle_insert(state: &ServerState, request: InsertRequest) -> CommonResponse {
    if request.fields.is_empty() {
        return common_response(Status::insert_without_values());
    }
    // Convert every literal row before touching the engine.
    let mut rows = Vec::with_capacity(request.fields.len());
    for field in &request.fields {
        let mut row = Vec::with_capacity(field.parse_exprs.len());
        for expr in &field.parse_exprs {
            let Some(constant) = &expr.constant_expr else {
                return common_response(Status::invalid_constant_type());
            };
            match convert::constant_from_wire(constant) {
                Ok(constant) => row.push(constant),
                Err(status) => return common_response(status),
            }
        }
        rows.push(row);
    }
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .insert(&request.db_name, &request.table_name, request.column_names, rows)
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_import(state: &ServerState, request: ImportRequest) -> CommonResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => return common_response(status),
    };
    let file_type = match convert::copy_file_type_from_wire(request.import_option.copy_file_type) {
        Ok(file_type) => file_type,
        Err(status) => return common_response(status),
    };
    let delimiter_string = &request.import_option.delimiter;
    if file_type == fusedb_core::engine::CopyFileType::Csv && delimiter_string.chars().count() != 1
    {
        return common_response(Status::syntax_error("CSV file delimiter isn't a char."));
    }
    let delimiter = delimiter_string.chars().next().unwrap_or(',');
    let path = state.upload_path(&request.db_name, &request.table_name, &request.file_name);
    common_response(
        engine
            .import(
                &request.db_name,
                &request.table_name,
                &path,
                ImportOptions {
                    file_type,
                    delimiter,
                },
            )
            .status,
    )
}

fn handle_upload_file_chunk(state: &ServerState, request: FileChunk) -> UploadResponse {
    if let Err(status) = state.sessions.get(request.session_id) {
        let (error_code, error_msg) = status_fields(&status);
        return UploadResponse {
            error_code,
            error_msg,
            can_skip: false,
        };
    }
    let path = state.upload_path(&request.db_name, &request.table_name, &request.file_name);

    let io_result = if request.index != 0 {
        append_chunk(&path, &request.data)
    } else {
        // Chunk 0 short-circuits when the finished file is already present.
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.len() as i64 == request.total_size => {
                tracing::debug!("upload {:?} can be skipped", path);
                return UploadResponse {
                    error_code: ErrorCode::Ok as i64,
                    error_msg: None,
                    can_skip: true,
                };
            }
            Ok(metadata) => {
                tracing::debug!(
                    "existing file size: {}, request total size: {}",
                    metadata.len(),
                    request.total_size
                );
                std::fs::remove_file(&path)
                    .and_then(|_| std::fs::write(&path, &request.data))
            }
            Err(_) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                std::fs::write(&path, &request.data)
            }
        }
    };

    match io_result {
        Ok(()) => {
            tracing::debug!("upload file: {:?}, chunk index: {}", path, request.index);
            UploadResponse {
                error_code: ErrorCode::Ok as i64,
                error_msg: None,
                can_skip: false,
            }
        }
        Err(e) => {
            let (error_code, error_msg) = status_fields(&Status::io_error(&e));
            UploadResponse {
                error_code,
                error_msg,
                can_skip: false,
            }
        }
    }
}

fn append_chunk(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(data)?;
    file.flush()
}

fn handle_delete(state: &ServerState, request: DeleteRequest) -> CommonResponse {
    let filter = match optional_expr(request.where_expr.as_ref()) {
        Ok(filter) => filter,
        Err(status) => return common_response(status),
    };
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .delete(&request.db_name, &request.table_name, filter.as_ref())
                .status,
        ),
        Err(status) => common_response(status),
    }
}

fn handle_update(state: &ServerState, request: UpdateRequest) -> CommonResponse {
    let filter = match optional_expr(request.where_expr.as_ref()) {
        Ok(filter) => filter,
        Err(status) => return common_response(status),
    };
    let mut updates = Vec::with_capacity(request.update_expr_array.len());
    for wire_update in &request.update_expr_array {
        match convert::update_expr_from_wire(wire_update) {
            Ok(update) => updates.push(update),
            Err(status) => return common_response(status),
        }
    }
    match state.sessions.get(request.session_id) {
        Ok(engine) => common_response(
            engine
                .update(&request.db_name, &request.table_name, filter.as_ref(), &updates)
                .status,
        ),
        Err(status) => common_response(status),
    }
}

// ── Query verbs ──────────────────────────────────────────────────────

fn handle_select(state: &ServerState, request: SelectRequest) -> SelectResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => return rowset_response(QueryResult::error(status)),
    };
    if request.select_list.is_empty() {
        return rowset_response(QueryResult::error(Status::empty_select_fields()));
    }
    let (output_columns, search_expr, filter) = match convert_query_exprs(&request.select_list, request.search_expr.as_ref(), request.where_expr.as_ref()) {
        Ok(converted) => converted,
        Err(status) => return rowset_response(QueryResult::error(status)),
    };
    rowset_response(engine.search(
        &request.db_name,
        &request.table_name,
        search_expr.as_ref(),
        filter.as_ref(),
        &output_columns,
    ))
}

fn handle_explain(state: &ServerState, request: ExplainRequest) -> SelectResponse {
    let engine = match state.sessions.get(request.session_id) {
        Ok(engine) => engine,
        Err(status) => return rowset_response(QueryResult::error(status)),
    };
    if request.select_list.is_empty() {
        return rowset_response(QueryResult::error(Status::empty_select_fields()));
    }
    let explain_type = match convert::explain_type_from_wire(request.explain_type) {
        Ok(explain_type) => explain_type,
        Err(status) => return rowset_response(QueryResult::error(status)),
    };
    let (output_columns, search_expr, filter) = match convert_query_exprs(&request.select_list, request.search_expr.as_ref(), request.where_expr.as_ref()) {
        Ok(converted) => converted,
        Err(status) => return rowset_response(QueryResult::error(status)),
    };
    rowset_response(engine.explain(
        &request.db_name,
        &request.table_name,
        explain_type,
        search_expr.as_ref(),
        filter.as_ref(),
        &output_columns,
    ))
}

fn handle_show_variable(state: &ServerState, request: ShowVariableRequest) -> SelectResponse {
    match state.sessions.get(request.session_id) {
        Ok(engine) => rowset_response(engine.show_variable(&request.variable_name)),
        Err(status) => rowset_response(QueryResult::error(status)),
    }
}

/// Convert the three expression groups of a query; any failure drops the
/// partially converted trees and nothing reaches the engine.
#[allow(clippy::type_complexity)]
fn convert_query_exprs(
    select_list: &[WireParsedExpr],
    search_expr: Option<&WireSearchExpr>,
    where_expr: Option<&WireParsedExpr>,
) -> Result<
    (
        Vec<ParsedExpr>,
        Option<fusedb_core::expr::SearchExpr>,
        Option<ParsedExpr>,
    ),
    Status,
> {
    let mut output_columns = Vec::with_capacity(select_list.len());
    for expr in select_list {
        output_columns.push(convert::parsed_expr_from_wire(expr)?);
    }
    let search_expr = search_expr
        .map(convert::search_expr_from_wire)
        .transpose()?;
    let filter = where_expr.map(convert::parsed_expr_from_wire).transpose()?;
    Ok((output_columns, search_expr, filter))
}

fn optional_expr(wire: Option<&WireParsedExpr>) -> Result<Option<ParsedExpr>, Status> {
    wire.map(convert::parsed_expr_from_wire).transpose()
}

// ── Result encoding ──────────────────────────────────────────────────

/// Encode a rowset result: one buffer per (column, block) pair plus the
/// column definitions.
fn rowset_response(result: QueryResult) -> SelectResponse {
    let (error_code, error_msg) = status_fields(&result.status);
    let mut response = SelectResponse {
        error_code,
        error_msg,
        column_defs: Vec::new(),
        column_fields: Vec::new(),
    };
    let Some(table) = result.result_table else {
        return response;
    };

    response.column_fields = table
        .column_defs
        .iter()
        .map(|def| WireColumnField {
            column_type: convert::column_type_to_wire(&def.data_type),
            column_vectors: Vec::new(),
        })
        .collect();
    for block in &table.blocks {
        for (column_idx, column) in block.columns.iter().enumerate() {
            response.column_fields[column_idx]
                .column_vectors
                .push(encode_column_vector(column));
        }
    }
    response.column_defs = table
        .column_defs
        .iter()
        .map(|def| convert::column_def_to_wire(def))
        .collect();
    response
}

/// Serialize one column vector into its wire buffer.
///
/// POD columns are contiguous little-endian buffers `size * row_count`
/// long; varchar rows carry a 4-byte little-endian length prefix; embedding
/// columns are the raw row-major payload.
fn encode_column_vector(column: &ColumnVector) -> Vec<u8> {
    match column {
        ColumnVector::Boolean(values) => values.iter().map(|&b| b as u8).collect(),
        ColumnVector::TinyInt(values) => values.iter().map(|&v| v as u8).collect(),
        ColumnVector::SmallInt(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::Integer(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::BigInt(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::HugeInt(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::Float(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::Double(values) => values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        ColumnVector::Varchar(values) => {
            let total: usize = values.iter().map(|s| 4 + s.len()).sum();
            let mut buffer = Vec::with_capacity(total);
            for value in values {
                buffer.extend_from_slice(&(value.len() as i32).to_le_bytes());
                buffer.extend_from_slice(value.as_bytes());
            }
            buffer
        }
        ColumnVector::Embedding { data, .. } => data.clone(),
        ColumnVector::RowId(values) => values
            .iter()
            .flat_map(|v| v.0.to_le_bytes())
            .collect(),
    }
}

/// First column of the first block as strings (list-shaped results).
fn varchar_column(result: &QueryResult, column: usize) -> Vec<String> {
    let Some(table) = &result.result_table else {
        return Vec::new();
    };
    let Some(block) = table.blocks.first() else {
        return Vec::new();
    };
    match block.columns.get(column) {
        Some(ColumnVector::Varchar(values)) => values.clone(),
        _ => Vec::new(),
    }
}

fn first_varchar(table: Option<&fusedb_core::engine::ResultTable>, column: usize) -> String {
    let Some(table) = table else {
        return String::new();
    };
    let Some(block) = table.blocks.first() else {
        return String::new();
    };
    if block.row_count() == 0 {
        return String::new();
    }
    match block.get_value(column, 0) {
        Value::Varchar(value) => value,
        other => format!("{other:?}"),
    }
}

fn first_bigint(table: Option<&fusedb_core::engine::ResultTable>, column: usize) -> i64 {
    let Some(table) = table else {
        return 0;
    };
    let Some(block) = table.blocks.first() else {
        return 0;
    };
    if block.row_count() == 0 {
        return 0;
    }
    match block.get_value(column, 0) {
        Value::BigInt(value) => value,
        _ => 0,
    }
}
