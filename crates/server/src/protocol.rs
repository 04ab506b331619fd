//! Binary wire protocol: framed messages over TCP.
//!
//! Every message is `[u32 msg_type BE][u32 payload_len BE][JSON payload]`.
//! Responses reuse the request's message type; connections process one
//! request at a time, so correlation is positional.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ── Message type constants ───────────────────────────────────────────

pub const MSG_CONNECT: u32 = 0x01;
pub const MSG_DISCONNECT: u32 = 0x02;

pub const MSG_CREATE_DATABASE: u32 = 0x10;
pub const MSG_DROP_DATABASE: u32 = 0x11;
pub const MSG_LIST_DATABASE: u32 = 0x12;
pub const MSG_SHOW_DATABASE: u32 = 0x13;
pub const MSG_GET_DATABASE: u32 = 0x14;

pub const MSG_CREATE_TABLE: u32 = 0x20;
pub const MSG_DROP_TABLE: u32 = 0x21;
pub const MSG_LIST_TABLE: u32 = 0x22;
pub const MSG_SHOW_TABLE: u32 = 0x23;
pub const MSG_SHOW_TABLES: u32 = 0x24;
pub const MSG_SHOW_COLUMNS: u32 = 0x25;
pub const MSG_GET_TABLE: u32 = 0x26;

pub const MSG_CREATE_INDEX: u32 = 0x30;
pub const MSG_DROP_INDEX: u32 = 0x31;
pub const MSG_LIST_INDEX: u32 = 0x32;
pub const MSG_SHOW_INDEX: u32 = 0x33;

pub const MSG_INSERT: u32 = 0x40;
pub const MSG_IMPORT: u32 = 0x41;
pub const MSG_UPLOAD_FILE_CHUNK: u32 = 0x42;
pub const MSG_DELETE: u32 = 0x43;
pub const MSG_UPDATE: u32 = 0x44;

pub const MSG_SELECT: u32 = 0x50;
pub const MSG_EXPLAIN: u32 = 0x51;
pub const MSG_SHOW_VARIABLE: u32 = 0x52;

/// Protocol version. Bump on breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum single message payload (64 MB safety limit).
const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

// ── Wire enum codes ──────────────────────────────────────────────────
//
// Raw integers on the wire; the dispatch layer converts them through
// dedicated functions that reject unknown values.

pub mod create_conflict {
    pub const IGNORE: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const REPLACE: i32 = 2;
}

pub mod drop_conflict {
    pub const IGNORE: i32 = 0;
    pub const ERROR: i32 = 1;
}

pub mod copy_file_type {
    pub const CSV: i32 = 0;
    pub const JSON: i32 = 1;
    pub const JSONL: i32 = 2;
    pub const FVECS: i32 = 3;
}

pub mod logic_type {
    pub const BOOLEAN: i32 = 0;
    pub const TINY_INT: i32 = 1;
    pub const SMALL_INT: i32 = 2;
    pub const INTEGER: i32 = 3;
    pub const BIG_INT: i32 = 4;
    pub const HUGE_INT: i32 = 5;
    pub const DECIMAL: i32 = 6;
    pub const FLOAT: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const VARCHAR: i32 = 9;
    pub const EMBEDDING: i32 = 10;
}

pub mod element_type {
    pub const BIT: i32 = 0;
    pub const INT8: i32 = 1;
    pub const INT16: i32 = 2;
    pub const INT32: i32 = 3;
    pub const INT64: i32 = 4;
    pub const FLOAT32: i32 = 5;
    pub const FLOAT64: i32 = 6;
}

pub mod constraint {
    pub const PRIMARY_KEY: i32 = 0;
    pub const NOT_NULL: i32 = 1;
    pub const NULL: i32 = 2;
    pub const UNIQUE: i32 = 3;
}

pub mod index_type {
    pub const IVF_FLAT: i32 = 0;
    pub const HNSW: i32 = 1;
    pub const FULL_TEXT: i32 = 2;
}

pub mod knn_distance {
    pub const L2: i32 = 0;
    pub const COSINE: i32 = 1;
    pub const INNER_PRODUCT: i32 = 2;
    pub const HAMMING: i32 = 3;
}

pub mod explain_type {
    pub const ANALYZE: i32 = 0;
    pub const AST: i32 = 1;
    pub const UN_OPT: i32 = 2;
    pub const OPT: i32 = 3;
    pub const PHYSICAL: i32 = 4;
    pub const PIPELINE: i32 = 5;
    pub const FRAGMENT: i32 = 6;
}

pub mod literal_type {
    pub const BOOLEAN: i32 = 0;
    pub const DOUBLE: i32 = 1;
    pub const STRING: i32 = 2;
    pub const INT64: i32 = 3;
    pub const NULL: i32 = 4;
    pub const INTEGER_ARRAY: i32 = 5;
    pub const DOUBLE_ARRAY: i32 = 6;
}

pub mod column_type {
    pub const BOOL: i32 = 0;
    pub const INT8: i32 = 1;
    pub const INT16: i32 = 2;
    pub const INT32: i32 = 3;
    pub const INT64: i32 = 4;
    pub const FLOAT32: i32 = 5;
    pub const FLOAT64: i32 = 6;
    pub const VARCHAR: i32 = 7;
    pub const EMBEDDING: i32 = 8;
    pub const ROW_ID: i32 = 9;
}

// ── Shared wire structures ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDataType {
    pub logic_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireColumnDef {
    pub id: i64,
    pub name: String,
    pub data_type: WireDataType,
    #[serde(default)]
    pub constraints: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireInitParameter {
    pub param_name: String,
    pub param_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireConstantExpr {
    pub literal_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i64_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f64_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i64_array_value: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f64_array_value: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireColumnExpr {
    #[serde(default)]
    pub column_name: Vec<String>,
    #[serde(default)]
    pub star: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionExpr {
    pub function_name: String,
    #[serde(default)]
    pub arguments: Vec<WireParsedExpr>,
}

/// Embedding payload; exactly one array should be set. `f32_array_value`
/// travels as JSON doubles and is converted into a fresh `f32` buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireEmbeddingData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i8_array_value: Option<Vec<i8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i16_array_value: Option<Vec<i16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i32_array_value: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i64_array_value: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f32_array_value: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f64_array_value: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireKnnExpr {
    pub column_expr: WireColumnExpr,
    pub embedding_data: WireEmbeddingData,
    pub embedding_data_type: i32,
    pub distance_type: i32,
    pub topn: i64,
    #[serde(default)]
    pub opt_params: Vec<WireInitParameter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireMatchExpr {
    pub fields: String,
    pub matching_text: String,
    #[serde(default)]
    pub options_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireFusionExpr {
    pub method: String,
    #[serde(default)]
    pub options_text: String,
}

/// Tagged wire expression: exactly one variant field should be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireParsedExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_expr: Option<WireColumnExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_expr: Option<WireConstantExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_expr: Option<Box<WireFunctionExpr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knn_expr: Option<WireKnnExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_expr: Option<WireMatchExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_expr: Option<WireFusionExpr>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireSearchExpr {
    #[serde(default)]
    pub knn_exprs: Vec<WireKnnExpr>,
    #[serde(default)]
    pub match_exprs: Vec<WireMatchExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_expr: Option<WireFusionExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireUpdateExpr {
    pub column_name: String,
    pub value: WireParsedExpr,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireCreateOption {
    pub conflict_type: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDropOption {
    pub conflict_type: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireImportOption {
    pub copy_file_type: i32,
    pub delimiter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireIndexInfo {
    pub index_type: i32,
    pub column_name: String,
    #[serde(default)]
    pub index_param_list: Vec<WireInitParameter>,
}

/// One row of literals for `Insert`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireField {
    #[serde(default)]
    pub parse_exprs: Vec<WireParsedExpr>,
}

/// One serialized result column: wire type plus one buffer per data block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireColumnField {
    pub column_type: i32,
    #[serde(default)]
    pub column_vectors: Vec<Vec<u8>>,
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonRequest {
    pub session_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseRequest {
    pub session_id: u64,
    pub db_name: String,
    pub create_option: WireCreateOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropDatabaseRequest {
    pub session_id: u64,
    pub db_name: String,
    pub drop_option: WireDropOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    #[serde(default)]
    pub column_defs: Vec<WireColumnDef>,
    pub create_option: WireCreateOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTableRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub drop_option: WireDropOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub index_name: String,
    #[serde(default)]
    pub index_info_list: Vec<WireIndexInfo>,
    pub create_option: WireCreateOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropIndexRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub index_name: String,
    pub drop_option: WireDropOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    #[serde(default)]
    pub column_names: Vec<String>,
    #[serde(default)]
    pub fields: Vec<WireField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub file_name: String,
    pub import_option: WireImportOption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunk {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub file_name: String,
    pub index: i64,
    #[serde(default)]
    pub data: Vec<u8>,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    #[serde(default)]
    pub select_list: Vec<WireParsedExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_expr: Option<WireSearchExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_expr: Option<WireParsedExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub explain_type: i32,
    #[serde(default)]
    pub select_list: Vec<WireParsedExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_expr: Option<WireSearchExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_expr: Option<WireParsedExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_expr: Option<WireParsedExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_expr: Option<WireParsedExpr>,
    #[serde(default)]
    pub update_expr_array: Vec<WireUpdateExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTableRequest {
    pub session_id: u64,
    pub db_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIndexRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowDatabaseRequest {
    pub session_id: u64,
    pub db_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowTableRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowIndexRequest {
    pub session_id: u64,
    pub db_name: String,
    pub table_name: String,
    pub index_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowVariableRequest {
    pub session_id: u64,
    pub variable_name: String,
}

// ── Responses ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDatabaseResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub db_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTableResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub table_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListIndexResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub index_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowDatabaseResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub store_dir: String,
    #[serde(default)]
    pub table_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowTableResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub store_dir: String,
    #[serde(default)]
    pub column_count: i64,
    #[serde(default)]
    pub segment_count: i64,
    #[serde(default)]
    pub row_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowIndexResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub index_name: String,
    #[serde(default)]
    pub index_type: String,
    #[serde(default)]
    pub index_column_names: String,
    #[serde(default)]
    pub index_column_ids: String,
    #[serde(default)]
    pub other_parameters: String,
    #[serde(default)]
    pub store_dir: String,
    #[serde(default)]
    pub segment_index_count: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub column_defs: Vec<WireColumnDef>,
    #[serde(default)]
    pub column_fields: Vec<WireColumnField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub can_skip: bool,
}

// ── Encode / decode ──────────────────────────────────────────────────

/// Write a framed message: `[msg_type u32 BE][payload_len u32 BE][payload]`.
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u32,
    payload: &[u8],
) -> io::Result<()> {
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&msg_type.to_be_bytes());
    header[4..8].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    writer.write_all(&header).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read a framed message, returning `(msg_type, payload)`.
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<(u32, Vec<u8>)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    let msg_type = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let payload_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload too large: {} bytes", payload_len),
        ));
    }
    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok((msg_type, payload))
}

/// Serialize a serde-compatible value to JSON bytes.
pub fn encode_json<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| io::Error::other(e.to_string()))
}

/// Deserialize a serde-compatible value from JSON bytes.
pub fn decode_json<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> io::Result<T> {
    serde_json::from_slice(bytes).map_err(|e| io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let mut buf = Vec::new();
        let mut cursor = io::Cursor::new(&mut buf);
        write_message(&mut cursor, MSG_CONNECT, b"").await.unwrap();
        let mut reader = io::Cursor::new(&buf);
        let (msg_type, payload) = read_message(&mut reader).await.unwrap();
        assert_eq!(msg_type, MSG_CONNECT);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_write_read_with_payload() {
        let request = CreateDatabaseRequest {
            session_id: 7,
            db_name: "d1".into(),
            create_option: WireCreateOption {
                conflict_type: create_conflict::IGNORE,
            },
        };
        let encoded = encode_json(&request).unwrap();
        let mut buf = Vec::new();
        let mut cursor = io::Cursor::new(&mut buf);
        write_message(&mut cursor, MSG_CREATE_DATABASE, &encoded)
            .await
            .unwrap();

        let mut reader = io::Cursor::new(&buf);
        let (msg_type, payload) = read_message(&mut reader).await.unwrap();
        assert_eq!(msg_type, MSG_CREATE_DATABASE);
        let decoded: CreateDatabaseRequest = decode_json(&payload).unwrap();
        assert_eq!(decoded.session_id, 7);
        assert_eq!(decoded.db_name, "d1");
    }

    #[test]
    fn test_optional_expr_fields_default() {
        let json = br#"{"session_id":1,"db_name":"d","table_name":"t","select_list":[{"column_expr":{"star":true}}]}"#;
        let request: SelectRequest = decode_json(json).unwrap();
        assert!(request.search_expr.is_none());
        assert!(request.where_expr.is_none());
        let expr = &request.select_list[0];
        assert!(expr.column_expr.as_ref().unwrap().star);
        assert!(expr.constant_expr.is_none());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&MSG_SELECT.to_be_bytes());
        frame.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        let mut reader = io::Cursor::new(frame);
        let result = futures_block_on(read_message(&mut reader));
        assert!(result.is_err());
    }

    // Minimal executor for the one non-async-friendly test above.
    fn futures_block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }
}
