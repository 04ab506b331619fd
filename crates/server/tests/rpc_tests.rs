//! End-to-end RPC tests over real TCP frames.

use fusedb_core::engine::EngineHandle;
use fusedb_server::handlers::ServerState;
use fusedb_server::protocol::*;
use fusedb_server::server::serve;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpStream;

async fn spawn_server() -> (String, TempDir) {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().join("data");
    let temp_prefix = tmp_dir.path().join("upload");

    let engine = EngineHandle::open(&data_dir).expect("Failed to open engine");
    let state = Arc::new(ServerState::new(engine, temp_prefix));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let _ = serve(listener, state).await;
    });

    (addr, tmp_dir)
}

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect_to(addr: &str) -> Self {
        Client {
            stream: TcpStream::connect(addr).await.expect("Failed to connect"),
        }
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &mut self,
        msg_type: u32,
        request: &Req,
    ) -> Resp {
        let payload = encode_json(request).expect("request encoding");
        write_message(&mut self.stream, msg_type, &payload)
            .await
            .expect("write frame");
        let (reply_type, body) = read_message(&mut self.stream).await.expect("read frame");
        assert_eq!(reply_type, msg_type, "response reuses the request type");
        decode_json(&body).expect("response decoding")
    }

    async fn open_session(&mut self) -> u64 {
        let response: CommonResponse = self.call(MSG_CONNECT, &ConnectRequest {}).await;
        assert_eq!(response.error_code, 0);
        response.session_id.expect("connect returns a session id")
    }
}

fn create_option(conflict_type: i32) -> WireCreateOption {
    WireCreateOption { conflict_type }
}

fn int_column(id: i64, name: &str) -> WireColumnDef {
    WireColumnDef {
        id,
        name: name.into(),
        data_type: WireDataType {
            logic_type: logic_type::INTEGER,
            dimension: None,
            element_type: None,
        },
        constraints: Vec::new(),
    }
}

fn float4_column(id: i64, name: &str) -> WireColumnDef {
    WireColumnDef {
        id,
        name: name.into(),
        data_type: WireDataType {
            logic_type: logic_type::EMBEDDING,
            dimension: Some(4),
            element_type: Some(element_type::FLOAT32),
        },
        constraints: Vec::new(),
    }
}

fn constant_i64(value: i64) -> WireParsedExpr {
    WireParsedExpr {
        constant_expr: Some(WireConstantExpr {
            literal_type: literal_type::INT64,
            i64_value: Some(value),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn constant_f64_array(values: Vec<f64>) -> WireParsedExpr {
    WireParsedExpr {
        constant_expr: Some(WireConstantExpr {
            literal_type: literal_type::DOUBLE_ARRAY,
            f64_array_value: Some(values),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn star() -> WireParsedExpr {
    WireParsedExpr {
        column_expr: Some(WireColumnExpr {
            column_name: Vec::new(),
            star: true,
        }),
        ..Default::default()
    }
}

async fn create_int_float4_table(client: &mut Client, session_id: u64, table: &str) {
    let response: CommonResponse = client
        .call(
            MSG_CREATE_TABLE,
            &CreateTableRequest {
                session_id,
                db_name: "default".into(),
                table_name: table.into(),
                column_defs: vec![int_column(0, "a"), float4_column(1, "v")],
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_eq!(response.error_code, 0, "{:?}", response.error_msg);
}

async fn insert_two_rows(client: &mut Client, session_id: u64, table: &str) {
    let response: CommonResponse = client
        .call(
            MSG_INSERT,
            &InsertRequest {
                session_id,
                db_name: "default".into(),
                table_name: table.into(),
                column_names: vec!["a".into(), "v".into()],
                fields: vec![
                    WireField {
                        parse_exprs: vec![
                            constant_i64(1),
                            constant_f64_array(vec![1.0, 0.0, 0.0, 0.0]),
                        ],
                    },
                    WireField {
                        parse_exprs: vec![
                            constant_i64(2),
                            constant_f64_array(vec![0.0, 1.0, 0.0, 0.0]),
                        ],
                    },
                ],
            },
        )
        .await;
    assert_eq!(response.error_code, 0, "{:?}", response.error_msg);
}

// ── Scenario 1: connect / list / disconnect ──────────────────────────

#[tokio::test]
async fn test_connect_list_disconnect() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;

    let session_id = client.open_session().await;
    assert!(session_id >= 1);

    let listed: ListDatabaseResponse = client
        .call(MSG_LIST_DATABASE, &CommonRequest { session_id })
        .await;
    assert_eq!(listed.error_code, 0);
    assert_eq!(listed.db_names, vec!["default".to_string()]);

    let disconnected: CommonResponse = client
        .call(MSG_DISCONNECT, &CommonRequest { session_id })
        .await;
    assert_eq!(disconnected.error_code, 0);

    // Disconnecting the same session again fails with SessionNotFound.
    let again: CommonResponse = client
        .call(MSG_DISCONNECT, &CommonRequest { session_id })
        .await;
    assert_ne!(again.error_code, 0);
    assert!(again
        .error_msg
        .as_deref()
        .unwrap_or_default()
        .contains("not found"));
}

// ── Scenario 2: create-ignore twice ──────────────────────────────────

#[tokio::test]
async fn test_create_database_ignore_twice() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    for _ in 0..2 {
        let response: CommonResponse = client
            .call(
                MSG_CREATE_DATABASE,
                &CreateDatabaseRequest {
                    session_id,
                    db_name: "d".into(),
                    create_option: create_option(create_conflict::IGNORE),
                },
            )
            .await;
        assert_eq!(response.error_code, 0, "{:?}", response.error_msg);
    }

    let listed: ListDatabaseResponse = client
        .call(MSG_LIST_DATABASE, &CommonRequest { session_id })
        .await;
    assert_eq!(
        listed.db_names.iter().filter(|n| *n == "d").count(),
        1,
        "ignore must not duplicate the database"
    );
}

// ── Scenario 3: create-error twice ───────────────────────────────────

#[tokio::test]
async fn test_create_database_error_twice() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    let first: CommonResponse = client
        .call(
            MSG_CREATE_DATABASE,
            &CreateDatabaseRequest {
                session_id,
                db_name: "d".into(),
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_eq!(first.error_code, 0);

    let second: CommonResponse = client
        .call(
            MSG_CREATE_DATABASE,
            &CreateDatabaseRequest {
                session_id,
                db_name: "d".into(),
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_ne!(second.error_code, 0);

    let shown: ShowDatabaseResponse = client
        .call(
            MSG_SHOW_DATABASE,
            &ShowDatabaseRequest {
                session_id,
                db_name: "d".into(),
            },
        )
        .await;
    assert_eq!(shown.error_code, 0);
    assert_eq!(shown.database_name, "d");
    assert_eq!(shown.table_count, 0);
}

// ── Scenario 4: insert then select ───────────────────────────────────

#[tokio::test]
async fn test_insert_then_select() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    create_int_float4_table(&mut client, session_id, "t").await;
    insert_two_rows(&mut client, session_id, "t").await;

    let selected: SelectResponse = client
        .call(
            MSG_SELECT,
            &SelectRequest {
                session_id,
                db_name: "default".into(),
                table_name: "t".into(),
                select_list: vec![star()],
                search_expr: None,
                where_expr: None,
            },
        )
        .await;
    assert_eq!(selected.error_code, 0, "{:?}", selected.error_msg);
    assert_eq!(selected.column_defs.len(), 2);
    assert_eq!(selected.column_fields.len(), 2);

    // POD column `a`: contiguous 8-byte little-endian buffer [1, 2].
    let a = &selected.column_fields[0];
    assert_eq!(a.column_type, column_type::INT32);
    assert_eq!(a.column_vectors[0], vec![1, 0, 0, 0, 2, 0, 0, 0]);

    // Embedding column: 2 rows * 4 dims * 4 bytes = 32 bytes.
    let v = &selected.column_fields[1];
    assert_eq!(v.column_type, column_type::EMBEDDING);
    assert_eq!(v.column_vectors[0].len(), 32);
}

// ── Scenario 5: KNN ──────────────────────────────────────────────────

#[tokio::test]
async fn test_knn_select() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    create_int_float4_table(&mut client, session_id, "t").await;
    insert_two_rows(&mut client, session_id, "t").await;

    let selected: SelectResponse = client
        .call(
            MSG_SELECT,
            &SelectRequest {
                session_id,
                db_name: "default".into(),
                table_name: "t".into(),
                select_list: vec![star()],
                search_expr: Some(WireSearchExpr {
                    knn_exprs: vec![WireKnnExpr {
                        column_expr: WireColumnExpr {
                            column_name: vec!["v".into()],
                            star: false,
                        },
                        embedding_data: WireEmbeddingData {
                            f32_array_value: Some(vec![1.0, 0.0, 0.0, 0.0]),
                            ..Default::default()
                        },
                        embedding_data_type: element_type::FLOAT32,
                        distance_type: knn_distance::L2,
                        topn: 1,
                        opt_params: Vec::new(),
                    }],
                    match_exprs: Vec::new(),
                    fusion_expr: None,
                }),
                where_expr: None,
            },
        )
        .await;
    assert_eq!(selected.error_code, 0, "{:?}", selected.error_msg);

    // Exactly one row, and column `a` decodes to 1.
    let a = &selected.column_fields[0];
    assert_eq!(a.column_vectors[0], vec![1, 0, 0, 0]);
}

// ── Scenario 6: upload resume ────────────────────────────────────────

#[tokio::test]
async fn test_upload_file_chunk_resume() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    let data = vec![0xABu8; 1024];
    let chunk = FileChunk {
        session_id,
        db_name: "default".into(),
        table_name: "t".into(),
        file_name: "rows.csv".into(),
        index: 0,
        data: data.clone(),
        total_size: 1024,
    };

    let first: UploadResponse = client.call(MSG_UPLOAD_FILE_CHUNK, &chunk).await;
    assert_eq!(first.error_code, 0, "{:?}", first.error_msg);
    assert!(!first.can_skip);

    // Re-sending chunk 0 with a matching total size short-circuits.
    let resent: UploadResponse = client.call(MSG_UPLOAD_FILE_CHUNK, &chunk).await;
    assert_eq!(resent.error_code, 0);
    assert!(resent.can_skip);

    // A different declared size deletes and rewrites.
    let mut changed = chunk.clone();
    changed.total_size = 2048;
    let rewritten: UploadResponse = client.call(MSG_UPLOAD_FILE_CHUNK, &changed).await;
    assert_eq!(rewritten.error_code, 0);
    assert!(!rewritten.can_skip);
}

// ── Beyond the base scenarios ────────────────────────────────────────

#[tokio::test]
async fn test_upload_then_import_csv() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    let response: CommonResponse = client
        .call(
            MSG_CREATE_TABLE,
            &CreateTableRequest {
                session_id,
                db_name: "default".into(),
                table_name: "csv_rows".into(),
                column_defs: vec![int_column(0, "a"), int_column(1, "b")],
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_eq!(response.error_code, 0);

    let csv = b"1,10\n2,20\n3,30\n".to_vec();
    let uploaded: UploadResponse = client
        .call(
            MSG_UPLOAD_FILE_CHUNK,
            &FileChunk {
                session_id,
                db_name: "default".into(),
                table_name: "csv_rows".into(),
                file_name: "rows.csv".into(),
                index: 0,
                data: csv.clone(),
                total_size: csv.len() as i64,
            },
        )
        .await;
    assert_eq!(uploaded.error_code, 0);

    let imported: CommonResponse = client
        .call(
            MSG_IMPORT,
            &ImportRequest {
                session_id,
                db_name: "default".into(),
                table_name: "csv_rows".into(),
                file_name: "rows.csv".into(),
                import_option: WireImportOption {
                    copy_file_type: copy_file_type::CSV,
                    delimiter: ",".into(),
                },
            },
        )
        .await;
    assert_eq!(imported.error_code, 0, "{:?}", imported.error_msg);

    let shown: ShowTableResponse = client
        .call(
            MSG_SHOW_TABLE,
            &ShowTableRequest {
                session_id,
                db_name: "default".into(),
                table_name: "csv_rows".into(),
            },
        )
        .await;
    assert_eq!(shown.row_count, 3);

    // A multi-character delimiter is a syntax error.
    let bad: CommonResponse = client
        .call(
            MSG_IMPORT,
            &ImportRequest {
                session_id,
                db_name: "default".into(),
                table_name: "csv_rows".into(),
                file_name: "rows.csv".into(),
                import_option: WireImportOption {
                    copy_file_type: copy_file_type::CSV,
                    delimiter: ",,".into(),
                },
            },
        )
        .await;
    assert_ne!(bad.error_code, 0);
}

#[tokio::test]
async fn test_fulltext_index_and_match() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    let response: CommonResponse = client
        .call(
            MSG_CREATE_TABLE,
            &CreateTableRequest {
                session_id,
                db_name: "default".into(),
                table_name: "docs".into(),
                column_defs: vec![
                    int_column(0, "id"),
                    WireColumnDef {
                        id: 1,
                        name: "body".into(),
                        data_type: WireDataType {
                            logic_type: logic_type::VARCHAR,
                            dimension: None,
                            element_type: None,
                        },
                        constraints: Vec::new(),
                    },
                ],
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_eq!(response.error_code, 0);

    let created: CommonResponse = client
        .call(
            MSG_CREATE_INDEX,
            &CreateIndexRequest {
                session_id,
                db_name: "default".into(),
                table_name: "docs".into(),
                index_name: "ft".into(),
                index_info_list: vec![WireIndexInfo {
                    index_type: index_type::FULL_TEXT,
                    column_name: "body".into(),
                    index_param_list: Vec::new(),
                }],
                create_option: create_option(create_conflict::ERROR),
            },
        )
        .await;
    assert_eq!(created.error_code, 0, "{:?}", created.error_msg);

    let inserted: CommonResponse = client
        .call(
            MSG_INSERT,
            &InsertRequest {
                session_id,
                db_name: "default".into(),
                table_name: "docs".into(),
                column_names: Vec::new(),
                fields: vec![
                    WireField {
                        parse_exprs: vec![constant_i64(1), constant_str("vector search engine")],
                    },
                    WireField {
                        parse_exprs: vec![constant_i64(2), constant_str("relational algebra")],
                    },
                ],
            },
        )
        .await;
    assert_eq!(inserted.error_code, 0, "{:?}", inserted.error_msg);

    let listed: ListIndexResponse = client
        .call(
            MSG_LIST_INDEX,
            &ListIndexRequest {
                session_id,
                db_name: "default".into(),
                table_name: "docs".into(),
            },
        )
        .await;
    assert_eq!(listed.index_names, vec!["ft".to_string()]);

    let matched: SelectResponse = client
        .call(
            MSG_SELECT,
            &SelectRequest {
                session_id,
                db_name: "default".into(),
                table_name: "docs".into(),
                select_list: vec![star()],
                search_expr: Some(WireSearchExpr {
                    knn_exprs: Vec::new(),
                    match_exprs: vec![WireMatchExpr {
                        fields: "body".into(),
                        matching_text: "vector".into(),
                        options_text: "topn=10".into(),
                    }],
                    fusion_expr: None,
                }),
                where_expr: None,
            },
        )
        .await;
    assert_eq!(matched.error_code, 0, "{:?}", matched.error_msg);
    assert_eq!(matched.column_fields[0].column_vectors[0], vec![1, 0, 0, 0]);
}

#[tokio::test]
async fn test_unknown_conflict_type_rejected() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;
    let session_id = client.open_session().await;

    let response: CommonResponse = client
        .call(
            MSG_CREATE_DATABASE,
            &CreateDatabaseRequest {
                session_id,
                db_name: "d".into(),
                create_option: create_option(42),
            },
        )
        .await;
    assert_ne!(response.error_code, 0);
    assert!(response
        .error_msg
        .as_deref()
        .unwrap_or_default()
        .contains("conflict"));
}

#[tokio::test]
async fn test_session_required() {
    let (addr, _tmp) = spawn_server().await;
    let mut client = Client::connect_to(&addr).await;

    // No connect: session id 999 does not exist.
    let listed: ListDatabaseResponse = client
        .call(MSG_LIST_DATABASE, &CommonRequest { session_id: 999 })
        .await;
    assert_ne!(listed.error_code, 0);
    assert!(listed.db_names.is_empty());
}

fn constant_str(value: &str) -> WireParsedExpr {
    WireParsedExpr {
        constant_expr: Some(WireConstantExpr {
            literal_type: literal_type::STRING,
            str_value: Some(value.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
