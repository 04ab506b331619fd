//! Engine status codes and the `Status` carrier type.
//!
//! Every engine operation reports its outcome through a [`Status`]: a closed
//! set of error codes plus a human-readable message. Transient and
//! user-visible failures travel back to the RPC layer as status codes and
//! leave server state intact; invariant violations go through
//! [`unrecoverable`], which logs and aborts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of engine error codes.
///
/// The numeric values are part of the wire contract: `error_code == 0` iff
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum ErrorCode {
    Ok = 0,
    InvalidConflictType = 3001,
    InvalidDataType = 3002,
    InvalidConstraintType = 3003,
    InvalidIndexType = 3004,
    InvalidKnnDistanceType = 3005,
    InvalidEmbeddingDataType = 3006,
    InvalidConstantType = 3007,
    InvalidParsedExprType = 3008,
    InvalidParameterValue = 3009,
    ImportFileFormatError = 3010,
    SyntaxError = 3011,
    EmptySelectFields = 3012,
    InsertWithoutValues = 3013,
    ColumnCountMismatch = 3014,
    SessionNotFound = 3015,
    NotSupport = 3016,
    DuplicateDatabase = 3017,
    DatabaseNotFound = 3018,
    DuplicateTable = 3019,
    TableNotFound = 3020,
    DuplicateIndex = 3021,
    IndexNotFound = 3022,
    PoolExhausted = 3023,
    IoError = 3024,
    Unrecoverable = 4001,
}

/// Outcome of an engine operation: an error code plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Status {
            code: ErrorCode::Ok,
            message: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }

    fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Status {
            code,
            message: Some(message.into()),
        }
    }

    pub fn invalid_conflict_type() -> Self {
        Self::err(ErrorCode::InvalidConflictType, "invalid conflict type")
    }

    pub fn invalid_data_type() -> Self {
        Self::err(ErrorCode::InvalidDataType, "invalid data type")
    }

    pub fn invalid_constraint_type() -> Self {
        Self::err(ErrorCode::InvalidConstraintType, "invalid constraint type")
    }

    pub fn invalid_index_type() -> Self {
        Self::err(ErrorCode::InvalidIndexType, "invalid index type")
    }

    pub fn invalid_knn_distance_type() -> Self {
        Self::err(
            ErrorCode::InvalidKnnDistanceType,
            "invalid knn distance type",
        )
    }

    pub fn invalid_embedding_data_type() -> Self {
        Self::err(
            ErrorCode::InvalidEmbeddingDataType,
            "invalid embedding element type",
        )
    }

    pub fn invalid_constant_type() -> Self {
        Self::err(ErrorCode::InvalidConstantType, "invalid constant type")
    }

    pub fn invalid_parsed_expr_type() -> Self {
        Self::err(ErrorCode::InvalidParsedExprType, "invalid expression type")
    }

    pub fn invalid_parameter_value(name: &str, value: &str, reason: &str) -> Self {
        Self::err(
            ErrorCode::InvalidParameterValue,
            format!("invalid value '{value}' for parameter '{name}': {reason}"),
        )
    }

    pub fn import_file_format_error(message: impl Into<String>) -> Self {
        Self::err(ErrorCode::ImportFileFormatError, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::err(ErrorCode::SyntaxError, message)
    }

    pub fn empty_select_fields() -> Self {
        Self::err(ErrorCode::EmptySelectFields, "empty select fields")
    }

    pub fn insert_without_values() -> Self {
        Self::err(ErrorCode::InsertWithoutValues, "insert without values")
    }

    pub fn column_count_mismatch(message: impl Into<String>) -> Self {
        Self::err(ErrorCode::ColumnCountMismatch, message)
    }

    pub fn session_not_found(session_id: u64) -> Self {
        Self::err(
            ErrorCode::SessionNotFound,
            format!("session {session_id} not found"),
        )
    }

    pub fn not_support(message: impl Into<String>) -> Self {
        Self::err(ErrorCode::NotSupport, message)
    }

    pub fn duplicate_database(name: &str) -> Self {
        Self::err(
            ErrorCode::DuplicateDatabase,
            format!("database '{name}' already exists"),
        )
    }

    pub fn database_not_found(name: &str) -> Self {
        Self::err(
            ErrorCode::DatabaseNotFound,
            format!("database '{name}' not found"),
        )
    }

    pub fn duplicate_table(name: &str) -> Self {
        Self::err(
            ErrorCode::DuplicateTable,
            format!("table '{name}' already exists"),
        )
    }

    pub fn table_not_found(name: &str) -> Self {
        Self::err(ErrorCode::TableNotFound, format!("table '{name}' not found"))
    }

    pub fn duplicate_index(name: &str) -> Self {
        Self::err(
            ErrorCode::DuplicateIndex,
            format!("index '{name}' already exists"),
        )
    }

    pub fn index_not_found(name: &str) -> Self {
        Self::err(ErrorCode::IndexNotFound, format!("index '{name}' not found"))
    }

    pub fn pool_exhausted(requested: usize, budget: usize) -> Self {
        Self::err(
            ErrorCode::PoolExhausted,
            format!("byte-slice pool exhausted: requested {requested} over budget {budget}"),
        )
    }

    pub fn io_error(err: &std::io::Error) -> Self {
        Self::err(ErrorCode::IoError, err.to_string())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{:?}: {}", self.code, msg),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Status::io_error(&err)
    }
}

/// Abort on an invariant violation.
///
/// Reserved for states that must not exist (e.g. a segment missing from the
/// index map during rollback). Logs before panicking so the violation is
/// visible in structured output.
pub fn unrecoverable(message: &str) -> ! {
    tracing::error!("unrecoverable: {message}");
    panic!("unrecoverable: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status() {
        let s = Status::ok();
        assert!(s.is_ok());
        assert_eq!(s.code as i64, 0);
        assert!(s.message.is_none());
    }

    #[test]
    fn test_error_status_carries_message() {
        let s = Status::table_not_found("t1");
        assert!(!s.is_ok());
        assert_eq!(s.code, ErrorCode::TableNotFound);
        assert!(s.message.as_deref().unwrap().contains("t1"));
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            ErrorCode::Ok as i64,
            ErrorCode::InvalidConflictType as i64,
            ErrorCode::SessionNotFound as i64,
            ErrorCode::Unrecoverable as i64,
        ];
        let mut seen = std::collections::HashSet::new();
        for c in codes {
            assert!(seen.insert(c), "duplicate code {c}");
        }
    }
}
