//! Index specifications.
//!
//! An [`IndexBase`] is the declarative part of an index: its type, the
//! indexed columns, and creation parameters. The column list is plural in
//! the data model, but the create path currently enforces exactly one
//! column.

use crate::expr::InitParameter;
use crate::status::Status;
use serde::{Deserialize, Serialize};

/// Kind of a table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    IvfFlat,
    Hnsw,
    FullText,
    Secondary,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::IvfFlat => "IVFFlat",
            IndexType::Hnsw => "HNSW",
            IndexType::FullText => "FullText",
            IndexType::Secondary => "Secondary",
        }
    }
}

/// Declarative index specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBase {
    pub index_name: String,
    pub index_type: IndexType,
    pub column_names: Vec<String>,
    pub parameters: Vec<(String, String)>,
}

impl IndexBase {
    pub fn new(
        index_name: impl Into<String>,
        index_type: IndexType,
        column_names: Vec<String>,
        parameters: Vec<InitParameter>,
    ) -> Self {
        IndexBase {
            index_name: index_name.into(),
            index_type,
            column_names,
            parameters: parameters.into_iter().map(|p| (p.name, p.value)).collect(),
        }
    }

    /// The single indexed column. Composite indexes are rejected at create
    /// time; the plural list is kept so that limit can be lifted later.
    pub fn column_name(&self) -> Result<&str, Status> {
        if self.column_names.len() != 1 {
            return Err(Status::syntax_error(
                "composite index is not supported",
            ));
        }
        Ok(&self.column_names[0])
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn serialize(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("index base serialization is infallible")
    }

    pub fn deserialize(value: &serde_json::Value) -> Result<Self, Status> {
        serde_json::from_value(value.clone())
            .map_err(|e| Status::syntax_error(format!("malformed index base: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column_enforced() {
        let one = IndexBase::new("idx", IndexType::Hnsw, vec!["v".into()], Vec::new());
        assert_eq!(one.column_name().unwrap(), "v");

        let two = IndexBase::new(
            "idx",
            IndexType::Hnsw,
            vec!["a".into(), "b".into()],
            Vec::new(),
        );
        assert!(two.column_name().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let base = IndexBase::new(
            "ft",
            IndexType::FullText,
            vec!["body".into()],
            vec![InitParameter {
                name: "analyzer".into(),
                value: "standard".into(),
            }],
        );
        let json = base.serialize();
        let back = IndexBase::deserialize(&json).unwrap();
        assert_eq!(back, base);
    }

    #[test]
    fn test_parameter_lookup() {
        let base = IndexBase::new(
            "ann",
            IndexType::Hnsw,
            vec!["v".into()],
            vec![InitParameter {
                name: "m".into(),
                value: "16".into(),
            }],
        );
        assert_eq!(base.parameter("m"), Some("16"));
        assert_eq!(base.parameter("ef"), None);
    }
}
