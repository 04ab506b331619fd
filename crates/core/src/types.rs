//! Core identifier, timestamp, and column type definitions.
//!
//! Timestamps (`TxnTimestamp`) are issued by the transaction manager and are
//! globally monotonic; `0` is reserved for "uncommitted". Row ids pack a
//! segment id and a segment-local offset into one `u64` so they travel as a
//! POD column on the wire.

use crate::status::Status;
use serde::{Deserialize, Serialize};

/// Transaction identifier.
pub type TxnId = u64;

/// Commit / begin timestamp. `0` means uncommitted.
pub type TxnTimestamp = u64;

/// Segment identifier, unique within a table.
pub type SegmentId = u64;

/// Chunk identifier, unique within a segment index.
pub type ChunkId = u64;

/// Document id within one segment's full-text index (the segment-local row
/// offset).
pub type DocId = u32;

/// Global row identifier: segment id in the high 32 bits, segment-local
/// offset in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl RowId {
    pub fn new(segment_id: SegmentId, segment_offset: u32) -> Self {
        RowId((segment_id << 32) | segment_offset as u64)
    }

    pub fn segment_id(&self) -> SegmentId {
        self.0 >> 32
    }

    pub fn segment_offset(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

/// Element type of an embedding column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingElementType {
    Bit,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl EmbeddingElementType {
    /// Byte size of one element. `Bit` packs eight elements per byte and is
    /// accounted for at the [`DataType`] level.
    pub fn size(&self) -> usize {
        match self {
            EmbeddingElementType::Bit => 0,
            EmbeddingElementType::Int8 => 1,
            EmbeddingElementType::Int16 => 2,
            EmbeddingElementType::Int32 => 4,
            EmbeddingElementType::Int64 => 8,
            EmbeddingElementType::Float32 => 4,
            EmbeddingElementType::Float64 => 8,
        }
    }
}

/// Logical column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    HugeInt,
    Decimal,
    Float,
    Double,
    Varchar,
    Embedding {
        element: EmbeddingElementType,
        dimension: usize,
    },
    RowId,
}

impl DataType {
    /// Fixed per-row byte size, or `None` for variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::TinyInt => Some(1),
            DataType::SmallInt => Some(2),
            DataType::Integer => Some(4),
            DataType::BigInt => Some(8),
            DataType::HugeInt => Some(16),
            DataType::Decimal => Some(16),
            DataType::Float => Some(4),
            DataType::Double => Some(8),
            DataType::Varchar => None,
            DataType::Embedding { element, dimension } => match element {
                EmbeddingElementType::Bit => Some(dimension.div_ceil(8)),
                other => Some(other.size() * dimension),
            },
            DataType::RowId => Some(8),
        }
    }

    pub fn is_embedding(&self) -> bool {
        matches!(self, DataType::Embedding { .. })
    }
}

/// Column constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    PrimaryKey,
    NotNull,
    Null,
    Unique,
}

/// A column definition: id, name, type, constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: i64,
    pub name: String,
    pub data_type: DataType,
    pub constraints: Vec<ConstraintType>,
}

impl ColumnDef {
    pub fn new(id: i64, name: impl Into<String>, data_type: DataType) -> Self {
        ColumnDef {
            id,
            name: name.into(),
            data_type,
            constraints: Vec::new(),
        }
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    HugeInt(i128),
    Float(f32),
    Double(f64),
    Varchar(String),
    /// Row-major embedding payload; element interpretation follows the
    /// column's [`DataType`].
    Embedding(Vec<u8>),
    RowId(RowId),
}

impl Value {
    /// Coerce this value to the target column type, or report why it does
    /// not fit. Integer literals widen and narrow between integer types when
    /// the value is in range; numeric literals convert to floats.
    pub fn cast_to(&self, target: &DataType) -> Result<Value, Status> {
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Boolean(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
            (Value::BigInt(v), DataType::TinyInt) => i8::try_from(*v)
                .map(Value::TinyInt)
                .map_err(|_| Status::invalid_constant_type()),
            (Value::BigInt(v), DataType::SmallInt) => i16::try_from(*v)
                .map(Value::SmallInt)
                .map_err(|_| Status::invalid_constant_type()),
            (Value::BigInt(v), DataType::Integer) => i32::try_from(*v)
                .map(Value::Integer)
                .map_err(|_| Status::invalid_constant_type()),
            (Value::BigInt(v), DataType::BigInt) => Ok(Value::BigInt(*v)),
            (Value::BigInt(v), DataType::HugeInt) => Ok(Value::HugeInt(*v as i128)),
            (Value::BigInt(v), DataType::Float) => Ok(Value::Float(*v as f32)),
            (Value::BigInt(v), DataType::Double) => Ok(Value::Double(*v as f64)),
            (Value::Double(v), DataType::Float) => Ok(Value::Float(*v as f32)),
            (Value::Double(v), DataType::Double) => Ok(Value::Double(*v)),
            (Value::Varchar(s), DataType::Varchar) => Ok(Value::Varchar(s.clone())),
            (Value::Embedding(b), DataType::Embedding { .. }) => Ok(Value::Embedding(b.clone())),
            _ => Err(Status::invalid_constant_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_packing() {
        let rid = RowId::new(3, 41);
        assert_eq!(rid.segment_id(), 3);
        assert_eq!(rid.segment_offset(), 41);
        assert_eq!(rid.0, (3u64 << 32) | 41);
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(DataType::Integer.fixed_size(), Some(4));
        assert_eq!(DataType::Double.fixed_size(), Some(8));
        assert_eq!(DataType::Varchar.fixed_size(), None);
        let emb = DataType::Embedding {
            element: EmbeddingElementType::Float32,
            dimension: 4,
        };
        assert_eq!(emb.fixed_size(), Some(16));
        let bits = DataType::Embedding {
            element: EmbeddingElementType::Bit,
            dimension: 12,
        };
        assert_eq!(bits.fixed_size(), Some(2));
    }

    #[test]
    fn test_cast_narrowing() {
        assert_eq!(
            Value::BigInt(7).cast_to(&DataType::Integer).unwrap(),
            Value::Integer(7)
        );
        assert!(Value::BigInt(1 << 40).cast_to(&DataType::Integer).is_err());
        assert!(Value::Varchar("x".into()).cast_to(&DataType::Integer).is_err());
    }
}
