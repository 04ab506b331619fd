//! Columnar data blocks.
//!
//! A [`DataBlock`] is the unit of result transfer and of read-only block
//! iteration during index builds: a row count plus one typed
//! [`ColumnVector`] per column. Wire serialization of column vectors lives
//! in the server crate; this module only defines the in-memory layout.

use crate::status::Status;
use crate::types::{DataType, EmbeddingElementType, RowId, Value};

/// A typed column of values.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnVector {
    Boolean(Vec<bool>),
    TinyInt(Vec<i8>),
    SmallInt(Vec<i16>),
    Integer(Vec<i32>),
    BigInt(Vec<i64>),
    HugeInt(Vec<i128>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Varchar(Vec<String>),
    /// Row-major raw embedding payload: `len() * element_size * dimension`
    /// bytes.
    Embedding {
        element: EmbeddingElementType,
        dimension: usize,
        data: Vec<u8>,
    },
    RowId(Vec<RowId>),
}

impl ColumnVector {
    /// An empty column of the given type.
    pub fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => ColumnVector::Boolean(Vec::new()),
            DataType::TinyInt => ColumnVector::TinyInt(Vec::new()),
            DataType::SmallInt => ColumnVector::SmallInt(Vec::new()),
            DataType::Integer => ColumnVector::Integer(Vec::new()),
            DataType::BigInt => ColumnVector::BigInt(Vec::new()),
            DataType::HugeInt | DataType::Decimal => ColumnVector::HugeInt(Vec::new()),
            DataType::Float => ColumnVector::Float(Vec::new()),
            DataType::Double => ColumnVector::Double(Vec::new()),
            DataType::Varchar => ColumnVector::Varchar(Vec::new()),
            DataType::Embedding { element, dimension } => ColumnVector::Embedding {
                element: *element,
                dimension: *dimension,
                data: Vec::new(),
            },
            DataType::RowId => ColumnVector::RowId(Vec::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnVector::Boolean(_) => DataType::Boolean,
            ColumnVector::TinyInt(_) => DataType::TinyInt,
            ColumnVector::SmallInt(_) => DataType::SmallInt,
            ColumnVector::Integer(_) => DataType::Integer,
            ColumnVector::BigInt(_) => DataType::BigInt,
            ColumnVector::HugeInt(_) => DataType::HugeInt,
            ColumnVector::Float(_) => DataType::Float,
            ColumnVector::Double(_) => DataType::Double,
            ColumnVector::Varchar(_) => DataType::Varchar,
            ColumnVector::Embedding { element, dimension, .. } => DataType::Embedding {
                element: *element,
                dimension: *dimension,
            },
            ColumnVector::RowId(_) => DataType::RowId,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnVector::Boolean(v) => v.len(),
            ColumnVector::TinyInt(v) => v.len(),
            ColumnVector::SmallInt(v) => v.len(),
            ColumnVector::Integer(v) => v.len(),
            ColumnVector::BigInt(v) => v.len(),
            ColumnVector::HugeInt(v) => v.len(),
            ColumnVector::Float(v) => v.len(),
            ColumnVector::Double(v) => v.len(),
            ColumnVector::Varchar(v) => v.len(),
            ColumnVector::Embedding { dimension, element, data } => {
                let row = match element {
                    EmbeddingElementType::Bit => dimension.div_ceil(8),
                    other => other.size() * dimension,
                };
                if row == 0 {
                    0
                } else {
                    data.len() / row
                }
            }
            ColumnVector::RowId(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one value; the value must already match the column type.
    pub fn push(&mut self, value: Value) -> Result<(), Status> {
        match (self, value) {
            (ColumnVector::Boolean(v), Value::Boolean(x)) => v.push(x),
            (ColumnVector::TinyInt(v), Value::TinyInt(x)) => v.push(x),
            (ColumnVector::SmallInt(v), Value::SmallInt(x)) => v.push(x),
            (ColumnVector::Integer(v), Value::Integer(x)) => v.push(x),
            (ColumnVector::BigInt(v), Value::BigInt(x)) => v.push(x),
            (ColumnVector::HugeInt(v), Value::HugeInt(x)) => v.push(x),
            (ColumnVector::Float(v), Value::Float(x)) => v.push(x),
            (ColumnVector::Double(v), Value::Double(x)) => v.push(x),
            (ColumnVector::Varchar(v), Value::Varchar(x)) => v.push(x),
            (ColumnVector::Embedding { data, .. }, Value::Embedding(bytes)) => {
                data.extend_from_slice(&bytes)
            }
            (ColumnVector::RowId(v), Value::RowId(x)) => v.push(x),
            _ => return Err(Status::invalid_data_type()),
        }
        Ok(())
    }

    /// Read one value back out.
    pub fn get(&self, row: usize) -> Value {
        match self {
            ColumnVector::Boolean(v) => Value::Boolean(v[row]),
            ColumnVector::TinyInt(v) => Value::TinyInt(v[row]),
            ColumnVector::SmallInt(v) => Value::SmallInt(v[row]),
            ColumnVector::Integer(v) => Value::Integer(v[row]),
            ColumnVector::BigInt(v) => Value::BigInt(v[row]),
            ColumnVector::HugeInt(v) => Value::HugeInt(v[row]),
            ColumnVector::Float(v) => Value::Float(v[row]),
            ColumnVector::Double(v) => Value::Double(v[row]),
            ColumnVector::Varchar(v) => Value::Varchar(v[row].clone()),
            ColumnVector::Embedding { element, dimension, data } => {
                let row_size = match element {
                    EmbeddingElementType::Bit => dimension.div_ceil(8),
                    other => other.size() * dimension,
                };
                Value::Embedding(data[row * row_size..(row + 1) * row_size].to_vec())
            }
            ColumnVector::RowId(v) => Value::RowId(v[row]),
        }
    }

    /// Overwrite one value in place; the value must match the column type.
    pub fn set(&mut self, row: usize, value: Value) -> Result<(), Status> {
        match (self, value) {
            (ColumnVector::Boolean(v), Value::Boolean(x)) => v[row] = x,
            (ColumnVector::TinyInt(v), Value::TinyInt(x)) => v[row] = x,
            (ColumnVector::SmallInt(v), Value::SmallInt(x)) => v[row] = x,
            (ColumnVector::Integer(v), Value::Integer(x)) => v[row] = x,
            (ColumnVector::BigInt(v), Value::BigInt(x)) => v[row] = x,
            (ColumnVector::HugeInt(v), Value::HugeInt(x)) => v[row] = x,
            (ColumnVector::Float(v), Value::Float(x)) => v[row] = x,
            (ColumnVector::Double(v), Value::Double(x)) => v[row] = x,
            (ColumnVector::Varchar(v), Value::Varchar(x)) => v[row] = x,
            (ColumnVector::Embedding { element, dimension, data }, Value::Embedding(bytes)) => {
                let row_size = match element {
                    EmbeddingElementType::Bit => dimension.div_ceil(8),
                    other => other.size() * *dimension,
                };
                if bytes.len() != row_size {
                    return Err(Status::invalid_data_type());
                }
                data[row * row_size..(row + 1) * row_size].copy_from_slice(&bytes);
            }
            (ColumnVector::RowId(v), Value::RowId(x)) => v[row] = x,
            _ => return Err(Status::invalid_data_type()),
        }
        Ok(())
    }

    /// Decode an `f32` embedding row into an owned buffer.
    ///
    /// Rows are stored as little-endian bytes, so decoding copies rather
    /// than reinterpreting the backing buffer.
    pub fn embedding_f32_owned(&self, row: usize) -> Option<Vec<f32>> {
        match self {
            ColumnVector::Embedding {
                element: EmbeddingElementType::Float32,
                dimension,
                data,
            } => {
                let row_bytes = 4 * dimension;
                let bytes = &data[row * row_bytes..(row + 1) * row_bytes];
                Some(
                    bytes
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                )
            }
            _ => None,
        }
    }
}

/// A block of rows: one column vector per projected column.
#[derive(Debug, Clone, Default)]
pub struct DataBlock {
    pub columns: Vec<ColumnVector>,
}

impl DataBlock {
    pub fn new(columns: Vec<ColumnVector>) -> Self {
        DataBlock { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_value(&self, column: usize, row: usize) -> Value {
        self.columns[column].get(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut col = ColumnVector::for_type(&DataType::Integer);
        col.push(Value::Integer(5)).unwrap();
        col.push(Value::Integer(-2)).unwrap();
        assert_eq!(col.len(), 2);
        assert_eq!(col.get(1), Value::Integer(-2));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut col = ColumnVector::for_type(&DataType::Integer);
        assert!(col.push(Value::Varchar("x".into())).is_err());
    }

    #[test]
    fn test_embedding_row_decoding() {
        let dt = DataType::Embedding {
            element: EmbeddingElementType::Float32,
            dimension: 2,
        };
        let mut col = ColumnVector::for_type(&dt);
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        col.push(Value::Embedding(bytes)).unwrap();
        assert_eq!(col.len(), 1);
        assert_eq!(col.embedding_f32_owned(0).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_block_row_count() {
        let block = DataBlock::new(vec![
            ColumnVector::Integer(vec![1, 2, 3]),
            ColumnVector::Varchar(vec!["a".into(), "b".into(), "c".into()]),
        ]);
        assert_eq!(block.row_count(), 3);
        assert_eq!(block.get_value(1, 2), Value::Varchar("c".into()));
    }
}
