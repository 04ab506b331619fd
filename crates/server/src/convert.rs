//! Wire ↔ engine conversions.
//!
//! One dedicated function per protocol enumeration, each returning an
//! `Invalid*` status on unknown values, plus the expression-tree
//! conversions. Conversion functions return owned trees or a `Status`;
//! partially built trees are released by scope exit, and no engine
//! operation runs until every conversion has succeeded.

use crate::protocol::{
    self, WireColumnDef, WireConstantExpr, WireDataType, WireEmbeddingData, WireFunctionExpr,
    WireIndexInfo, WireKnnExpr, WireParsedExpr, WireSearchExpr, WireUpdateExpr,
};
use fusedb_core::catalog::index_base::IndexType;
use fusedb_core::catalog::ConflictType;
use fusedb_core::engine::{CopyFileType, ExplainType, IndexInfo, UpdateExpr};
use fusedb_core::expr::{
    ColumnExpr, ConstantExpr, EmbeddingQuery, FunctionExpr, FusionExpr, InitParameter, KnnDistance,
    KnnExpr, MatchExpr, ParsedExpr, SearchExpr,
};
use fusedb_core::status::Status;
use fusedb_core::types::{ColumnDef, ConstraintType, DataType, EmbeddingElementType};

// ── Enumeration conversions ──────────────────────────────────────────

pub fn create_conflict_from_wire(value: i32) -> Result<ConflictType, Status> {
    match value {
        protocol::create_conflict::IGNORE => Ok(ConflictType::Ignore),
        protocol::create_conflict::ERROR => Ok(ConflictType::Error),
        protocol::create_conflict::REPLACE => Ok(ConflictType::Replace),
        _ => Err(Status::invalid_conflict_type()),
    }
}

pub fn drop_conflict_from_wire(value: i32) -> Result<ConflictType, Status> {
    match value {
        protocol::drop_conflict::IGNORE => Ok(ConflictType::Ignore),
        protocol::drop_conflict::ERROR => Ok(ConflictType::Error),
        _ => Err(Status::invalid_conflict_type()),
    }
}

pub fn copy_file_type_from_wire(value: i32) -> Result<CopyFileType, Status> {
    match value {
        protocol::copy_file_type::CSV => Ok(CopyFileType::Csv),
        protocol::copy_file_type::JSON => Ok(CopyFileType::Json),
        protocol::copy_file_type::JSONL => Ok(CopyFileType::Jsonl),
        protocol::copy_file_type::FVECS => Ok(CopyFileType::Fvecs),
        _ => Err(Status::import_file_format_error("unknown file type")),
    }
}

pub fn element_type_from_wire(value: i32) -> Result<EmbeddingElementType, Status> {
    match value {
        protocol::element_type::BIT => Ok(EmbeddingElementType::Bit),
        protocol::element_type::INT8 => Ok(EmbeddingElementType::Int8),
        protocol::element_type::INT16 => Ok(EmbeddingElementType::Int16),
        protocol::element_type::INT32 => Ok(EmbeddingElementType::Int32),
        protocol::element_type::INT64 => Ok(EmbeddingElementType::Int64),
        protocol::element_type::FLOAT32 => Ok(EmbeddingElementType::Float32),
        protocol::element_type::FLOAT64 => Ok(EmbeddingElementType::Float64),
        _ => Err(Status::invalid_embedding_data_type()),
    }
}

pub fn constraint_from_wire(value: i32) -> Result<ConstraintType, Status> {
    match value {
        protocol::constraint::PRIMARY_KEY => Ok(ConstraintType::PrimaryKey),
        protocol::constraint::NOT_NULL => Ok(ConstraintType::NotNull),
        protocol::constraint::NULL => Ok(ConstraintType::Null),
        protocol::constraint::UNIQUE => Ok(ConstraintType::Unique),
        _ => Err(Status::invalid_constraint_type()),
    }
}

pub fn index_type_from_wire(value: i32) -> Result<IndexType, Status> {
    match value {
        protocol::index_type::IVF_FLAT => Ok(IndexType::IvfFlat),
        protocol::index_type::HNSW => Ok(IndexType::Hnsw),
        protocol::index_type::FULL_TEXT => Ok(IndexType::FullText),
        _ => Err(Status::invalid_index_type()),
    }
}

pub fn knn_distance_from_wire(value: i32) -> Result<KnnDistance, Status> {
    match value {
        protocol::knn_distance::L2 => Ok(KnnDistance::L2),
        protocol::knn_distance::COSINE => Ok(KnnDistance::Cosine),
        protocol::knn_distance::INNER_PRODUCT => Ok(KnnDistance::InnerProduct),
        protocol::knn_distance::HAMMING => Ok(KnnDistance::Hamming),
        _ => Err(Status::invalid_knn_distance_type()),
    }
}

pub fn explain_type_from_wire(value: i32) -> Result<ExplainType, Status> {
    match value {
        protocol::explain_type::ANALYZE => Ok(ExplainType::Analyze),
        protocol::explain_type::AST => Ok(ExplainType::Ast),
        protocol::explain_type::UN_OPT => Ok(ExplainType::UnOpt),
        protocol::explain_type::OPT => Ok(ExplainType::Opt),
        protocol::explain_type::PHYSICAL => Ok(ExplainType::Physical),
        protocol::explain_type::PIPELINE => Ok(ExplainType::Pipeline),
        protocol::explain_type::FRAGMENT => Ok(ExplainType::Fragment),
        _ => Err(Status::not_support("unknown explain type")),
    }
}

// ── Schema conversions ───────────────────────────────────────────────

pub fn data_type_from_wire(wire: &WireDataType) -> Result<DataType, Status> {
    match wire.logic_type {
        protocol::logic_type::BOOLEAN => Ok(DataType::Boolean),
        protocol::logic_type::TINY_INT => Ok(DataType::TinyInt),
        protocol::logic_type::SMALL_INT => Ok(DataType::SmallInt),
        protocol::logic_type::INTEGER => Ok(DataType::Integer),
        protocol::logic_type::BIG_INT => Ok(DataType::BigInt),
        protocol::logic_type::HUGE_INT => Ok(DataType::HugeInt),
        protocol::logic_type::DECIMAL => Ok(DataType::Decimal),
        protocol::logic_type::FLOAT => Ok(DataType::Float),
        protocol::logic_type::DOUBLE => Ok(DataType::Double),
        protocol::logic_type::VARCHAR => Ok(DataType::Varchar),
        protocol::logic_type::EMBEDDING => {
            let element = element_type_from_wire(
                wire.element_type.ok_or_else(Status::invalid_data_type)?,
            )?;
            let dimension = wire.dimension.ok_or_else(Status::invalid_data_type)? as usize;
            if dimension == 0 {
                return Err(Status::invalid_data_type());
            }
            Ok(DataType::Embedding { element, dimension })
        }
        _ => Err(Status::invalid_data_type()),
    }
}

pub fn column_def_from_wire(wire: &WireColumnDef) -> Result<ColumnDef, Status> {
    let data_type = data_type_from_wire(&wire.data_type)?;
    let mut column = ColumnDef::new(wire.id, wire.name.clone(), data_type);
    for constraint in &wire.constraints {
        column.constraints.push(constraint_from_wire(*constraint)?);
    }
    Ok(column)
}

pub fn index_info_from_wire(wire: &WireIndexInfo) -> Result<IndexInfo, Status> {
    Ok(IndexInfo {
        index_type: index_type_from_wire(wire.index_type)?,
        column_name: wire.column_name.clone(),
        parameters: wire
            .index_param_list
            .iter()
            .map(|p| InitParameter {
                name: p.param_name.clone(),
                value: p.param_value.clone(),
            })
            .collect(),
    })
}

// ── Expression conversions ───────────────────────────────────────────

pub fn constant_from_wire(wire: &WireConstantExpr) -> Result<ConstantExpr, Status> {
    match wire.literal_type {
        protocol::literal_type::BOOLEAN => wire
            .bool_value
            .map(ConstantExpr::Boolean)
            .ok_or_else(Status::invalid_constant_type),
        protocol::literal_type::DOUBLE => wire
            .f64_value
            .map(ConstantExpr::Double)
            .ok_or_else(Status::invalid_constant_type),
        protocol::literal_type::STRING => wire
            .str_value
            .clone()
            .map(ConstantExpr::Str)
            .ok_or_else(Status::invalid_constant_type),
        protocol::literal_type::INT64 => wire
            .i64_value
            .map(ConstantExpr::Int64)
            .ok_or_else(Status::invalid_constant_type),
        protocol::literal_type::NULL => Ok(ConstantExpr::Null),
        protocol::literal_type::INTEGER_ARRAY => wire
            .i64_array_value
            .clone()
            .map(ConstantExpr::IntegerArray)
            .ok_or_else(Status::invalid_constant_type),
        protocol::literal_type::DOUBLE_ARRAY => wire
            .f64_array_value
            .clone()
            .map(ConstantExpr::DoubleArray)
            .ok_or_else(Status::invalid_constant_type),
        _ => Err(Status::invalid_constant_type()),
    }
}

fn column_expr_from_wire(wire: &protocol::WireColumnExpr) -> ColumnExpr {
    ColumnExpr {
        names: wire.column_name.clone(),
        star: wire.star,
    }
}

fn function_expr_from_wire(wire: &WireFunctionExpr) -> Result<FunctionExpr, Status> {
    let mut arguments = Vec::with_capacity(wire.arguments.len());
    for argument in &wire.arguments {
        arguments.push(parsed_expr_from_wire(argument)?);
    }
    Ok(FunctionExpr {
        name: wire.function_name.clone(),
        arguments,
    })
}

/// The received `f32` payload arrives as JSON doubles; convert into a
/// freshly allocated `f32` buffer rather than reinterpreting anything in
/// place.
fn embedding_query_from_wire(
    wire: &WireEmbeddingData,
    element_type: EmbeddingElementType,
) -> Result<EmbeddingQuery, Status> {
    let query = match element_type {
        EmbeddingElementType::Int8 => wire.i8_array_value.clone().map(EmbeddingQuery::Int8),
        EmbeddingElementType::Int16 => wire.i16_array_value.clone().map(EmbeddingQuery::Int16),
        EmbeddingElementType::Int32 => wire.i32_array_value.clone().map(EmbeddingQuery::Int32),
        EmbeddingElementType::Int64 => wire.i64_array_value.clone().map(EmbeddingQuery::Int64),
        EmbeddingElementType::Float32 => wire
            .f32_array_value
            .as_ref()
            .map(|doubles| EmbeddingQuery::Float32(doubles.iter().map(|v| *v as f32).collect())),
        EmbeddingElementType::Float64 => {
            wire.f64_array_value.clone().map(EmbeddingQuery::Float64)
        }
        EmbeddingElementType::Bit => None,
    };
    query.ok_or_else(Status::invalid_embedding_data_type)
}

pub fn knn_expr_from_wire(wire: &WireKnnExpr) -> Result<KnnExpr, Status> {
    let distance = knn_distance_from_wire(wire.distance_type)?;
    let element_type = element_type_from_wire(wire.embedding_data_type)?;
    let query = embedding_query_from_wire(&wire.embedding_data, element_type)?;
    if wire.topn <= 0 {
        return Err(Status::invalid_parameter_value(
            "topn",
            &wire.topn.to_string(),
            "topn should be greater than 0",
        ));
    }
    Ok(KnnExpr {
        column: column_expr_from_wire(&wire.column_expr),
        query,
        distance,
        topn: wire.topn as usize,
        opt_params: wire
            .opt_params
            .iter()
            .map(|p| InitParameter {
                name: p.param_name.clone(),
                value: p.param_value.clone(),
            })
            .collect(),
    })
}

fn match_expr_from_wire(wire: &protocol::WireMatchExpr) -> MatchExpr {
    MatchExpr {
        fields: wire.fields.clone(),
        matching_text: wire.matching_text.clone(),
        options_text: wire.options_text.clone(),
    }
}

fn fusion_expr_from_wire(wire: &protocol::WireFusionExpr) -> FusionExpr {
    FusionExpr {
        method: wire.method.clone(),
        options_text: wire.options_text.clone(),
    }
}

pub fn parsed_expr_from_wire(wire: &WireParsedExpr) -> Result<ParsedExpr, Status> {
    if let Some(column) = &wire.column_expr {
        Ok(ParsedExpr::Column(column_expr_from_wire(column)))
    } else if let Some(constant) = &wire.constant_expr {
        Ok(ParsedExpr::Constant(constant_from_wire(constant)?))
    } else if let Some(function) = &wire.function_expr {
        Ok(ParsedExpr::Function(function_expr_from_wire(function)?))
    } else if let Some(knn) = &wire.knn_expr {
        Ok(ParsedExpr::Knn(knn_expr_from_wire(knn)?))
    } else if let Some(m) = &wire.match_expr {
        Ok(ParsedExpr::Match(match_expr_from_wire(m)))
    } else if let Some(fusion) = &wire.fusion_expr {
        Ok(ParsedExpr::Fusion(fusion_expr_from_wire(fusion)))
    } else {
        Err(Status::invalid_parsed_expr_type())
    }
}

/// Assemble the search expression: KNN inputs, then match inputs, then the
/// optional fusion tail.
pub fn search_expr_from_wire(wire: &WireSearchExpr) -> Result<SearchExpr, Status> {
    let mut exprs = Vec::with_capacity(
        wire.knn_exprs.len() + wire.match_exprs.len() + usize::from(wire.fusion_expr.is_some()),
    );
    for knn in &wire.knn_exprs {
        exprs.push(ParsedExpr::Knn(knn_expr_from_wire(knn)?));
    }
    for m in &wire.match_exprs {
        exprs.push(ParsedExpr::Match(match_expr_from_wire(m)));
    }
    if let Some(fusion) = &wire.fusion_expr {
        exprs.push(ParsedExpr::Fusion(fusion_expr_from_wire(fusion)));
    }
    SearchExpr::new(exprs)
}

pub fn update_expr_from_wire(wire: &WireUpdateExpr) -> Result<UpdateExpr, Status> {
    Ok(UpdateExpr {
        column_name: wire.column_name.clone(),
        value: parsed_expr_from_wire(&wire.value)?,
    })
}

// ── Engine → wire ────────────────────────────────────────────────────

pub fn column_type_to_wire(data_type: &DataType) -> i32 {
    match data_type {
        DataType::Boolean => protocol::column_type::BOOL,
        DataType::TinyInt => protocol::column_type::INT8,
        DataType::SmallInt => protocol::column_type::INT16,
        DataType::Integer => protocol::column_type::INT32,
        DataType::BigInt | DataType::HugeInt | DataType::Decimal => protocol::column_type::INT64,
        DataType::Float => protocol::column_type::FLOAT32,
        DataType::Double => protocol::column_type::FLOAT64,
        DataType::Varchar => protocol::column_type::VARCHAR,
        DataType::Embedding { .. } => protocol::column_type::EMBEDDING,
        DataType::RowId => protocol::column_type::ROW_ID,
    }
}

fn element_type_to_wire(element: EmbeddingElementType) -> i32 {
    match element {
        EmbeddingElementType::Bit => protocol::element_type::BIT,
        EmbeddingElementType::Int8 => protocol::element_type::INT8,
        EmbeddingElementType::Int16 => protocol::element_type::INT16,
        EmbeddingElementType::Int32 => protocol::element_type::INT32,
        EmbeddingElementType::Int64 => protocol::element_type::INT64,
        EmbeddingElementType::Float32 => protocol::element_type::FLOAT32,
        EmbeddingElementType::Float64 => protocol::element_type::FLOAT64,
    }
}

pub fn data_type_to_wire(data_type: &DataType) -> WireDataType {
    let logic_type = match data_type {
        DataType::Boolean => protocol::logic_type::BOOLEAN,
        DataType::TinyInt => protocol::logic_type::TINY_INT,
        DataType::SmallInt => protocol::logic_type::SMALL_INT,
        DataType::Integer => protocol::logic_type::INTEGER,
        DataType::BigInt => protocol::logic_type::BIG_INT,
        DataType::HugeInt => protocol::logic_type::HUGE_INT,
        DataType::Decimal => protocol::logic_type::DECIMAL,
        DataType::Float => protocol::logic_type::FLOAT,
        DataType::Double => protocol::logic_type::DOUBLE,
        DataType::Varchar | DataType::RowId => protocol::logic_type::VARCHAR,
        DataType::Embedding { .. } => protocol::logic_type::EMBEDDING,
    };
    match data_type {
        DataType::Embedding { element, dimension } => WireDataType {
            logic_type,
            dimension: Some(*dimension as u64),
            element_type: Some(element_type_to_wire(*element)),
        },
        _ => WireDataType {
            logic_type,
            dimension: None,
            element_type: None,
        },
    }
}

pub fn column_def_to_wire(column: &ColumnDef) -> WireColumnDef {
    WireColumnDef {
        id: column.id,
        name: column.name.clone(),
        data_type: data_type_to_wire(&column.data_type),
        constraints: column
            .constraints
            .iter()
            .map(|c| match c {
                ConstraintType::PrimaryKey => protocol::constraint::PRIMARY_KEY,
                ConstraintType::NotNull => protocol::constraint::NOT_NULL,
                ConstraintType::Null => protocol::constraint::NULL,
                ConstraintType::Unique => protocol::constraint::UNIQUE,
            })
            .collect(),
    }
}
