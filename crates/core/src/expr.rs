//! Parsed expression trees.
//!
//! The dispatch layer converts wire expressions into these owned variants;
//! conversion failures drop partially built trees through normal scope exit.
//! A [`SearchExpr`] carries the multi-modal part of a query: any number of
//! KNN and match expressions, optionally closed by one fusion expression
//! that merges their scored results.

use crate::status::Status;
use crate::types::EmbeddingElementType;

/// Distance metric for KNN expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnnDistance {
    L2,
    Cosine,
    InnerProduct,
    Hamming,
}

/// A named string parameter, used by index creation and KNN options.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParameter {
    pub name: String,
    pub value: String,
}

/// A column reference, or `*`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    pub names: Vec<String>,
    pub star: bool,
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantExpr {
    Null,
    Boolean(bool),
    Int64(i64),
    Double(f64),
    Str(String),
    IntegerArray(Vec<i64>),
    DoubleArray(Vec<f64>),
}

/// A function call over sub-expressions (comparisons, arithmetic).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub name: String,
    pub arguments: Vec<ParsedExpr>,
}

/// Query embedding payload, typed by element.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingQuery {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl EmbeddingQuery {
    pub fn len(&self) -> usize {
        match self {
            EmbeddingQuery::Int8(v) => v.len(),
            EmbeddingQuery::Int16(v) => v.len(),
            EmbeddingQuery::Int32(v) => v.len(),
            EmbeddingQuery::Int64(v) => v.len(),
            EmbeddingQuery::Float32(v) => v.len(),
            EmbeddingQuery::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> EmbeddingElementType {
        match self {
            EmbeddingQuery::Int8(_) => EmbeddingElementType::Int8,
            EmbeddingQuery::Int16(_) => EmbeddingElementType::Int16,
            EmbeddingQuery::Int32(_) => EmbeddingElementType::Int32,
            EmbeddingQuery::Int64(_) => EmbeddingElementType::Int64,
            EmbeddingQuery::Float32(_) => EmbeddingElementType::Float32,
            EmbeddingQuery::Float64(_) => EmbeddingElementType::Float64,
        }
    }
}

/// A k-nearest-neighbor similarity predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnExpr {
    pub column: ColumnExpr,
    pub query: EmbeddingQuery,
    pub distance: KnnDistance,
    pub topn: usize,
    pub opt_params: Vec<InitParameter>,
}

/// A full-text match predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpr {
    pub fields: String,
    pub matching_text: String,
    pub options_text: String,
}

/// A score-merge node combining prior KNN/match results.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionExpr {
    pub method: String,
    pub options_text: String,
}

impl FusionExpr {
    /// Look up a `key=value` entry in `options_text` (`;`-separated).
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options_text.split(';').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == key).then_some(v.trim())
        })
    }
}

/// A parsed expression: tagged variant with inline recursive ownership.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedExpr {
    Column(ColumnExpr),
    Constant(ConstantExpr),
    Function(FunctionExpr),
    Knn(KnnExpr),
    Match(MatchExpr),
    Fusion(FusionExpr),
}

/// An ordered list of search sub-expressions with at most one fusion
/// expression, which must sit at the tail.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchExpr {
    exprs: Vec<ParsedExpr>,
}

impl SearchExpr {
    pub fn new(exprs: Vec<ParsedExpr>) -> Result<Self, Status> {
        let fusion_count = exprs
            .iter()
            .filter(|e| matches!(e, ParsedExpr::Fusion(_)))
            .count();
        if fusion_count > 1 {
            return Err(Status::syntax_error(
                "at most one fusion expression is allowed",
            ));
        }
        if fusion_count == 1 && !matches!(exprs.last(), Some(ParsedExpr::Fusion(_))) {
            return Err(Status::syntax_error(
                "fusion expression must be the last search expression",
            ));
        }
        for e in &exprs {
            match e {
                ParsedExpr::Knn(_) | ParsedExpr::Match(_) | ParsedExpr::Fusion(_) => {}
                _ => {
                    return Err(Status::syntax_error(
                        "search expressions must be knn, match, or fusion",
                    ))
                }
            }
        }
        Ok(SearchExpr { exprs })
    }

    pub fn exprs(&self) -> &[ParsedExpr] {
        &self.exprs
    }

    /// The trailing fusion expression, if present.
    pub fn fusion(&self) -> Option<&FusionExpr> {
        match self.exprs.last() {
            Some(ParsedExpr::Fusion(f)) => Some(f),
            _ => None,
        }
    }

    /// The KNN/match expressions ahead of any fusion tail.
    pub fn inputs(&self) -> &[ParsedExpr] {
        match self.exprs.last() {
            Some(ParsedExpr::Fusion(_)) => &self.exprs[..self.exprs.len() - 1],
            _ => &self.exprs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knn() -> ParsedExpr {
        ParsedExpr::Knn(KnnExpr {
            column: ColumnExpr {
                names: vec!["v".into()],
                star: false,
            },
            query: EmbeddingQuery::Float32(vec![1.0, 0.0]),
            distance: KnnDistance::L2,
            topn: 5,
            opt_params: Vec::new(),
        })
    }

    fn fusion() -> ParsedExpr {
        ParsedExpr::Fusion(FusionExpr {
            method: "rrf".into(),
            options_text: "rank_constant=60".into(),
        })
    }

    #[test]
    fn test_fusion_must_be_last() {
        assert!(SearchExpr::new(vec![knn(), fusion()]).is_ok());
        assert!(SearchExpr::new(vec![fusion(), knn()]).is_err());
        assert!(SearchExpr::new(vec![knn(), fusion(), fusion()]).is_err());
    }

    #[test]
    fn test_inputs_exclude_fusion() {
        let search = SearchExpr::new(vec![knn(), knn(), fusion()]).unwrap();
        assert_eq!(search.inputs().len(), 2);
        assert!(search.fusion().is_some());
    }

    #[test]
    fn test_non_search_expr_rejected() {
        let col = ParsedExpr::Column(ColumnExpr {
            names: vec!["a".into()],
            star: false,
        });
        assert!(SearchExpr::new(vec![col]).is_err());
    }

    #[test]
    fn test_fusion_option_lookup() {
        let f = FusionExpr {
            method: "weighted_sum".into(),
            options_text: "weight=0.7; rank_constant=40".into(),
        };
        assert_eq!(f.option("weight"), Some("0.7"));
        assert_eq!(f.option("rank_constant"), Some("40"));
        assert_eq!(f.option("missing"), None);
    }
}
