//! Full-text analysis and scoring.

/// BM25 Okapi scoring over posting decoders.
pub mod scorer;
/// Text analyzer with token positions.
pub mod tokenizer;

pub use tokenizer::{analyze, AnalyzedText};
