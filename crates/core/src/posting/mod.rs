//! Inverted-index posting construction.
//!
//! The build path for full-text indexing: pooled byte buffers are filled by
//! the doc-list and position-list encoders, coordinated per term by the
//! [`writer::PostingWriter`], with skip-list metadata for block seeks and a
//! dumpable on-disk form addressed through [`writer::TermMeta`] offsets.

/// Doc-list encoder and its in-memory decoder.
pub mod doc_list;
/// Position-list encoder and its in-memory decoder.
pub mod position_list;
/// Block skip-list metadata.
pub mod skiplist;
/// Variable-length integer primitives.
pub mod varint;
/// Per-term posting writer and term metadata.
pub mod writer;

pub use writer::{
    CountingWriter, InMemPostingDecoder, PostingFormatOption, PostingWriter, TermMeta,
};
