//! Per-term posting writer.
//!
//! A [`PostingWriter`] is bound to one (term, segment) pair. It coordinates
//! the doc-list encoder and, when the format carries positions, the
//! position-list encoder; both draw from the pools owned by the enclosing
//! table-index entry. The shared column-length array is read under its
//! rw-lock when a document is sealed.

use crate::mem::{ByteSlicePool, RecyclePool};
use crate::posting::doc_list::{DocListEncoder, InMemDocListDecoder};
use crate::posting::position_list::{InMemPositionListDecoder, PositionListEncoder};
use crate::status::Status;
use crate::types::DocId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Posting stream features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingFormatOption {
    pub has_position_list: bool,
}

impl Default for PostingFormatOption {
    fn default() -> Self {
        PostingFormatOption {
            has_position_list: true,
        }
    }
}

/// Byte offsets of one term's streams in a dumped posting file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMeta {
    pub df: u32,
    pub total_tf: u64,
    pub doc_start: u64,
    pub pos_start: u64,
    pub pos_end: u64,
}

/// `Write` adapter that tracks total bytes written, used to record term
/// offsets during a dump.
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: std::io::Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, written: 0 }
    }

    pub fn total_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> std::io::Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Builder for one term's compressed posting stream within one segment.
pub struct PostingWriter {
    doc_list: DocListEncoder,
    position_list: Option<PositionListEncoder>,
    column_lengths: Arc<RwLock<Vec<u32>>>,
}

impl PostingWriter {
    pub fn new(
        byte_slice_pool: Arc<ByteSlicePool>,
        buffer_pool: Arc<RecyclePool>,
        option: PostingFormatOption,
        column_lengths: Arc<RwLock<Vec<u32>>>,
    ) -> Result<Self, Status> {
        let position_list = if option.has_position_list {
            Some(PositionListEncoder::new(byte_slice_pool.clone())?)
        } else {
            None
        };
        Ok(PostingWriter {
            doc_list: DocListEncoder::new(byte_slice_pool, buffer_pool)?,
            position_list,
            column_lengths,
        })
    }

    /// Record one occurrence at `pos` in the current document.
    pub fn add_position(&mut self, pos: u32) {
        self.doc_list.add_position();
        if let Some(positions) = &mut self.position_list {
            positions.add_position(pos);
        }
    }

    /// Seal the current document. The document's column length is read from
    /// the shared length array keyed by `doc_id`.
    pub fn end_document(&mut self, doc_id: DocId, doc_payload: u16) -> Result<(), Status> {
        let doc_len = {
            let lengths = self.column_lengths.read();
            lengths.get(doc_id as usize).copied().unwrap_or(0)
        };
        self.doc_list.end_document(doc_id, doc_len, doc_payload)?;
        if let Some(positions) = &mut self.position_list {
            positions.end_document()?;
        }
        Ok(())
    }

    /// Flush both encoders. Required before `dump`.
    pub fn end_segment(&mut self) -> Result<(), Status> {
        self.doc_list.flush()?;
        if let Some(positions) = &mut self.position_list {
            positions.flush()?;
        }
        Ok(())
    }

    /// Write the doc list then the position list sequentially, recording
    /// stream offsets into `term_meta`.
    pub fn dump<W: std::io::Write>(
        &self,
        writer: &mut CountingWriter<W>,
        term_meta: &mut TermMeta,
        spill: bool,
    ) -> std::io::Result<()> {
        term_meta.df = self.df();
        term_meta.total_tf = self.total_tf();
        term_meta.doc_start = writer.total_written();
        self.doc_list.dump(writer, spill)?;
        if let Some(positions) = &self.position_list {
            term_meta.pos_start = writer.total_written();
            positions.dump(writer, spill)?;
            term_meta.pos_end = writer.total_written();
        } else {
            term_meta.pos_start = writer.total_written();
            term_meta.pos_end = writer.total_written();
        }
        Ok(())
    }

    /// Inverse of a spill `dump`, for recovery.
    pub fn load<R: std::io::Read>(&mut self, reader: &mut R) -> std::io::Result<()> {
        self.doc_list.load(reader)?;
        if let Some(positions) = &mut self.position_list {
            positions.load(reader)?;
        }
        Ok(())
    }

    /// Total bytes a `dump` would write.
    pub fn dump_length(&self) -> usize {
        let mut len = self.doc_list.dump_length();
        if let Some(positions) = &self.position_list {
            len += positions.dump_length();
        }
        len
    }

    /// Build a decoder reading directly from the encoders' live byte-slice
    /// chains. The decoder must not outlive this writer's segment build.
    pub fn in_mem_decoder(&self) -> InMemPostingDecoder {
        InMemPostingDecoder {
            doc_list: self.doc_list.in_mem_decoder(),
            position_list: self.position_list.as_ref().map(|p| p.in_mem_decoder()),
        }
    }

    pub fn df(&self) -> u32 {
        self.doc_list.df()
    }

    pub fn total_tf(&self) -> u64 {
        self.doc_list.total_tf()
    }

    pub fn total_doc_len(&self) -> u64 {
        self.doc_list.total_doc_len()
    }

    pub fn current_tf(&self) -> u32 {
        self.doc_list.current_tf()
    }

    pub fn set_current_tf(&mut self, tf: u32) {
        self.doc_list.set_current_tf(tf);
    }
}

/// Combined in-memory decoder for one term: doc stream plus optional
/// position stream.
pub struct InMemPostingDecoder {
    doc_list: InMemDocListDecoder,
    position_list: Option<InMemPositionListDecoder>,
}

impl InMemPostingDecoder {
    pub fn df(&self) -> u32 {
        self.doc_list.df()
    }

    pub fn next_posting(&mut self) -> Option<(DocId, u32)> {
        self.doc_list.next_posting()
    }

    pub fn seek(&mut self, target: DocId) -> Option<(DocId, u32)> {
        self.doc_list.seek(target)
    }

    /// Positions of the next document in the aligned position stream.
    pub fn next_doc_positions(&mut self) -> Option<Vec<u32>> {
        self.position_list.as_mut()?.next_doc_positions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn writer(column_lengths: Arc<RwLock<Vec<u32>>>) -> PostingWriter {
        let bsp = Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET));
        let rp = Arc::new(RecyclePool::new());
        PostingWriter::new(bsp, rp, PostingFormatOption::default(), column_lengths).unwrap()
    }

    #[test]
    fn test_dump_load_and_seek() {
        let expected: Vec<DocId> = vec![1, 3, 5, 7, 9];
        let column_lengths = Arc::new(RwLock::new(vec![10u32; 20]));

        let mut dump = Vec::new();
        let mut term_meta = TermMeta::default();
        {
            let mut posting = writer(column_lengths.clone());
            for &doc in &expected {
                posting.add_position(1);
                posting.add_position(3);
                posting.add_position(5);
                posting.end_document(doc, 0).unwrap();
            }
            posting.end_segment().unwrap();
            let mut counting = CountingWriter::new(&mut dump);
            posting.dump(&mut counting, &mut term_meta, true).unwrap();
            assert_eq!(term_meta.df, 5);
            assert_eq!(term_meta.total_tf, 15);
            assert_eq!(term_meta.doc_start, 0);
            assert!(term_meta.pos_end > term_meta.pos_start);
        }

        let mut posting = writer(column_lengths);
        posting
            .load(&mut std::io::Cursor::new(dump))
            .unwrap();

        // Continue the build after recovery.
        posting.add_position(1);
        posting.add_position(3);
        posting.add_position(5);
        posting.end_document(10, 0).unwrap();

        let mut decoder = posting.in_mem_decoder();
        let mut last = 0;
        for &doc in &expected {
            let (found, tf) = decoder.seek(doc).unwrap();
            assert_eq!(found, doc);
            assert_eq!(tf, 3);
            last = found;
        }
        let (found, tf) = decoder.seek(last + 1).unwrap();
        assert_eq!(found, 10);
        assert_eq!(tf, 3);
    }

    #[test]
    fn test_doc_length_read_from_shared_array() {
        let column_lengths = Arc::new(RwLock::new(vec![0u32, 7, 11]));
        let mut posting = writer(column_lengths.clone());
        posting.add_position(0);
        posting.end_document(1, 0).unwrap();
        posting.add_position(0);
        posting.end_document(2, 0).unwrap();
        assert_eq!(posting.total_doc_len(), 18);

        // Out-of-range doc ids read as zero length.
        posting.add_position(0);
        posting.end_document(9, 0).unwrap();
        assert_eq!(posting.total_doc_len(), 18);
    }

    #[test]
    fn test_positions_aligned_by_document() {
        let column_lengths = Arc::new(RwLock::new(vec![5u32; 8]));
        let mut posting = writer(column_lengths);
        posting.add_position(2);
        posting.add_position(6);
        posting.end_document(1, 0).unwrap();
        posting.add_position(4);
        posting.end_document(3, 0).unwrap();

        let mut decoder = posting.in_mem_decoder();
        assert_eq!(decoder.next_posting(), Some((1, 2)));
        assert_eq!(decoder.next_doc_positions(), Some(vec![2, 6]));
        assert_eq!(decoder.next_posting(), Some((3, 1)));
        assert_eq!(decoder.next_doc_positions(), Some(vec![4]));
    }

    #[test]
    fn test_set_current_tf() {
        let column_lengths = Arc::new(RwLock::new(vec![1u32; 4]));
        let mut posting = writer(column_lengths);
        posting.set_current_tf(5);
        assert_eq!(posting.current_tf(), 5);
        posting.end_document(1, 0).unwrap();
        assert_eq!(posting.total_tf(), 5);
        assert_eq!(posting.current_tf(), 0);
    }

    #[test]
    fn test_dump_length_no_positions() {
        let bsp = Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET));
        let rp = Arc::new(RecyclePool::new());
        let lengths = Arc::new(RwLock::new(vec![1u32; 4]));
        let mut posting = PostingWriter::new(
            bsp,
            rp,
            PostingFormatOption {
                has_position_list: false,
            },
            lengths,
        )
        .unwrap();
        posting.add_position(0);
        posting.end_document(1, 0).unwrap();
        posting.end_segment().unwrap();

        let mut dump = Vec::new();
        let mut meta = TermMeta::default();
        let mut counting = CountingWriter::new(&mut dump);
        posting.dump(&mut counting, &mut meta, false).unwrap();
        assert_eq!(dump.len(), posting.dump_length());
        assert_eq!(meta.pos_start, meta.pos_end);
    }
}
