//! Position-list encoder: the per-document occurrence positions of a term.
//!
//! Positions buffer per document, delta-encoded, and are emitted as a second
//! stream aligned by document: `[count][pos deltas]` per sealed document.

use crate::mem::{ByteSlicePool, PostingBuffer, PostingBufferSnapshot};
use crate::posting::varint;
use crate::status::Status;
use std::sync::Arc;

/// Incremental encoder for one term's position stream.
pub struct PositionListEncoder {
    buffer: PostingBuffer,
    doc_deltas: Vec<u32>,
    last_pos: u32,
    total_positions: u64,
}

impl PositionListEncoder {
    pub fn new(byte_slice_pool: Arc<ByteSlicePool>) -> Result<Self, Status> {
        Ok(PositionListEncoder {
            buffer: PostingBuffer::new(byte_slice_pool)?,
            doc_deltas: Vec::new(),
            last_pos: 0,
            total_positions: 0,
        })
    }

    pub fn total_positions(&self) -> u64 {
        self.total_positions
    }

    /// Record one occurrence position in the current document. Positions
    /// within a document must be non-decreasing.
    pub fn add_position(&mut self, pos: u32) {
        debug_assert!(
            self.doc_deltas.is_empty() || pos >= self.last_pos,
            "positions must be non-decreasing within a document"
        );
        let delta = if self.doc_deltas.is_empty() {
            pos
        } else {
            pos - self.last_pos
        };
        self.doc_deltas.push(delta);
        self.last_pos = pos;
        self.total_positions += 1;
    }

    /// Seal the current document's position block.
    pub fn end_document(&mut self) -> Result<(), Status> {
        self.buffer.write_vu32(self.doc_deltas.len() as u32)?;
        for i in 0..self.doc_deltas.len() {
            self.buffer.write_vu32(self.doc_deltas[i])?;
        }
        self.doc_deltas.clear();
        self.last_pos = 0;
        Ok(())
    }

    /// Flush pending state. Position blocks are sealed per document, so this
    /// only asserts there is no open document.
    pub fn flush(&mut self) -> Result<(), Status> {
        debug_assert!(self.doc_deltas.is_empty(), "flush with an open document");
        Ok(())
    }

    pub fn dump_length(&self) -> usize {
        varint::encoded_len_u64(self.total_positions)
            + varint::encoded_len_u32(self.buffer.len() as u32)
            + self.buffer.len()
    }

    /// Write the encoded stream. The format is identical with and without
    /// `spill`; the flag exists for symmetry with the doc-list stream.
    pub fn dump<W: std::io::Write>(&self, w: &mut W, _spill: bool) -> std::io::Result<()> {
        varint::write_u64(w, self.total_positions)?;
        varint::write_u32(w, self.buffer.len() as u32)?;
        self.buffer.dump_to(w)
    }

    /// Restore a dump into this encoder, replacing its state.
    pub fn load<R: std::io::Read>(&mut self, r: &mut R) -> std::io::Result<()> {
        self.total_positions = varint::read_u64(r)?;
        let buffer_len = varint::read_u32(r)? as usize;
        let mut bytes = vec![0u8; buffer_len];
        r.read_exact(&mut bytes)?;
        self.buffer
            .write_all(&bytes)
            .map_err(|s| std::io::Error::other(s.to_string()))?;
        Ok(())
    }

    /// Build a decoder over the live stream.
    pub fn in_mem_decoder(&self) -> InMemPositionListDecoder {
        InMemPositionListDecoder {
            snapshot: self.buffer.snapshot(),
            offset: 0,
        }
    }
}

/// Decoder yielding each document's absolute positions in stream order.
pub struct InMemPositionListDecoder {
    snapshot: PostingBufferSnapshot,
    offset: usize,
}

impl InMemPositionListDecoder {
    /// Positions of the next sealed document.
    pub fn next_doc_positions(&mut self) -> Option<Vec<u32>> {
        if self.offset >= self.snapshot.len() {
            return None;
        }
        let mut reader = self.snapshot.reader();
        reader.seek(self.offset);
        let count = reader.read_vu32()? as usize;
        let mut positions = Vec::with_capacity(count);
        let mut pos = 0u32;
        for i in 0..count {
            let delta = reader.read_vu32()?;
            pos = if i == 0 { delta } else { pos + delta };
            positions.push(pos);
        }
        self.offset = reader.position();
        Some(positions)
    }
}
