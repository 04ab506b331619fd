//! Doc-list encoder: the compressed `(doc_id, tf, payload)` stream of a
//! posting list.
//!
//! Documents accumulate in a fixed-capacity block of parallel arrays; a full
//! block is varint-encoded into the pooled posting buffer as
//! `[count][doc deltas][tfs][payloads]` and a skip entry is recorded. Doc
//! ids are stored as strictly increasing deltas — a non-monotonic
//! `end_document` is a programmer error, checked in debug builds.

use crate::config;
use crate::mem::{ByteSlicePool, PostingBuffer, PostingBufferSnapshot, RecyclePool};
use crate::posting::skiplist::{SkipEntry, SkipListReader, SkipListWriter};
use crate::posting::varint;
use crate::status::Status;
use crate::types::DocId;
use std::sync::Arc;

/// Incremental encoder for one term's document list.
pub struct DocListEncoder {
    buffer: PostingBuffer,
    skiplist: SkipListWriter,
    block_deltas: Vec<u32>,
    block_tfs: Vec<u32>,
    block_payloads: Vec<u32>,
    buffer_pool: Arc<RecyclePool>,
    last_doc_id: DocId,
    current_tf: u32,
    df: u32,
    total_tf: u64,
    total_doc_len: u64,
}

impl DocListEncoder {
    pub fn new(
        byte_slice_pool: Arc<ByteSlicePool>,
        buffer_pool: Arc<RecyclePool>,
    ) -> Result<Self, Status> {
        let cap = config::POSTING_BLOCK_CAPACITY;
        Ok(DocListEncoder {
            buffer: PostingBuffer::new(byte_slice_pool)?,
            skiplist: SkipListWriter::new(),
            block_deltas: buffer_pool.get(cap),
            block_tfs: buffer_pool.get(cap),
            block_payloads: buffer_pool.get(cap),
            buffer_pool,
            last_doc_id: 0,
            current_tf: 0,
            df: 0,
            total_tf: 0,
            total_doc_len: 0,
        })
    }

    pub fn df(&self) -> u32 {
        self.df
    }

    pub fn total_tf(&self) -> u64 {
        self.total_tf
    }

    pub fn total_doc_len(&self) -> u64 {
        self.total_doc_len
    }

    pub fn current_tf(&self) -> u32 {
        self.current_tf
    }

    pub fn set_current_tf(&mut self, tf: u32) {
        self.current_tf = tf;
    }

    /// Record one occurrence in the current document.
    pub fn add_position(&mut self) {
        self.current_tf += 1;
    }

    /// Seal the current document. `doc_id` must be strictly greater than
    /// every previously sealed doc id.
    pub fn end_document(
        &mut self,
        doc_id: DocId,
        doc_len: u32,
        doc_payload: u16,
    ) -> Result<(), Status> {
        debug_assert!(
            self.df == 0 || doc_id > self.last_doc_id,
            "doc ids must strictly increase: {} after {}",
            doc_id,
            self.last_doc_id
        );
        self.block_deltas.push(doc_id - self.last_doc_id);
        self.block_tfs.push(self.current_tf);
        self.block_payloads.push(doc_payload as u32);
        self.last_doc_id = doc_id;
        self.df += 1;
        self.total_tf += self.current_tf as u64;
        self.total_doc_len += doc_len as u64;
        self.current_tf = 0;
        if self.block_deltas.len() == config::POSTING_BLOCK_CAPACITY {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Flush the pending block, if any. Required before `dump`.
    pub fn flush(&mut self) -> Result<(), Status> {
        self.flush_block()
    }

    fn flush_block(&mut self) -> Result<(), Status> {
        if self.block_deltas.is_empty() {
            return Ok(());
        }
        self.buffer.write_vu32(self.block_deltas.len() as u32)?;
        for i in 0..self.block_deltas.len() {
            self.buffer.write_vu32(self.block_deltas[i])?;
        }
        for i in 0..self.block_tfs.len() {
            self.buffer.write_vu32(self.block_tfs[i])?;
        }
        for i in 0..self.block_payloads.len() {
            self.buffer.write_vu32(self.block_payloads[i])?;
        }
        self.skiplist
            .add_entry(self.last_doc_id, self.total_tf, self.buffer.len() as u32);
        self.block_deltas.clear();
        self.block_tfs.clear();
        self.block_payloads.clear();
        Ok(())
    }

    /// Serialized size of the sealed stream.
    pub fn dump_length(&self) -> usize {
        varint::encoded_len_u32(self.df)
            + varint::encoded_len_u64(self.total_tf)
            + varint::encoded_len_u64(self.total_doc_len)
            + varint::encoded_len_u32(self.buffer.len() as u32)
            + self.buffer.len()
            + self.skiplist.dump_length()
    }

    /// Write the encoded stream. With `spill`, the resumable tail state
    /// (`last_doc_id`, `current_tf`) is appended so `load` can continue the
    /// build. The pending block must have been flushed.
    pub fn dump<W: std::io::Write>(&self, w: &mut W, spill: bool) -> std::io::Result<()> {
        debug_assert!(self.block_deltas.is_empty(), "dump before flush");
        varint::write_u32(w, self.df)?;
        varint::write_u64(w, self.total_tf)?;
        varint::write_u64(w, self.total_doc_len)?;
        varint::write_u32(w, self.buffer.len() as u32)?;
        self.buffer.dump_to(w)?;
        self.skiplist.dump(w)?;
        if spill {
            varint::write_u32(w, self.last_doc_id)?;
            varint::write_u32(w, self.current_tf)?;
        }
        Ok(())
    }

    /// Restore a spill dump into this encoder, replacing its state.
    pub fn load<R: std::io::Read>(&mut self, r: &mut R) -> std::io::Result<()> {
        self.df = varint::read_u32(r)?;
        self.total_tf = varint::read_u64(r)?;
        self.total_doc_len = varint::read_u64(r)?;
        let buffer_len = varint::read_u32(r)? as usize;
        let mut bytes = vec![0u8; buffer_len];
        r.read_exact(&mut bytes)?;
        self.buffer
            .write_all(&bytes)
            .map_err(|s| std::io::Error::other(s.to_string()))?;
        self.skiplist = SkipListWriter::load(r)?;
        self.last_doc_id = varint::read_u32(r)?;
        self.current_tf = varint::read_u32(r)?;
        Ok(())
    }

    /// Build a decoder over the live stream, including the unflushed block.
    pub fn in_mem_decoder(&self) -> InMemDocListDecoder {
        InMemDocListDecoder {
            df: self.df,
            snapshot: self.buffer.snapshot(),
            skips: self.skiplist.entries().to_vec(),
            tail_deltas: self.block_deltas.clone(),
            tail_tfs: self.block_tfs.clone(),
            offset: 0,
            base_doc_id: 0,
            block: Vec::new(),
            block_pos: 0,
            tail_consumed: false,
            started: false,
        }
    }
}

impl Drop for DocListEncoder {
    fn drop(&mut self) {
        self.buffer_pool.put(std::mem::take(&mut self.block_deltas));
        self.buffer_pool.put(std::mem::take(&mut self.block_tfs));
        self.buffer_pool
            .put(std::mem::take(&mut self.block_payloads));
    }
}

/// Decoder reading directly from a doc-list encoder's live byte-slice
/// chain. Holds shared references to the frozen chunks plus a copy of the
/// unflushed block, so it stays consistent while the build continues.
pub struct InMemDocListDecoder {
    df: u32,
    snapshot: PostingBufferSnapshot,
    skips: Vec<SkipEntry>,
    tail_deltas: Vec<u32>,
    tail_tfs: Vec<u32>,
    offset: usize,
    base_doc_id: DocId,
    block: Vec<(DocId, u32)>,
    block_pos: usize,
    tail_consumed: bool,
    started: bool,
}

impl InMemDocListDecoder {
    pub fn df(&self) -> u32 {
        self.df
    }

    /// Next posting in doc-id order: `(doc_id, tf)`.
    pub fn next_posting(&mut self) -> Option<(DocId, u32)> {
        self.started = true;
        while self.block_pos >= self.block.len() {
            if !self.decode_next_block() {
                return None;
            }
        }
        let posting = self.block[self.block_pos];
        self.block_pos += 1;
        Some(posting)
    }

    /// First posting with `doc_id >= target`, advancing the cursor.
    pub fn seek(&mut self, target: DocId) -> Option<(DocId, u32)> {
        if !self.started {
            // Jump past whole blocks before the first linear decode.
            let point = SkipListReader::new(&self.skips).skip_to(target);
            self.offset = point.offset as usize;
            self.base_doc_id = point.prev_last_doc_id;
        }
        while let Some((doc_id, tf)) = self.next_posting() {
            if doc_id >= target {
                return Some((doc_id, tf));
            }
        }
        None
    }

    fn decode_next_block(&mut self) -> bool {
        self.block.clear();
        self.block_pos = 0;
        if self.offset < self.snapshot.len() {
            let mut reader = self.snapshot.reader();
            reader.seek(self.offset);
            let count = match reader.read_vu32() {
                Some(c) => c as usize,
                None => return false,
            };
            let mut deltas = Vec::with_capacity(count);
            for _ in 0..count {
                match reader.read_vu32() {
                    Some(d) => deltas.push(d),
                    None => return false,
                }
            }
            let mut doc_id = self.base_doc_id;
            for (i, delta) in deltas.iter().enumerate() {
                doc_id += delta;
                let tf = match reader.read_vu32() {
                    Some(tf) => tf,
                    None => return false,
                };
                self.block.push((doc_id, tf));
                if i + 1 == count {
                    self.base_doc_id = doc_id;
                }
            }
            // Payloads trail the tfs; skip over them.
            for _ in 0..count {
                if reader.read_vu32().is_none() {
                    return false;
                }
            }
            self.offset = reader.position();
            true
        } else if !self.tail_consumed && !self.tail_deltas.is_empty() {
            let mut doc_id = self.base_doc_id;
            for (delta, tf) in self.tail_deltas.iter().zip(&self.tail_tfs) {
                doc_id += delta;
                self.block.push((doc_id, *tf));
            }
            self.base_doc_id = doc_id;
            self.tail_consumed = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> (Arc<ByteSlicePool>, Arc<RecyclePool>) {
        (
            Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET)),
            Arc::new(RecyclePool::new()),
        )
    }

    fn encoder() -> DocListEncoder {
        let (bsp, rp) = pools();
        DocListEncoder::new(bsp, rp).unwrap()
    }

    #[test]
    fn test_stats_accumulate() {
        let mut enc = encoder();
        for doc in [1u32, 3, 5] {
            enc.add_position();
            enc.add_position();
            enc.end_document(doc, 10, 0).unwrap();
        }
        assert_eq!(enc.df(), 3);
        assert_eq!(enc.total_tf(), 6);
        assert_eq!(enc.total_doc_len(), 30);
        assert_eq!(enc.current_tf(), 0);
    }

    #[test]
    fn test_decoder_sees_unflushed_block() {
        let mut enc = encoder();
        for doc in [2u32, 4, 9] {
            enc.add_position();
            enc.end_document(doc, 1, 0).unwrap();
        }
        let mut dec = enc.in_mem_decoder();
        assert_eq!(dec.next_posting(), Some((2, 1)));
        assert_eq!(dec.next_posting(), Some((4, 1)));
        assert_eq!(dec.next_posting(), Some((9, 1)));
        assert_eq!(dec.next_posting(), None);
    }

    #[test]
    fn test_decoder_across_flushed_blocks() {
        let mut enc = encoder();
        let n = config::POSTING_BLOCK_CAPACITY as u32 * 2 + 17;
        for doc in 1..=n {
            enc.add_position();
            enc.end_document(doc, 1, 0).unwrap();
        }
        let mut dec = enc.in_mem_decoder();
        for doc in 1..=n {
            assert_eq!(dec.next_posting(), Some((doc, 1)));
        }
        assert_eq!(dec.next_posting(), None);
    }

    #[test]
    fn test_seek_uses_skiplist() {
        let mut enc = encoder();
        let n = config::POSTING_BLOCK_CAPACITY as u32 * 3;
        for doc in (2..=n * 2).step_by(2) {
            enc.add_position();
            enc.end_document(doc, 1, 0).unwrap();
        }
        enc.flush().unwrap();
        let mut dec = enc.in_mem_decoder();
        // Seek to an absent odd id lands on the next even one.
        assert_eq!(dec.seek(n + 1), Some((n + 2, 1)));
        // Seeks advance the cursor; the next one continues forward.
        assert_eq!(dec.seek(n + 4), Some((n + 4, 1)));
        assert_eq!(dec.seek(n * 2 + 1), None);
    }

    #[test]
    fn test_spill_dump_load_roundtrip() {
        let mut enc = encoder();
        for doc in [1u32, 3, 5, 7, 9] {
            for _ in 0..3 {
                enc.add_position();
            }
            enc.end_document(doc, 10, 0).unwrap();
        }
        enc.flush().unwrap();
        let mut dump = Vec::new();
        enc.dump(&mut dump, true).unwrap();

        let mut restored = encoder();
        restored.load(&mut std::io::Cursor::new(dump)).unwrap();
        assert_eq!(restored.df(), 5);
        assert_eq!(restored.total_tf(), 15);

        // The restored encoder continues the stream.
        restored.add_position();
        restored.end_document(10, 10, 0).unwrap();
        let mut dec = restored.in_mem_decoder();
        let mut docs = Vec::new();
        while let Some((d, _)) = dec.next_posting() {
            docs.push(d);
        }
        assert_eq!(docs, vec![1, 3, 5, 7, 9, 10]);
    }

    #[test]
    fn test_dump_length_matches() {
        let mut enc = encoder();
        for doc in 1..=300u32 {
            enc.add_position();
            enc.end_document(doc, 1, 0).unwrap();
        }
        enc.flush().unwrap();
        let mut dump = Vec::new();
        enc.dump(&mut dump, false).unwrap();
        assert_eq!(dump.len(), enc.dump_length());
    }

    #[test]
    #[should_panic(expected = "strictly increase")]
    #[cfg(debug_assertions)]
    fn test_non_monotonic_doc_id_panics() {
        let mut enc = encoder();
        enc.end_document(5, 1, 0).unwrap();
        let _ = enc.end_document(5, 1, 0);
    }
}
