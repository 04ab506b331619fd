//! Pool allocators feeding the posting encoders.
//!
//! A [`ByteSlicePool`] hands out fixed-size chunks against a byte budget;
//! posting buffers chain those chunks into an append-only stream. A
//! [`RecyclePool`] recycles the block scratch arrays the encoders fill
//! between flushes. Both pools are owned by the enclosing table-index entry
//! and borrowed (`Arc`) by every posting writer built for it.

use crate::config;
use crate::status::Status;
use parking_lot::Mutex;
use std::sync::Arc;

/// Budgeted allocator for the byte chunks backing posting buffers.
///
/// Exhausting the budget is a build-fatal condition: the caller propagates
/// the status and the transaction rolls the segment build back.
pub struct ByteSlicePool {
    chunk_size: usize,
    budget: usize,
    allocated: Mutex<usize>,
}

impl ByteSlicePool {
    pub fn new(budget: usize) -> Self {
        ByteSlicePool {
            chunk_size: config::BYTE_SLICE_CHUNK_BYTES,
            budget,
            allocated: Mutex::new(0),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Allocate one chunk, or fail when the budget is exhausted.
    pub fn allocate_chunk(&self) -> Result<Vec<u8>, Status> {
        let mut allocated = self.allocated.lock();
        if *allocated + self.chunk_size > self.budget {
            return Err(Status::pool_exhausted(self.chunk_size, self.budget));
        }
        *allocated += self.chunk_size;
        Ok(Vec::with_capacity(self.chunk_size))
    }

    /// Return budget for `n` chunks. Called when a posting buffer drops.
    pub fn release_chunks(&self, n: usize) {
        let mut allocated = self.allocated.lock();
        *allocated = allocated.saturating_sub(n * self.chunk_size);
    }

    pub fn allocated_bytes(&self) -> usize {
        *self.allocated.lock()
    }
}

/// Recycler for the fixed-capacity `u32` scratch arrays used by encoder
/// blocks. Keeps at most [`config::RECYCLE_POOL_CAPACITY`] buffers.
pub struct RecyclePool {
    buffers: Mutex<Vec<Vec<u32>>>,
}

impl RecyclePool {
    pub fn new() -> Self {
        RecyclePool {
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Take a cleared scratch buffer with at least `capacity` slots.
    pub fn get(&self, capacity: usize) -> Vec<u32> {
        let mut buffers = self.buffers.lock();
        match buffers.pop() {
            Some(mut buf) => {
                buf.clear();
                buf.reserve(capacity.saturating_sub(buf.capacity()));
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Return a scratch buffer for reuse.
    pub fn put(&self, buf: Vec<u32>) {
        let mut buffers = self.buffers.lock();
        if buffers.len() < config::RECYCLE_POOL_CAPACITY {
            buffers.push(buf);
        }
    }

    pub fn retained(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl Default for RecyclePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Growable byte stream backed by pool-allocated chunks.
///
/// Full chunks are frozen behind `Arc` so in-memory decoders can snapshot
/// the chain while the tail keeps growing; the snapshot stays valid for the
/// decoder's lifetime without copying the frozen part.
pub struct PostingBuffer {
    pool: Arc<ByteSlicePool>,
    frozen: Vec<Arc<Vec<u8>>>,
    tail: Vec<u8>,
    len: usize,
}

impl PostingBuffer {
    pub fn new(pool: Arc<ByteSlicePool>) -> Result<Self, Status> {
        let tail = pool.allocate_chunk()?;
        Ok(PostingBuffer {
            pool,
            frozen: Vec::new(),
            tail,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), Status> {
        let chunk_size = self.pool.chunk_size();
        while !bytes.is_empty() {
            let room = chunk_size - self.tail.len();
            if room == 0 {
                let full = std::mem::replace(&mut self.tail, self.pool.allocate_chunk()?);
                self.frozen.push(Arc::new(full));
                continue;
            }
            let take = room.min(bytes.len());
            self.tail.extend_from_slice(&bytes[..take]);
            self.len += take;
            bytes = &bytes[take..];
        }
        Ok(())
    }

    /// Append a varint-encoded `u32`.
    pub fn write_vu32(&mut self, value: u32) -> Result<(), Status> {
        let mut scratch = [0u8; 5];
        let n = crate::posting::varint::encode_u32(value, &mut scratch);
        self.write_all(&scratch[..n])
    }

    /// Append a varint-encoded `u64`.
    pub fn write_vu64(&mut self, value: u64) -> Result<(), Status> {
        let mut scratch = [0u8; 10];
        let n = crate::posting::varint::encode_u64(value, &mut scratch);
        self.write_all(&scratch[..n])
    }

    /// Snapshot the current contents for an in-memory decoder.
    pub fn snapshot(&self) -> PostingBufferSnapshot {
        PostingBufferSnapshot {
            frozen: self.frozen.clone(),
            tail: self.tail.clone(),
            len: self.len,
        }
    }

    /// Write the whole stream to `w`.
    pub fn dump_to<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        for chunk in &self.frozen {
            w.write_all(chunk)?;
        }
        w.write_all(&self.tail)
    }
}

impl Drop for PostingBuffer {
    fn drop(&mut self) {
        self.pool.release_chunks(self.frozen.len() + 1);
    }
}

/// Immutable view over a posting buffer's chunk chain.
#[derive(Clone)]
pub struct PostingBufferSnapshot {
    frozen: Vec<Arc<Vec<u8>>>,
    tail: Vec<u8>,
    len: usize,
}

impl PostingBufferSnapshot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reader(&self) -> SnapshotReader<'_> {
        SnapshotReader {
            snapshot: self,
            chunk: 0,
            offset: 0,
            consumed: 0,
        }
    }

    fn chunk(&self, idx: usize) -> &[u8] {
        if idx < self.frozen.len() {
            &self.frozen[idx]
        } else {
            &self.tail
        }
    }

    fn chunk_count(&self) -> usize {
        self.frozen.len() + 1
    }
}

/// Sequential reader over a [`PostingBufferSnapshot`].
pub struct SnapshotReader<'a> {
    snapshot: &'a PostingBufferSnapshot,
    chunk: usize,
    offset: usize,
    consumed: usize,
}

impl<'a> SnapshotReader<'a> {
    /// Bytes consumed so far (the logical stream offset).
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Jump to a logical stream offset.
    pub fn seek(&mut self, offset: usize) {
        let mut remaining = offset.min(self.snapshot.len);
        self.consumed = remaining;
        self.chunk = 0;
        self.offset = 0;
        while self.chunk < self.snapshot.chunk_count() {
            let chunk_len = self.snapshot.chunk(self.chunk).len();
            if remaining < chunk_len {
                self.offset = remaining;
                return;
            }
            remaining -= chunk_len;
            self.chunk += 1;
        }
        self.offset = remaining;
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        while self.chunk < self.snapshot.chunk_count() {
            let chunk = self.snapshot.chunk(self.chunk);
            if self.offset < chunk.len() {
                let b = chunk[self.offset];
                self.offset += 1;
                self.consumed += 1;
                return Some(b);
            }
            self.chunk += 1;
            self.offset = 0;
        }
        None
    }

    pub fn read_vu32(&mut self) -> Option<u32> {
        crate::posting::varint::decode_u32_from(|| self.read_byte())
    }

    pub fn read_vu64(&mut self) -> Option<u64> {
        crate::posting::varint::decode_u64_from(|| self.read_byte())
    }
}
