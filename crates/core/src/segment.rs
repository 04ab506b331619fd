//! Segment storage: the append-mostly row store index builds read from.
//!
//! A table is horizontally partitioned into segments; each segment holds
//! fixed-capacity data blocks of committed rows with per-row commit and
//! delete timestamps. Index construction consumes segments read-only
//! through block iteration; the engine's scan path reads them the same way.

use crate::config;
use crate::data_block::ColumnVector;
use crate::status::Status;
use crate::types::{ColumnDef, SegmentId, TxnTimestamp, Value};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// One data block: a column vector per table column plus row-level
/// timestamps.
#[derive(Debug)]
pub struct BlockEntry {
    pub columns: Vec<ColumnVector>,
    pub row_commit_ts: Vec<TxnTimestamp>,
    /// `0` while the row is live; the deleting transaction's commit
    /// timestamp afterwards.
    pub row_delete_ts: Vec<TxnTimestamp>,
}

impl BlockEntry {
    fn new(column_defs: &[Arc<ColumnDef>]) -> Self {
        BlockEntry {
            columns: column_defs
                .iter()
                .map(|c| ColumnVector::for_type(&c.data_type))
                .collect(),
            row_commit_ts: Vec::new(),
            row_delete_ts: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_commit_ts.len()
    }

    /// Row visibility at `read_ts`: committed no later than the read
    /// timestamp and not deleted by then.
    pub fn row_visible(&self, row: usize, read_ts: TxnTimestamp) -> bool {
        self.row_commit_ts[row] <= read_ts
            && (self.row_delete_ts[row] == 0 || self.row_delete_ts[row] > read_ts)
    }
}

/// Interior of a segment, guarded by the segment's rw-lock.
#[derive(Debug, Default)]
pub struct SegmentData {
    pub blocks: Vec<BlockEntry>,
    pub row_count: usize,
}

impl SegmentData {
    pub fn get_value(&self, column: usize, row_offset: usize) -> Value {
        let block = &self.blocks[row_offset / config::BLOCK_CAPACITY];
        block.columns[column].get(row_offset % config::BLOCK_CAPACITY)
    }

    pub fn row_visible(&self, row_offset: usize, read_ts: TxnTimestamp) -> bool {
        let block = &self.blocks[row_offset / config::BLOCK_CAPACITY];
        block.row_visible(row_offset % config::BLOCK_CAPACITY, read_ts)
    }

    pub fn set_value(&mut self, column: usize, row_offset: usize, value: Value) -> Result<(), Status> {
        let block = &mut self.blocks[row_offset / config::BLOCK_CAPACITY];
        block.columns[column].set(row_offset % config::BLOCK_CAPACITY, value)
    }

    pub fn mark_deleted(&mut self, row_offset: usize, delete_ts: TxnTimestamp) {
        let block = &mut self.blocks[row_offset / config::BLOCK_CAPACITY];
        block.row_delete_ts[row_offset % config::BLOCK_CAPACITY] = delete_ts;
    }

    pub fn bump_commit_ts(&mut self, row_offset: usize, commit_ts: TxnTimestamp) {
        let block = &mut self.blocks[row_offset / config::BLOCK_CAPACITY];
        block.row_commit_ts[row_offset % config::BLOCK_CAPACITY] = commit_ts;
    }
}

/// One segment of a table.
#[derive(Debug)]
pub struct SegmentEntry {
    pub segment_id: SegmentId,
    pub capacity: usize,
    inner: RwLock<SegmentData>,
}

impl SegmentEntry {
    pub fn new(segment_id: SegmentId) -> Self {
        SegmentEntry {
            segment_id,
            capacity: config::SEGMENT_CAPACITY,
            inner: RwLock::new(SegmentData::default()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SegmentData> {
        self.inner.read()
    }

    pub fn row_count(&self) -> usize {
        self.inner.read().row_count
    }

    pub fn is_full(&self) -> bool {
        self.row_count() >= self.capacity
    }

    /// Append rows until this segment is full; returns how many were taken.
    /// Values must already be cast to the column types.
    pub fn append_rows(
        &self,
        rows: &[Vec<Value>],
        column_defs: &[Arc<ColumnDef>],
        commit_ts: TxnTimestamp,
    ) -> Result<usize, Status> {
        let mut data = self.inner.write();
        let room = self.capacity.saturating_sub(data.row_count);
        let take = room.min(rows.len());
        for row in &rows[..take] {
            if row.len() != column_defs.len() {
                return Err(Status::column_count_mismatch(format!(
                    "expect: {}, actual: {}",
                    column_defs.len(),
                    row.len()
                )));
            }
            if data
                .blocks
                .last()
                .map_or(true, |b| b.row_count() >= config::BLOCK_CAPACITY)
            {
                data.blocks.push(BlockEntry::new(column_defs));
            }
            let block = data.blocks.last_mut().expect("block just ensured");
            for (column, value) in block.columns.iter_mut().zip(row.iter()) {
                column.push(value.clone())?;
            }
            block.row_commit_ts.push(commit_ts);
            block.row_delete_ts.push(0);
            data.row_count += 1;
        }
        Ok(take)
    }

    /// Apply `f` to the segment's interior under its write lock.
    pub fn with_write<T>(&self, f: impl FnOnce(&mut SegmentData) -> T) -> T {
        f(&mut self.inner.write())
    }
}

/// Read-only listing of the segments an index build covers.
#[derive(Debug, Default)]
pub struct BlockIndex {
    pub segments: Vec<Arc<SegmentEntry>>,
}
