//! Per-segment index materialization.
//!
//! A [`SegmentIndexEntry`] realizes one segment of one table index: it owns
//! the file workers for vector and secondary indexes, the in-memory posting
//! memtable for full-text, and the immutable [`ChunkIndexEntry`] flush
//! generations. Builds run offline (`populate_entirely`), online with
//! timestamp gating (`create_index_prepare`), or cooperatively in the
//! background (`create_index_do` with a shared progress counter).

use crate::catalog::entry::{BaseEntry, EntryKind};
use crate::catalog::file_worker::{check_ivf_element, IndexFileWorker};
use crate::catalog::index_base::{IndexBase, IndexType};
use crate::catalog::table_index::TableIndexEntry;
use crate::config;
use crate::fulltext::analyze;
use crate::posting::{
    CountingWriter, InMemPostingDecoder, PostingFormatOption, PostingWriter, TermMeta,
};
use crate::segment::SegmentEntry;
use crate::status::{unrecoverable, Status};
use crate::txn::Txn;
use crate::types::{ChunkId, ColumnDef, DataType, DocId, SegmentId, TxnTimestamp, Value};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Sizing parameters for one segment build, derived from the index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexParam {
    IvfFlat { row_count: usize },
    Hnsw { max_element: usize },
    FullText,
    Secondary { row_count: usize, part_capacity: usize },
}

/// Derive the build parameters for a segment with `seg_row_count` rows.
pub fn get_create_index_param(index_base: &IndexBase, seg_row_count: usize) -> CreateIndexParam {
    match index_base.index_type {
        IndexType::IvfFlat => CreateIndexParam::IvfFlat {
            row_count: seg_row_count,
        },
        IndexType::Hnsw => CreateIndexParam::Hnsw {
            max_element: seg_row_count,
        },
        IndexType::FullText => CreateIndexParam::FullText,
        IndexType::Secondary => CreateIndexParam::Secondary {
            row_count: seg_row_count,
            part_capacity: config::SECONDARY_PART_CAPACITY,
        },
    }
}

/// An immutable memory-dumped chunk: one flush generation of a segment's
/// full-text memtable.
#[derive(Debug)]
pub struct ChunkIndexEntry {
    pub chunk_id: ChunkId,
    pub row_count: u32,
    pub term_metas: HashMap<String, TermMeta>,
    pub path: PathBuf,
}

impl ChunkIndexEntry {
    pub fn serialize(&self) -> serde_json::Value {
        json!({
            "chunk_id": self.chunk_id,
            "row_count": self.row_count,
            "path": self.path.to_string_lossy(),
            "term_metas": serde_json::to_value(&self.term_metas)
                .expect("term meta serialization is infallible"),
        })
    }

    pub fn deserialize(value: &serde_json::Value) -> Result<Self, Status> {
        let malformed = || Status::syntax_error("malformed chunk index entry");
        Ok(ChunkIndexEntry {
            chunk_id: value["chunk_id"].as_u64().ok_or_else(malformed)?,
            row_count: value["row_count"].as_u64().ok_or_else(malformed)? as u32,
            path: PathBuf::from(value["path"].as_str().ok_or_else(malformed)?),
            term_metas: serde_json::from_value(value["term_metas"].clone())
                .map_err(|_| malformed())?,
        })
    }
}

/// In-memory posting tables of the unsealed segment.
pub struct FulltextMemtable {
    postings: BTreeMap<String, PostingWriter>,
    /// Per-document analyzed length, shared with every posting writer.
    column_lengths: Arc<RwLock<Vec<u32>>>,
    /// Rows ingested so far; also the next doc id.
    next_row: u32,
}

impl FulltextMemtable {
    fn new() -> Self {
        FulltextMemtable {
            postings: BTreeMap::new(),
            column_lengths: Arc::new(RwLock::new(Vec::new())),
            next_row: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Analyze and ingest one document.
    fn ingest(
        &mut self,
        doc_id: DocId,
        text: &str,
        table_index: &TableIndexEntry,
    ) -> Result<(), Status> {
        let analyzed = analyze(text);
        {
            let mut lengths = self.column_lengths.write();
            if lengths.len() <= doc_id as usize {
                lengths.resize(doc_id as usize + 1, 0);
            }
            lengths[doc_id as usize] = analyzed.len() as u32;
        }

        let mut term_positions: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for (token, position) in analyzed.iter() {
            term_positions.entry(token).or_default().push(position);
        }
        for (term, positions) in term_positions {
            if !self.postings.contains_key(term) {
                let writer = PostingWriter::new(
                    table_index.byte_slice_pool(),
                    table_index.buffer_pool(),
                    PostingFormatOption::default(),
                    self.column_lengths.clone(),
                )?;
                self.postings.insert(term.to_string(), writer);
            }
            let writer = self.postings.get_mut(term).expect("posting just ensured");
            for pos in positions {
                writer.add_position(pos);
            }
            writer.end_document(doc_id, 0)?;
        }
        Ok(())
    }
}

/// Interior state guarded by the entry's rw-lock.
struct SegmentIndexInner {
    chunks: Vec<Arc<ChunkIndexEntry>>,
    file_workers: Vec<IndexFileWorker>,
    memtable: Option<FulltextMemtable>,
    /// Segment attached at prepare time; consumed by `create_index_do` and
    /// `mem_index_commit`.
    segment: Option<Arc<SegmentEntry>>,
    /// Snapshot gate for the online build path.
    check_ts: bool,
    snapshot_ts: TxnTimestamp,
    next_chunk_id: ChunkId,
    cleaned: bool,
}

/// One segment's realization of a table index.
pub struct SegmentIndexEntry {
    pub segment_id: SegmentId,
    base: BaseEntry,
    table_index: Weak<TableIndexEntry>,
    inner: RwLock<SegmentIndexInner>,
}

impl SegmentIndexEntry {
    /// Construct a fresh entry with its file workers.
    pub fn new_index_entry(
        table_index: &Arc<TableIndexEntry>,
        segment_id: SegmentId,
        txn: &Txn,
        param: CreateIndexParam,
    ) -> Result<Arc<Self>, Status> {
        let file_workers = create_file_workers(
            table_index.index_base(),
            table_index.column_def(),
            table_index.index_dir(),
            segment_id,
            param,
        )?;
        Ok(Arc::new(SegmentIndexEntry {
            segment_id,
            base: BaseEntry::new(EntryKind::SegmentIndex, txn.txn_id, txn.begin_ts, false),
            table_index: Arc::downgrade(table_index),
            inner: RwLock::new(SegmentIndexInner {
                chunks: Vec::new(),
                file_workers,
                memtable: None,
                segment: None,
                check_ts: false,
                snapshot_ts: 0,
                next_chunk_id: 0,
                cleaned: false,
            }),
        }))
    }

    /// Replay constructor for catalog recovery.
    pub fn replay(
        table_index: &Arc<TableIndexEntry>,
        segment_id: SegmentId,
        txn_id: u64,
        begin_ts: TxnTimestamp,
        commit_ts: TxnTimestamp,
        chunks: Vec<Arc<ChunkIndexEntry>>,
    ) -> Arc<Self> {
        let next_chunk_id = chunks.iter().map(|c| c.chunk_id + 1).max().unwrap_or(0);
        Arc::new(SegmentIndexEntry {
            segment_id,
            base: BaseEntry::replay(EntryKind::SegmentIndex, txn_id, begin_ts, commit_ts, false),
            table_index: Arc::downgrade(table_index),
            inner: RwLock::new(SegmentIndexInner {
                chunks,
                file_workers: Vec::new(),
                memtable: None,
                segment: None,
                check_ts: false,
                snapshot_ts: 0,
                next_chunk_id,
                cleaned: false,
            }),
        })
    }

    fn parent(&self) -> Arc<TableIndexEntry> {
        match self.table_index.upgrade() {
            Some(parent) => parent,
            None => unrecoverable("segment index entry outlived its table index entry"),
        }
    }

    pub fn commit(&self, commit_ts: TxnTimestamp) {
        self.base.commit(commit_ts);
    }

    pub fn commit_ts(&self) -> TxnTimestamp {
        self.base.commit_ts()
    }

    pub fn txn_id(&self) -> u64 {
        self.base.txn_id
    }

    pub fn begin_ts(&self) -> TxnTimestamp {
        self.base.begin_ts
    }

    /// Offline build: index every committed row of `segment`, then attach
    /// the segment for later memtable appends.
    pub fn populate_entirely(
        &self,
        segment: &Arc<SegmentEntry>,
        _txn: &Txn,
    ) -> Result<(), Status> {
        {
            let mut inner = self.inner.write();
            inner.segment = Some(segment.clone());
            inner.check_ts = false;
            inner.snapshot_ts = TxnTimestamp::MAX;
        }
        let block_count = segment.read().blocks.len();
        for block_idx in 0..block_count {
            self.build_block(block_idx)?;
        }
        Ok(())
    }

    /// Online build with timestamp gating. With `prepare`, only the segment
    /// attachment happens here and `create_index_do` performs the work.
    pub fn create_index_prepare(
        &self,
        segment: &Arc<SegmentEntry>,
        txn: &Txn,
        prepare: bool,
        check_ts: bool,
    ) -> Result<(), Status> {
        {
            let mut inner = self.inner.write();
            inner.segment = Some(segment.clone());
            inner.check_ts = check_ts;
            inner.snapshot_ts = txn.begin_ts;
        }
        if !prepare {
            let block_count = segment.read().blocks.len();
            for block_idx in 0..block_count {
                self.build_block(block_idx)?;
            }
        }
        Ok(())
    }

    /// Cooperative background phase: workers claim block indexes from the
    /// shared counter until every block of the prepared segment is built.
    ///
    /// Full-text ingestion is doc-id-order-dependent, so the worker that
    /// wins the first claim builds the whole segment sequentially; vector
    /// and secondary blocks carry explicit row labels and build in any
    /// order.
    pub fn create_index_do(&self, progress: &AtomicU64) -> Result<(), Status> {
        let block_count = {
            let inner = self.inner.read();
            match &inner.segment {
                Some(segment) => segment.read().blocks.len(),
                None => 0,
            }
        };
        if self.parent().index_type() == IndexType::FullText {
            if progress.fetch_add(1, Ordering::AcqRel) == 0 {
                for block_idx in 0..block_count {
                    self.build_block(block_idx)?;
                }
            }
            return Ok(());
        }
        loop {
            let block_idx = progress.fetch_add(1, Ordering::AcqRel) as usize;
            if block_idx >= block_count {
                return Ok(());
            }
            self.build_block(block_idx)?;
        }
    }

    /// Index one block of the attached segment.
    fn build_block(&self, block_idx: usize) -> Result<(), Status> {
        let parent = self.parent();
        let column_id = parent.column_id()?;
        let index_type = parent.index_type();

        let mut inner = self.inner.write();
        let segment = match inner.segment.clone() {
            Some(s) => s,
            None => return Ok(()),
        };
        let check_ts = inner.check_ts;
        let snapshot_ts = inner.snapshot_ts;

        let data = segment.read();
        let block = match data.blocks.get(block_idx) {
            Some(b) => b,
            None => return Ok(()),
        };
        let base_offset = block_idx * config::BLOCK_CAPACITY;
        for row in 0..block.row_count() {
            let commit_ts = block.row_commit_ts[row];
            if commit_ts == 0 || (check_ts && commit_ts > snapshot_ts) {
                continue;
            }
            if block.row_delete_ts[row] != 0 {
                continue;
            }
            let row_offset = base_offset + row;
            let value = block.columns[column_id].get(row);
            match index_type {
                IndexType::FullText => {
                    let text = match &value {
                        Value::Varchar(s) => s.as_str(),
                        _ => continue,
                    };
                    let memtable = inner.memtable.get_or_insert_with(FulltextMemtable::new);
                    // Rows arrive in offset order within the cooperative
                    // build, so doc ids stay monotonic per block claim.
                    memtable.ingest(row_offset as DocId, text, &parent)?;
                    memtable.next_row = memtable.next_row.max(row_offset as u32 + 1);
                }
                IndexType::Hnsw | IndexType::IvfFlat => {
                    let vector = block.columns[column_id]
                        .embedding_f32_owned(row)
                        .ok_or_else(|| {
                            Status::not_support("vector index over a non-f32 embedding column")
                        })?;
                    if let Some(worker) = inner.file_workers.first_mut() {
                        worker.add_vector(row_offset as u32, &vector)?;
                    }
                }
                IndexType::Secondary => {
                    let part_capacity = config::SECONDARY_PART_CAPACITY;
                    let part = row_offset / part_capacity + 1;
                    let key = secondary_key_bytes(&value);
                    if let Some(worker) = inner.file_workers.get_mut(part) {
                        worker.add_key(&key, row_offset as u32)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Bind the backing segment if none is attached yet (append path).
    pub fn attach_segment(&self, segment: &Arc<SegmentEntry>) {
        let mut inner = self.inner.write();
        if inner.segment.is_none() {
            inner.segment = Some(segment.clone());
            inner.snapshot_ts = TxnTimestamp::MAX;
        }
    }

    /// Apply rows appended to the attached segment since the last call to
    /// the full-text memtable. No-op for other index types.
    pub fn mem_index_commit(&self) -> Result<(), Status> {
        let parent = self.parent();
        if parent.index_type() != IndexType::FullText {
            return Ok(());
        }
        let column_id = parent.column_id()?;

        let mut inner = self.inner.write();
        let segment = match inner.segment.clone() {
            Some(s) => s,
            None => return Ok(()),
        };
        let data = segment.read();
        let memtable = inner.memtable.get_or_insert_with(FulltextMemtable::new);
        let start = memtable.next_row as usize;
        for row_offset in start..data.row_count {
            if let Value::Varchar(text) = data.get_value(column_id, row_offset) {
                memtable.ingest(row_offset as DocId, &text, &parent)?;
            }
            memtable.next_row = row_offset as u32 + 1;
        }
        Ok(())
    }

    /// Promote the in-memory posting tables to an immutable chunk. Returns
    /// `None` when there is nothing to dump.
    pub fn mem_index_dump(&self, spill: bool) -> Result<Option<Arc<ChunkIndexEntry>>, Status> {
        let parent = self.parent();
        let mut inner = self.inner.write();
        let memtable = match inner.memtable.take() {
            Some(m) if !m.is_empty() => m,
            other => {
                inner.memtable = other;
                return Ok(None);
            }
        };

        let chunk_id = inner.next_chunk_id;
        inner.next_chunk_id += 1;
        let dir = parent.index_dir().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Status::io_error(&e))?;
        let path = dir.join(format!("{}_{}", self.segment_id, chunk_id));

        let file = fs::File::create(&path).map_err(|e| Status::io_error(&e))?;
        let mut writer = CountingWriter::new(BufWriter::new(file));
        let mut term_metas = HashMap::with_capacity(memtable.postings.len());
        let mut postings = memtable.postings;
        for (term, posting) in postings.iter_mut() {
            posting.end_segment()?;
            let mut term_meta = TermMeta::default();
            posting
                .dump(&mut writer, &mut term_meta, spill)
                .map_err(|e| Status::io_error(&e))?;
            term_metas.insert(term.clone(), term_meta);
        }

        let chunk = Arc::new(ChunkIndexEntry {
            chunk_id,
            row_count: memtable.next_row,
            term_metas,
            path,
        });
        inner.chunks.push(chunk.clone());
        tracing::info!(
            segment_id = self.segment_id,
            chunk_id,
            terms = chunk.term_metas.len(),
            "dumped memtable chunk"
        );
        Ok(Some(chunk))
    }

    /// Write every file worker's buffer to disk. Called at commit.
    pub fn save_index_file(&self) -> Result<(), Status> {
        let inner = self.inner.read();
        for worker in &inner.file_workers {
            worker.save().map_err(|e| Status::io_error(&e))?;
        }
        Ok(())
    }

    /// Release buffers and remove files. Idempotent.
    pub fn cleanup(&self) {
        let mut inner = self.inner.write();
        if inner.cleaned {
            return;
        }
        inner.cleaned = true;
        inner.memtable = None;
        for worker in &inner.file_workers {
            if let Err(e) = worker.cleanup() {
                tracing::warn!(
                    "failed to remove index file {:?}: {}",
                    worker.file_name(),
                    e
                );
            }
        }
        for chunk in &inner.chunks {
            if let Err(e) = fs::remove_file(&chunk.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("failed to remove chunk {:?}: {}", chunk.path, e);
                }
            }
        }
        inner.chunks.clear();
        tracing::debug!(segment_id = self.segment_id, "segment index cleaned up");
    }

    /// Number of immutable chunks.
    pub fn chunk_count(&self) -> usize {
        self.inner.read().chunks.len()
    }

    /// In-memory decoders for `terms` plus corpus statistics, for the
    /// match evaluator. `None` when no memtable exists.
    pub fn fulltext_reader(&self, terms: &[String]) -> Option<FulltextReader> {
        let inner = self.inner.read();
        let memtable = inner.memtable.as_ref()?;
        let decoders = terms
            .iter()
            .filter_map(|t| memtable.postings.get(t.as_str()))
            .map(|w| w.in_mem_decoder())
            .collect();
        let reader = FulltextReader {
            decoders,
            doc_lengths: memtable.column_lengths.read().clone(),
            doc_count: memtable.next_row,
        };
        Some(reader)
    }

    pub fn serialize(&self) -> serde_json::Value {
        let inner = self.inner.read();
        json!({
            "segment_id": self.segment_id,
            "txn_id": self.base.txn_id,
            "begin_ts": self.base.begin_ts,
            "commit_ts": self.commit_ts(),
            "chunks": inner.chunks.iter().map(|c| c.serialize()).collect::<Vec<_>>(),
        })
    }

    pub fn deserialize(
        value: &serde_json::Value,
        table_index: &Arc<TableIndexEntry>,
    ) -> Result<Arc<Self>, Status> {
        let malformed = || Status::syntax_error("malformed segment index entry");
        let chunks = value["chunks"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(ChunkIndexEntry::deserialize)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .map(Arc::new)
            .collect();
        Ok(SegmentIndexEntry::replay(
            table_index,
            value["segment_id"].as_u64().ok_or_else(malformed)?,
            value["txn_id"].as_u64().ok_or_else(malformed)?,
            value["begin_ts"].as_u64().ok_or_else(malformed)?,
            value["commit_ts"].as_u64().ok_or_else(malformed)?,
            chunks,
        ))
    }
}

/// Snapshot handed to the match evaluator: term decoders plus corpus stats.
pub struct FulltextReader {
    pub decoders: Vec<InMemPostingDecoder>,
    pub doc_lengths: Vec<u32>,
    pub doc_count: u32,
}

/// Build the file workers for one segment, keyed on the index type.
fn create_file_workers(
    index_base: &IndexBase,
    column_def: Option<&Arc<ColumnDef>>,
    index_dir: &std::path::Path,
    segment_id: SegmentId,
    param: CreateIndexParam,
) -> Result<Vec<IndexFileWorker>, Status> {
    // Full-text writes through the posting writers, not a buffer-managed
    // file worker.
    if index_base.index_type == IndexType::FullText {
        return Ok(Vec::new());
    }
    let column_def = column_def.ok_or_else(|| Status::invalid_data_type())?;
    let file_name = segment_id.to_string();

    match param {
        CreateIndexParam::IvfFlat { row_count } => {
            let (element, dimension) = embedding_info(column_def)?;
            check_ivf_element(element)?;
            Ok(vec![IndexFileWorker::IvfFlat {
                dir: index_dir.to_path_buf(),
                file_name,
                dimension,
                row_count,
                buffer: Vec::new(),
            }])
        }
        CreateIndexParam::Hnsw { max_element } => {
            let (_, dimension) = embedding_info(column_def)?;
            Ok(vec![IndexFileWorker::Hnsw {
                dir: index_dir.to_path_buf(),
                file_name,
                dimension,
                max_element,
                buffer: Vec::new(),
            }])
        }
        CreateIndexParam::Secondary {
            row_count,
            part_capacity,
        } => {
            let part_num = row_count.div_ceil(part_capacity);
            let mut workers = Vec::with_capacity(part_num + 1);
            workers.push(IndexFileWorker::Secondary {
                dir: index_dir.to_path_buf(),
                file_name: file_name.clone(),
                part_id: 0,
                row_count,
                part_capacity,
                buffer: Vec::new(),
            });
            for i in 1..=part_num {
                workers.push(IndexFileWorker::Secondary {
                    dir: index_dir.to_path_buf(),
                    file_name: format!("{file_name}_part{i}"),
                    part_id: i as u32,
                    row_count,
                    part_capacity,
                    buffer: Vec::new(),
                });
            }
            Ok(workers)
        }
        CreateIndexParam::FullText => Ok(Vec::new()),
    }
}

fn embedding_info(column_def: &ColumnDef) -> Result<(crate::types::EmbeddingElementType, usize), Status> {
    match &column_def.data_type {
        DataType::Embedding { element, dimension } => Ok((*element, *dimension)),
        _ => Err(Status::invalid_data_type()),
    }
}

/// Order-preserving key encoding for secondary index parts.
fn secondary_key_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Boolean(b) => vec![*b as u8],
        Value::TinyInt(v) => ((*v as u8) ^ 0x80).to_be_bytes().to_vec(),
        Value::SmallInt(v) => ((*v as u16) ^ 0x8000).to_be_bytes().to_vec(),
        Value::Integer(v) => ((*v as u32) ^ 0x8000_0000).to_be_bytes().to_vec(),
        Value::BigInt(v) => ((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes().to_vec(),
        Value::Float(v) => order_f64(*v as f64),
        Value::Double(v) => order_f64(*v),
        Value::Varchar(s) => s.as_bytes().to_vec(),
        _ => Vec::new(),
    }
}

fn order_f64(v: f64) -> Vec<u8> {
    let bits = v.to_bits();
    let ordered = if bits >> 63 == 0 {
        bits ^ 0x8000_0000_0000_0000
    } else {
        !bits
    };
    ordered.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmbeddingElementType;

    fn embedding_col() -> Arc<ColumnDef> {
        Arc::new(ColumnDef::new(
            1,
            "v",
            DataType::Embedding {
                element: EmbeddingElementType::Float32,
                dimension: 4,
            },
        ))
    }

    #[test]
    fn test_param_derivation() {
        let hnsw = IndexBase::new("i", IndexType::Hnsw, vec!["v".into()], Vec::new());
        assert_eq!(
            get_create_index_param(&hnsw, 500),
            CreateIndexParam::Hnsw { max_element: 500 }
        );
        let ft = IndexBase::new("i", IndexType::FullText, vec!["t".into()], Vec::new());
        assert_eq!(get_create_index_param(&ft, 500), CreateIndexParam::FullText);
    }

    #[test]
    fn test_fulltext_has_no_file_worker() {
        let base = IndexBase::new("ft", IndexType::FullText, vec!["t".into()], Vec::new());
        let workers = create_file_workers(
            &base,
            None,
            std::path::Path::new("/tmp/x"),
            0,
            CreateIndexParam::FullText,
        )
        .unwrap();
        assert!(workers.is_empty());
    }

    #[test]
    fn test_hnsw_single_worker() {
        let base = IndexBase::new("ann", IndexType::Hnsw, vec!["v".into()], Vec::new());
        let col = embedding_col();
        let workers = create_file_workers(
            &base,
            Some(&col),
            std::path::Path::new("/tmp/x"),
            7,
            CreateIndexParam::Hnsw { max_element: 123 },
        )
        .unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].file_name(), "7");
    }

    #[test]
    fn test_secondary_part_count() {
        let base = IndexBase::new("sec", IndexType::Secondary, vec!["a".into()], Vec::new());
        let col = Arc::new(ColumnDef::new(0, "a", DataType::Integer));
        let workers = create_file_workers(
            &base,
            Some(&col),
            std::path::Path::new("/tmp/x"),
            3,
            CreateIndexParam::Secondary {
                row_count: 2500,
                part_capacity: 1024,
            },
        )
        .unwrap();
        // 1 header + ceil(2500/1024) = 3 parts
        assert_eq!(workers.len(), 4);
        assert_eq!(workers[1].file_name(), "3_part1");
        assert_eq!(workers[3].file_name(), "3_part3");
    }

    #[test]
    fn test_ivf_rejects_non_f32() {
        let base = IndexBase::new("ivf", IndexType::IvfFlat, vec!["v".into()], Vec::new());
        let col = Arc::new(ColumnDef::new(
            1,
            "v",
            DataType::Embedding {
                element: EmbeddingElementType::Int8,
                dimension: 4,
            },
        ));
        let err = create_file_workers(
            &base,
            Some(&col),
            std::path::Path::new("/tmp/x"),
            0,
            CreateIndexParam::IvfFlat { row_count: 10 },
        )
        .unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::NotSupport);
    }

    #[test]
    fn test_secondary_key_ordering() {
        let a = secondary_key_bytes(&Value::Integer(-5));
        let b = secondary_key_bytes(&Value::Integer(3));
        let c = secondary_key_bytes(&Value::Integer(100));
        assert!(a < b && b < c);

        let x = secondary_key_bytes(&Value::Double(-1.5));
        let y = secondary_key_bytes(&Value::Double(0.0));
        let z = secondary_key_bytes(&Value::Double(2.25));
        assert!(x < y && y < z);
    }
}
