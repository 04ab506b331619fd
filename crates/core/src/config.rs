//! Global configuration constants for fusedb.
//!
//! All tuning parameters for the posting encoders, pool budgets, segment
//! layout, and server defaults are defined here. These are compile-time
//! constants; runtime configuration is handled via CLI arguments in the
//! server binary.

/// Number of documents packed into one doc-list block before it is
/// varint-encoded and flushed into the posting buffer.
///
/// A skip-list entry is emitted for every flushed block, so this is also
/// the skip interval.
pub const POSTING_BLOCK_CAPACITY: usize = 128;

/// Size of one byte-slice pool chunk backing posting buffers.
pub const BYTE_SLICE_CHUNK_BYTES: usize = 8 * 1024;

/// Total byte budget for one index's byte-slice pool.
///
/// Exhausting the budget fails the segment build; the transaction that
/// drove the build is rolled back.
pub const BYTE_SLICE_POOL_BUDGET: usize = 64 * 1024 * 1024;

/// Maximum number of scratch buffers retained by a recycle pool.
pub const RECYCLE_POOL_CAPACITY: usize = 64;

/// Maximum number of rows in one table segment.
pub const SEGMENT_CAPACITY: usize = 8192;

/// Maximum number of rows in one data block within a segment.
pub const BLOCK_CAPACITY: usize = 1024;

/// Row capacity of one secondary-index part file.
pub const SECONDARY_PART_CAPACITY: usize = BLOCK_CAPACITY;

/// Number of worker threads driving a cooperative index build.
pub const INDEX_BUILD_WORKERS: usize = 4;

/// Number of background worker threads for deferred cleanup work.
pub const BACKGROUND_WORKERS: usize = 4;

/// BM25 Okapi term frequency saturation parameter.
pub const BM25_K1: f32 = 1.2;

/// BM25 Okapi document length normalization parameter.
pub const BM25_B: f32 = 0.75;

/// Reciprocal Rank Fusion constant `k` in `1 / (k + rank)`.
///
/// Overridable per query through the fusion expression's `rank_constant`
/// option.
pub const RRF_RANK_CONSTANT: f32 = 60.0;

/// Default weight of the first input in weighted-sum fusion.
pub const FUSION_DEFAULT_WEIGHT: f32 = 0.5;

/// Default RPC listen port.
pub const DEFAULT_PORT: u16 = 23817;

/// Default directory for catalog checkpoints and index files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default directory prefix for uploaded import files.
pub const DEFAULT_TEMP_DIR: &str = "/tmp/fusedb";

/// File name of the catalog checkpoint inside the data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.json";
