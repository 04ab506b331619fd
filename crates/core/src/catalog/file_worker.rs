//! File-backed index artifacts.
//!
//! An [`IndexFileWorker`] owns the in-memory buffer of one index file and
//! knows how to materialize it on commit. Vector workers accumulate raw
//! row-major vectors (the inner ANN algorithms are external collaborators);
//! secondary workers accumulate `(key, row offset)` pairs for one part
//! file. Full-text indexes have no worker: the posting writers dump their
//! own streams.
//!
//! Saved files are written atomically (temp + rename) and carry a
//! `[payload][magic][CRC32 BE]` footer for integrity verification.

use crate::status::Status;
use crate::types::EmbeddingElementType;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Magic bytes ahead of the CRC32 footer on saved index files.
const INDEX_CRC_MAGIC: &[u8; 4] = b"FIX1";

/// One file-backed index artifact.
#[derive(Debug)]
pub enum IndexFileWorker {
    /// HNSW map file; sized by the segment's row count.
    Hnsw {
        dir: PathBuf,
        file_name: String,
        dimension: usize,
        max_element: usize,
        buffer: Vec<u8>,
    },
    /// IVF posting file; element type is fixed to `f32` in this snapshot.
    IvfFlat {
        dir: PathBuf,
        file_name: String,
        dimension: usize,
        row_count: usize,
        buffer: Vec<u8>,
    },
    /// One part of a secondary index (`part_id == 0` is the header file).
    Secondary {
        dir: PathBuf,
        file_name: String,
        part_id: u32,
        row_count: usize,
        part_capacity: usize,
        buffer: Vec<u8>,
    },
}

impl IndexFileWorker {
    pub fn file_name(&self) -> &str {
        match self {
            IndexFileWorker::Hnsw { file_name, .. } => file_name,
            IndexFileWorker::IvfFlat { file_name, .. } => file_name,
            IndexFileWorker::Secondary { file_name, .. } => file_name,
        }
    }

    fn dir(&self) -> &Path {
        match self {
            IndexFileWorker::Hnsw { dir, .. } => dir,
            IndexFileWorker::IvfFlat { dir, .. } => dir,
            IndexFileWorker::Secondary { dir, .. } => dir,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir().join(self.file_name())
    }

    /// Append one labeled row-major `f32` vector. The explicit row label
    /// keeps the artifact correct when cooperative workers deliver blocks
    /// out of order. Rejects secondary workers.
    pub fn add_vector(&mut self, row_offset: u32, vector: &[f32]) -> Result<(), Status> {
        let (buffer, dimension) = match self {
            IndexFileWorker::Hnsw {
                buffer, dimension, ..
            } => (buffer, *dimension),
            IndexFileWorker::IvfFlat {
                buffer, dimension, ..
            } => (buffer, *dimension),
            IndexFileWorker::Secondary { .. } => {
                return Err(Status::not_support(
                    "secondary index worker does not take vectors",
                ))
            }
        };
        if vector.len() != dimension {
            return Err(Status::invalid_parameter_value(
                "dimension",
                &vector.len().to_string(),
                "query dimension must match the column",
            ));
        }
        buffer.extend_from_slice(&row_offset.to_le_bytes());
        for v in vector {
            buffer.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    /// Append one `(key bytes, row offset)` pair to a secondary part file.
    pub fn add_key(&mut self, key: &[u8], row_offset: u32) -> Result<(), Status> {
        match self {
            IndexFileWorker::Secondary { buffer, .. } => {
                buffer.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buffer.extend_from_slice(key);
                buffer.extend_from_slice(&row_offset.to_le_bytes());
                Ok(())
            }
            _ => Err(Status::not_support("vector index worker does not take keys")),
        }
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            IndexFileWorker::Hnsw { buffer, .. } => buffer.len(),
            IndexFileWorker::IvfFlat { buffer, .. } => buffer.len(),
            IndexFileWorker::Secondary { buffer, .. } => buffer.len(),
        }
    }

    /// Write the buffer to disk with the CRC32 footer, atomically.
    pub fn save(&self) -> io::Result<()> {
        let buffer = match self {
            IndexFileWorker::Hnsw { buffer, .. } => buffer,
            IndexFileWorker::IvfFlat { buffer, .. } => buffer,
            IndexFileWorker::Secondary { buffer, .. } => buffer,
        };
        fs::create_dir_all(self.dir())?;
        let path = self.path();
        let tmp_path = path.with_extension("tmp");

        let crc = crc32fast::hash(buffer);
        let mut out = Vec::with_capacity(buffer.len() + 8);
        out.extend_from_slice(buffer);
        out.extend_from_slice(INDEX_CRC_MAGIC);
        out.extend_from_slice(&crc.to_be_bytes());

        fs::write(&tmp_path, &out)?;
        fs::rename(&tmp_path, &path)?;
        tracing::debug!(
            "saved index file {:?} ({} bytes, CRC32={:#010x})",
            path,
            buffer.len(),
            crc
        );
        Ok(())
    }

    /// Read a saved file back, verifying the footer.
    pub fn load_payload(path: &Path) -> io::Result<Vec<u8>> {
        let raw = fs::read(path)?;
        if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != INDEX_CRC_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("index file {path:?} has no integrity footer"),
            ));
        }
        let payload = &raw[..raw.len() - 8];
        let stored = u32::from_be_bytes([
            raw[raw.len() - 4],
            raw[raw.len() - 3],
            raw[raw.len() - 2],
            raw[raw.len() - 1],
        ]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("index file {path:?} CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }
        Ok(payload.to_vec())
    }

    /// Remove the on-disk file. Missing files are fine; cleanup is
    /// idempotent.
    pub fn cleanup(&self) -> io::Result<()> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Element-type gate for IVFFlat construction: only `f32` vectors are
/// supported in this snapshot.
pub fn check_ivf_element(element: EmbeddingElementType) -> Result<(), Status> {
    match element {
        EmbeddingElementType::Float32 => Ok(()),
        other => Err(Status::not_support(format!(
            "IVFFlat over {other:?} elements is not supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hnsw_worker(dir: &Path) -> IndexFileWorker {
        IndexFileWorker::Hnsw {
            dir: dir.to_path_buf(),
            file_name: "0".into(),
            dimension: 2,
            max_element: 100,
            buffer: Vec::new(),
        }
    }

    #[test]
    fn test_save_and_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let mut worker = hnsw_worker(tmp.path());
        worker.add_vector(0, &[1.0, 2.0]).unwrap();
        worker.add_vector(1, &[3.0, 4.0]).unwrap();
        worker.save().unwrap();

        let payload = IndexFileWorker::load_payload(&worker.path()).unwrap();
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn test_corruption_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut worker = hnsw_worker(tmp.path());
        worker.add_vector(0, &[1.0, 2.0]).unwrap();
        worker.save().unwrap();

        let path = worker.path();
        let mut raw = fs::read(&path).unwrap();
        raw[0] ^= 0xFF;
        fs::write(&path, &raw).unwrap();
        assert!(IndexFileWorker::load_payload(&path).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut worker = hnsw_worker(tmp.path());
        assert!(worker.add_vector(0, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_cleanup_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut worker = hnsw_worker(tmp.path());
        worker.add_vector(0, &[1.0, 2.0]).unwrap();
        worker.save().unwrap();
        worker.cleanup().unwrap();
        worker.cleanup().unwrap();
        assert!(!worker.path().exists());
    }

    #[test]
    fn test_secondary_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut worker = IndexFileWorker::Secondary {
            dir: tmp.path().to_path_buf(),
            file_name: "0_part1".into(),
            part_id: 1,
            row_count: 10,
            part_capacity: 8,
            buffer: Vec::new(),
        };
        worker.add_key(&5i32.to_le_bytes(), 3).unwrap();
        assert!(worker.add_vector(0, &[1.0]).is_err());
        assert!(worker.buffer_len() > 0);
    }

    #[test]
    fn test_ivf_element_gate() {
        assert!(check_ivf_element(EmbeddingElementType::Float32).is_ok());
        assert!(check_ivf_element(EmbeddingElementType::Int8).is_err());
    }
}
