//! Block skip-list metadata for doc-list streams.
//!
//! One entry is recorded per flushed posting block: the last doc id in the
//! block, the running total term frequency through the block, and the byte
//! offset of the *next* block in the stream. A reader can then jump past
//! whole blocks whose last doc id is below the seek target, carrying the
//! correct delta base and TF prefix.

use crate::posting::varint;
use crate::types::DocId;

/// Skip entry for one flushed posting block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipEntry {
    /// Last doc id contained in the block.
    pub last_doc_id: DocId,
    /// Total term frequency accumulated through the end of the block.
    pub ttf: u64,
    /// Byte offset of the end of the block in the doc-list stream.
    pub end_offset: u32,
}

/// Collects skip entries during encoding.
#[derive(Debug, Default)]
pub struct SkipListWriter {
    entries: Vec<SkipEntry>,
}

impl SkipListWriter {
    pub fn new() -> Self {
        SkipListWriter::default()
    }

    pub fn add_entry(&mut self, last_doc_id: DocId, ttf: u64, end_offset: u32) {
        self.entries.push(SkipEntry {
            last_doc_id,
            ttf,
            end_offset,
        });
    }

    pub fn entries(&self) -> &[SkipEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialized size: entry count plus delta-encoded fields.
    pub fn dump_length(&self) -> usize {
        let mut len = varint::encoded_len_u32(self.entries.len() as u32);
        let mut prev = SkipEntry {
            last_doc_id: 0,
            ttf: 0,
            end_offset: 0,
        };
        for e in &self.entries {
            len += varint::encoded_len_u32(e.last_doc_id - prev.last_doc_id);
            len += varint::encoded_len_u64(e.ttf - prev.ttf);
            len += varint::encoded_len_u32(e.end_offset - prev.end_offset);
            prev = *e;
        }
        len
    }

    /// Write the delta-encoded entry list.
    pub fn dump<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        varint::write_u32(w, self.entries.len() as u32)?;
        let mut prev = SkipEntry {
            last_doc_id: 0,
            ttf: 0,
            end_offset: 0,
        };
        for e in &self.entries {
            varint::write_u32(w, e.last_doc_id - prev.last_doc_id)?;
            varint::write_u64(w, e.ttf - prev.ttf)?;
            varint::write_u32(w, e.end_offset - prev.end_offset)?;
            prev = *e;
        }
        Ok(())
    }

    /// Read back a dumped entry list.
    pub fn load<R: std::io::Read>(r: &mut R) -> std::io::Result<Self> {
        let count = varint::read_u32(r)? as usize;
        let mut entries = Vec::with_capacity(count);
        let mut prev = SkipEntry {
            last_doc_id: 0,
            ttf: 0,
            end_offset: 0,
        };
        for _ in 0..count {
            let entry = SkipEntry {
                last_doc_id: prev.last_doc_id + varint::read_u32(r)?,
                ttf: prev.ttf + varint::read_u64(r)?,
                end_offset: prev.end_offset + varint::read_u32(r)?,
            };
            entries.push(entry);
            prev = entry;
        }
        Ok(SkipListWriter { entries })
    }
}

/// Read cursor over skip entries.
pub struct SkipListReader<'a> {
    entries: &'a [SkipEntry],
}

/// Result of a skip: where to resume linear decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipPoint {
    /// Byte offset of the first block that may contain the target.
    pub offset: u32,
    /// Last doc id of the previous block (delta base for the next block).
    pub prev_last_doc_id: DocId,
    /// Total term frequency through the previous block.
    pub prev_ttf: u64,
    /// Number of blocks skipped.
    pub skipped_blocks: usize,
}

impl<'a> SkipListReader<'a> {
    pub fn new(entries: &'a [SkipEntry]) -> Self {
        SkipListReader { entries }
    }

    /// Find the resume point for `target`: skips every block whose last doc
    /// id is below the target.
    pub fn skip_to(&self, target: DocId) -> SkipPoint {
        let mut point = SkipPoint {
            offset: 0,
            prev_last_doc_id: 0,
            prev_ttf: 0,
            skipped_blocks: 0,
        };
        for e in self.entries {
            if e.last_doc_id >= target {
                break;
            }
            point.offset = e.end_offset;
            point.prev_last_doc_id = e.last_doc_id;
            point.prev_ttf = e.ttf;
            point.skipped_blocks += 1;
        }
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SkipListWriter {
        let mut w = SkipListWriter::new();
        w.add_entry(127, 300, 210);
        w.add_entry(301, 640, 415);
        w.add_entry(998, 1100, 633);
        w
    }

    #[test]
    fn test_dump_load_roundtrip() {
        let writer = sample();
        let mut buf = Vec::new();
        writer.dump(&mut buf).unwrap();
        assert_eq!(buf.len(), writer.dump_length());
        let loaded = SkipListWriter::load(&mut std::io::Cursor::new(buf)).unwrap();
        assert_eq!(loaded.entries(), writer.entries());
    }

    #[test]
    fn test_skip_to_jumps_past_blocks() {
        let writer = sample();
        let reader = SkipListReader::new(writer.entries());

        let p = reader.skip_to(50);
        assert_eq!(p.skipped_blocks, 0);
        assert_eq!(p.offset, 0);

        let p = reader.skip_to(302);
        assert_eq!(p.skipped_blocks, 2);
        assert_eq!(p.offset, 415);
        assert_eq!(p.prev_last_doc_id, 301);
        assert_eq!(p.prev_ttf, 640);
    }

    #[test]
    fn test_skip_to_exact_block_boundary() {
        let writer = sample();
        let reader = SkipListReader::new(writer.entries());
        // Target equal to a block's last doc id must not skip that block.
        let p = reader.skip_to(301);
        assert_eq!(p.skipped_blocks, 1);
        assert_eq!(p.prev_last_doc_id, 127);
    }
}
