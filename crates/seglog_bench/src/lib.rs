//! Benchmark utilities.

#![warn(missing_docs)]

use seglog_chunk::Chunk;
use seglog_testkit::{contiguous_chunks, topic, SegmentWriter};
use seglog_storage::{DatalogConfig, SegmentStore};
use seglog_types::TopicDataId;
use tempfile::TempDir;

/// Generate deterministic payload data of the specified size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Encode `count` contiguous chunks with `padding` bytes before each.
pub fn encoded_run(count: usize, body_len: usize, padding: usize) -> Vec<u8> {
    let mut writer = SegmentWriter::new(512);
    for chunk in contiguous_chunks(0, count, 4, body_len) {
        writer.append_padded(&chunk, padding);
    }
    writer.bytes().to_vec()
}

/// A segment store in a temporary directory holding one segment of
/// aligned chunks starting at offset 0.
pub struct SegmentFixture {
    /// Keeps the directory alive.
    pub dir: TempDir,
    /// Store over `dir`.
    pub store: SegmentStore,
    /// Topic the segment belongs to.
    pub topic: TopicDataId,
    /// Chunks written to the segment.
    pub chunks: Vec<Chunk>,
}

impl SegmentFixture {
    /// Write `count` chunks of `records_per_chunk` records and `body_len`
    /// body bytes, with a sparse index when `indexed` is set.
    pub fn new(count: usize, records_per_chunk: u32, body_len: usize, indexed: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(DatalogConfig::new(dir.path())).unwrap();
        let topic = topic("bench");
        let chunks = contiguous_chunks(0, count, records_per_chunk, body_len);

        let alignment = store.config().alignment_size;
        let mut writer = SegmentWriter::new(alignment);
        for chunk in &chunks {
            writer.append_aligned(chunk);
        }
        writer.write_segment(&store.segment_path(&topic, 0)).unwrap();
        if indexed {
            let index = store
                .config()
                .datalog_path(&topic)
                .join(seglog_storage::index_file_name(0));
            writer.write_index(&index).unwrap();
        }

        Self {
            dir,
            store,
            topic,
            chunks,
        }
    }

    /// Logical offset one past the last record.
    pub fn end_offset(&self) -> i64 {
        self.chunks.last().map_or(0, |c| c.header().end())
    }
}
