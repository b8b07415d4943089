//! Test fixtures: segment file writers, readers that split reads, and an
//! in-memory metadata store.

use bytes::Bytes;
use parking_lot::Mutex;
use seglog_chunk::{padding_for, put_padding, Chunk};
use seglog_types::{
    CollabError, CollabResult, GenId, Generation, GenerationSource, LocalMetadata, RangeIndex,
    Token, TopicDataId,
};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Returns a topic id with token 0 and generation 1.
pub fn topic(name: &str) -> TopicDataId {
    TopicDataId::new(name, Token::new(0), GenId::new(1))
}

/// Builds the bytes of a segment file and its sparse index in memory.
///
/// # Example
///
/// ```rust,ignore
/// let mut writer = SegmentWriter::new(512);
/// writer.append_aligned(&Chunk::new(0, 10, body)?);
/// writer.write_segment(&segment_path)?;
/// writer.write_index(&index_path)?;
/// ```
#[derive(Debug, Clone)]
pub struct SegmentWriter {
    data: Vec<u8>,
    alignment: usize,
    index: Vec<(i64, u64)>,
}

impl SegmentWriter {
    /// Creates an empty segment that pads to `alignment`.
    pub fn new(alignment: usize) -> Self {
        Self {
            data: Vec::new(),
            alignment,
            index: Vec::new(),
        }
    }

    /// Appends a chunk with no padding. Returns the header position.
    pub fn append(&mut self, chunk: &Chunk) -> u64 {
        let position = self.data.len() as u64;
        chunk.encode(&mut self.data);
        position
    }

    /// Appends `padding` padding bytes and then a chunk. Returns the header
    /// position.
    pub fn append_padded(&mut self, chunk: &Chunk, padding: usize) -> u64 {
        put_padding(&mut self.data, padding);
        self.append(chunk)
    }

    /// Pads up to the next alignment boundary, appends a chunk there and
    /// records an index entry for it. Returns the header position.
    pub fn append_aligned(&mut self, chunk: &Chunk) -> u64 {
        self.pad_to_alignment();
        let position = self.append(chunk);
        self.index.push((chunk.header().start, position));
        position
    }

    /// Pads the segment up to the next alignment boundary.
    pub fn pad_to_alignment(&mut self) {
        let padding = padding_for(self.data.len() as u64, self.alignment);
        put_padding(&mut self.data, padding);
    }

    /// Appends raw bytes, for corrupting a segment on purpose.
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Returns the segment bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the recorded `(offset, position)` index entries.
    pub fn index_entries(&self) -> &[(i64, u64)] {
        &self.index
    }

    /// Writes the segment bytes to `path`, creating parent directories.
    pub fn write_segment(&self, path: &Path) -> io::Result<()> {
        write_creating_dirs(path, &self.data)
    }

    /// Writes the index entries to `path` in the sparse index layout.
    pub fn write_index(&self, path: &Path) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.index.len() * 16);
        for &(offset, position) in &self.index {
            buf.extend_from_slice(&offset.to_be_bytes());
            buf.extend_from_slice(&position.to_be_bytes());
        }
        write_creating_dirs(path, &buf)
    }
}

fn write_creating_dirs(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

/// Builds `count` contiguous chunks of `records_per_chunk` records each,
/// starting at offset `first`, with bodies of `body_len` bytes.
pub fn contiguous_chunks(first: i64, count: usize, records_per_chunk: u32, body_len: usize) -> Vec<Chunk> {
    (0..count)
        .map(|i| {
            let start = first + (i as i64) * i64::from(records_per_chunk);
            let body = Bytes::from(vec![(i % 251) as u8; body_len]);
            Chunk::new(start, records_per_chunk, body).expect("fixture chunk is valid")
        })
        .collect()
}

/// A reader that returns at most `max_per_read` bytes per call.
///
/// Simulates short reads so that chunk reassembly across physical reads
/// can be tested without a file.
#[derive(Debug)]
pub struct ShortReader<R> {
    inner: R,
    max_per_read: usize,
    reads: usize,
}

impl<R: Read> ShortReader<R> {
    /// Wraps `inner`, capping each read at `max_per_read` bytes.
    pub fn new(inner: R, max_per_read: usize) -> Self {
        Self {
            inner,
            max_per_read: max_per_read.max(1),
            reads: 0,
        }
    }

    /// Number of read calls served.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl<R: Read> Read for ShortReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        let len = buf.len().min(self.max_per_read);
        self.inner.read(&mut buf[..len])
    }
}

/// In-memory stand-in for the local metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    state: Mutex<MetadataState>,
}

#[derive(Debug, Default)]
struct MetadataState {
    initialized: bool,
    created: bool,
    offsets: HashMap<(String, String, Token, RangeIndex), i64>,
    generations: HashMap<Token, Vec<Generation>>,
    fail_next: Option<CollabError>,
}

impl MemoryMetadata {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a saved consumer offset.
    pub fn offset(&self, group: &str, topic: &str, token: Token, range_index: RangeIndex) -> Option<i64> {
        self.state
            .lock()
            .offsets
            .get(&(group.to_string(), topic.to_string(), token, range_index))
            .copied()
    }

    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: CollabError) {
        self.state.lock().fail_next = Some(error);
    }

    fn check(&self, state: &mut MetadataState) -> CollabResult<()> {
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        if !state.initialized {
            return Err(CollabError::unavailable("metadata store is not initialized"));
        }
        Ok(())
    }
}

impl GenerationSource for MemoryMetadata {
    fn generations_by_token(&self, token: Token) -> CollabResult<Vec<Generation>> {
        let mut state = self.state.lock();
        self.check(&mut state)?;
        Ok(state.generations.get(&token).cloned().unwrap_or_default())
    }
}

impl LocalMetadata for MemoryMetadata {
    fn init(&self) -> CollabResult<()> {
        let mut state = self.state.lock();
        state.created = !state.initialized;
        state.initialized = true;
        Ok(())
    }

    fn was_newly_created(&self) -> bool {
        self.state.lock().created
    }

    fn save_offset(
        &self,
        group: &str,
        topic: &str,
        token: Token,
        range_index: RangeIndex,
        value: i64,
    ) -> CollabResult<()> {
        let mut state = self.state.lock();
        self.check(&mut state)?;
        state
            .offsets
            .insert((group.to_string(), topic.to_string(), token, range_index), value);
        Ok(())
    }

    fn commit_generation(&self, generation: &Generation) -> CollabResult<()> {
        let mut state = self.state.lock();
        self.check(&mut state)?;
        let history = state.generations.entry(generation.start).or_default();
        history.retain(|g| g.version != generation.version);
        history.push(generation.clone());
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(())
    }
}
