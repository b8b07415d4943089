//! Segment file store: resolves a topic-partition's segments on disk and
//! serves aligned range reads out of them.

use crate::config::{align_down, parse_segment_file_name, segment_file_name, DatalogConfig};
use crate::cursor::{read_chunks_from, ReadCursor};
use crate::error::{StorageError, StorageResult};
use crate::index::try_read_index_file;
use crate::pool::StreamBufferPool;
use bytes::Bytes;
use seglog_types::TopicDataId;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Result of a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One or more whole chunks, starting with the chunk that holds the
    /// requested offset.
    Chunks(Bytes),

    /// Nothing is available at or after the requested offset yet.
    Empty,
}

impl ReadOutcome {
    /// Returns the chunk bytes, if any.
    #[must_use]
    pub fn chunks(&self) -> Option<&Bytes> {
        match self {
            ReadOutcome::Chunks(bytes) => Some(bytes),
            ReadOutcome::Empty => None,
        }
    }

    /// Consumes the outcome and returns the chunk bytes, if any.
    #[must_use]
    pub fn into_chunks(self) -> Option<Bytes> {
        match self {
            ReadOutcome::Chunks(bytes) => Some(bytes),
            ReadOutcome::Empty => None,
        }
    }

    /// Returns true if no data was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, ReadOutcome::Empty)
    }
}

/// Reads chunk runs out of the segment files of many topic-partitions.
///
/// Every read owns one pooled buffer and one file handle for its
/// duration. Concurrent reads of the same segment are safe: segments are
/// immutable once sealed and each read opens its own handle.
///
/// # Example
///
/// ```no_run
/// use seglog_storage::{DatalogConfig, SegmentStore};
/// use seglog_types::{GenId, Token, TopicDataId};
///
/// let store = SegmentStore::new(DatalogConfig::new("/var/lib/seglog")).unwrap();
/// let topic = TopicDataId::new("orders", Token::new(0), GenId::new(1));
///
/// let outcome = store.read_range(&topic, 0, 120, 64 * 1024, 100).unwrap();
/// if let Some(chunks) = outcome.chunks() {
///     println!("read {} bytes", chunks.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SegmentStore {
    config: DatalogConfig,
    pool: StreamBufferPool,
}

impl SegmentStore {
    /// Creates a store with a buffer pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if the configuration is invalid.
    pub fn new(config: DatalogConfig) -> StorageResult<Self> {
        config.validate()?;
        let pool = StreamBufferPool::from_config(&config);
        Ok(Self { config, pool })
    }

    /// Creates a store that borrows buffers from an existing pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if the configuration is invalid, the
    /// pool's buffers are smaller than one alignment unit or they are
    /// aligned more loosely than the configuration requires.
    pub fn with_pool(config: DatalogConfig, pool: StreamBufferPool) -> StorageResult<Self> {
        config.validate()?;
        if pool.buffer_capacity() < config.alignment_size {
            return Err(StorageError::config(format!(
                "pool buffers of {} bytes cannot hold one {} byte aligned read",
                pool.buffer_capacity(),
                config.alignment_size
            )));
        }
        if pool.alignment() < config.alignment_size {
            return Err(StorageError::config(format!(
                "pool buffers are {} byte aligned, reads need {}",
                pool.alignment(),
                config.alignment_size
            )));
        }
        Ok(Self { config, pool })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DatalogConfig {
        &self.config
    }

    /// Returns the buffer pool.
    #[must_use]
    pub fn pool(&self) -> &StreamBufferPool {
        &self.pool
    }

    /// Path of segment `segment_id` of `topic`.
    #[must_use]
    pub fn segment_path(&self, topic: &TopicDataId, segment_id: i64) -> PathBuf {
        self.config
            .datalog_path(topic)
            .join(segment_file_name(segment_id))
    }

    /// Lists the ids of the segments present for `topic`, in ascending order.
    ///
    /// A topic with no directory yet has no segments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be listed.
    pub fn segment_ids(&self, topic: &TopicDataId) -> StorageResult<Vec<i64>> {
        let dir = self.config.datalog_path(topic);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(id) = parse_segment_file_name(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Reads the chunk run holding `start_offset` from a segment.
    ///
    /// At most `max_size` bytes of buffer are used and the run stops at the
    /// first chunk starting after `start_offset + max_records - 1`. Blocks
    /// while every pooled buffer is in use.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidArgument`] if `max_size` is below the alignment
    /// - [`StorageError::SegmentNotFound`] if the segment file does not exist
    /// - [`StorageError::Io`] if opening, seeking or reading fails
    /// - [`StorageError::Chunk`] if the segment holds an invalid header
    pub fn read_range(
        &self,
        topic: &TopicDataId,
        segment_id: i64,
        start_offset: i64,
        max_size: usize,
        max_records: usize,
    ) -> StorageResult<ReadOutcome> {
        self.read(topic, segment_id, start_offset, max_size, max_records, None)
    }

    /// Like [`SegmentStore::read_range`], but gives up with
    /// [`StorageError::Canceled`] once `cancel` fires.
    ///
    /// The token is checked before each physical read.
    ///
    /// # Errors
    ///
    /// As [`SegmentStore::read_range`], plus [`StorageError::Canceled`].
    pub fn read_range_cancellable(
        &self,
        topic: &TopicDataId,
        segment_id: i64,
        start_offset: i64,
        max_size: usize,
        max_records: usize,
        cancel: &CancellationToken,
    ) -> StorageResult<ReadOutcome> {
        self.read(
            topic,
            segment_id,
            start_offset,
            max_size,
            max_records,
            Some(cancel),
        )
    }

    fn read(
        &self,
        topic: &TopicDataId,
        segment_id: i64,
        start_offset: i64,
        max_size: usize,
        max_records: usize,
        cancel: Option<&CancellationToken>,
    ) -> StorageResult<ReadOutcome> {
        let alignment = self.config.alignment_size;
        if max_size < alignment {
            return Err(StorageError::invalid_argument(format!(
                "max_size {max_size} is below the {alignment} byte alignment"
            )));
        }

        let base = self.config.datalog_path(topic);
        let path = base.join(segment_file_name(segment_id));

        let mut position = try_read_index_file(&base, segment_id, start_offset);
        if position % alignment as u64 != 0 {
            warn!(
                path = %path.display(),
                position,
                alignment,
                "index position is not aligned, scanning from segment start"
            );
            position = 0;
        }

        let mut file = self.open_segment(&path)?;
        if position > 0 {
            if let Err(e) = file.seek(SeekFrom::Start(position)) {
                error!(path = %path.display(), position, error = %e, "failed to seek segment");
                return Err(e.into());
            }
        }

        let buffer = self.pool.acquire();
        let limit = align_down(max_size.min(buffer.len()), alignment);
        let mut cursor = ReadCursor::new(buffer, limit, alignment);

        let outcome = read_chunks_from(&mut file, &mut cursor, start_offset, max_records, cancel)
            .inspect_err(|e| {
                if !matches!(e, StorageError::Canceled) {
                    error!(path = %path.display(), start_offset, error = %e, "segment read failed");
                }
            })?;

        debug!(
            topic = %topic,
            segment_id,
            start_offset,
            position,
            bytes = outcome.chunks().map_or(0, Bytes::len),
            "segment read"
        );
        Ok(outcome)
    }

    fn open_segment(&self, path: &Path) -> StorageResult<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(self.config.segment_read_flags);
        }

        options.open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::SegmentNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                error!(path = %path.display(), error = %e, "failed to open segment");
                StorageError::Io(e)
            }
        })
    }
}
