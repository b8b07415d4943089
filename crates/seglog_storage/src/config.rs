//! Datalog configuration and on-disk layout.
//!
//! ```text
//! <base_path>/
//! └─ <topic>/
//!    └─ <token>/
//!       └─ <gen_id>/
//!          ├─ 00000000000000000000.dlog    # segment file
//!          ├─ 00000000000000000000.index   # optional sparse index
//!          └─ 00000000000000001024.dlog
//! ```

use crate::error::{StorageError, StorageResult};
use crate::pool::STREAM_BUFFER_FRACTION;
use seglog_chunk::DEFAULT_ALIGNMENT_SIZE;
use seglog_types::TopicDataId;
use std::path::{Path, PathBuf};

/// Extension of segment files.
pub const SEGMENT_FILE_EXTENSION: &str = "dlog";

/// Extension of sparse index files.
pub const INDEX_FILE_EXTENSION: &str = "index";

/// Configuration of the segment read path.
#[derive(Debug, Clone)]
pub struct DatalogConfig {
    /// Root directory holding every topic-partition directory.
    pub base_path: PathBuf,

    /// Stream buffer budget in bytes. Each pooled buffer gets
    /// `stream_buffer_size / 16` of it.
    pub stream_buffer_size: usize,

    /// Direct I/O alignment in bytes. Every physical read length is a
    /// multiple of this value.
    pub alignment_size: usize,

    /// Extra platform open flags for segment reads (for example `O_DIRECT`).
    ///
    /// Only applied on unix targets.
    pub segment_read_flags: i32,
}

impl Default for DatalogConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            stream_buffer_size: 32 * 1024 * 1024, // 32 MB
            alignment_size: DEFAULT_ALIGNMENT_SIZE,
            segment_read_flags: 0,
        }
    }
}

impl DatalogConfig {
    /// Creates a configuration rooted at `base_path` with default sizes.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Sets the root directory.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sets the stream buffer budget.
    #[must_use]
    pub const fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    /// Sets the direct I/O alignment.
    #[must_use]
    pub const fn with_alignment_size(mut self, size: usize) -> Self {
        self.alignment_size = size;
        self
    }

    /// Sets the extra open flags for segment reads.
    #[must_use]
    pub const fn with_segment_read_flags(mut self, flags: i32) -> Self {
        self.segment_read_flags = flags;
        self
    }

    /// Checks that the sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if the alignment is not a power of
    /// two or the stream buffer budget cannot hold one aligned block per
    /// pooled buffer.
    pub fn validate(&self) -> StorageResult<()> {
        if !self.alignment_size.is_power_of_two() {
            return Err(StorageError::config(format!(
                "alignment size must be a power of two, got {}",
                self.alignment_size
            )));
        }
        let min = self.alignment_size * STREAM_BUFFER_FRACTION;
        if self.stream_buffer_size < min {
            return Err(StorageError::config(format!(
                "stream buffer size {} is below the minimum of {} bytes",
                self.stream_buffer_size, min
            )));
        }
        Ok(())
    }

    /// Capacity of each pooled stream buffer, rounded down to the alignment.
    #[must_use]
    pub fn stream_buffer_capacity(&self) -> usize {
        let raw = self.stream_buffer_size / STREAM_BUFFER_FRACTION;
        align_down(raw, self.alignment_size).max(self.alignment_size)
    }

    /// Directory holding the segments of `topic`.
    #[must_use]
    pub fn datalog_path(&self, topic: &TopicDataId) -> PathBuf {
        self.base_path
            .join(topic.name())
            .join(topic.token().to_string())
            .join(topic.gen_id().to_string())
    }
}

/// File name of the segment with id `segment_id`.
#[must_use]
pub fn segment_file_name(segment_id: i64) -> String {
    format!("{segment_id:020}.{SEGMENT_FILE_EXTENSION}")
}

/// File name of the sparse index of segment `segment_id`.
#[must_use]
pub fn index_file_name(segment_id: i64) -> String {
    format!("{segment_id:020}.{INDEX_FILE_EXTENSION}")
}

/// Parses a segment id back out of a segment file name.
#[must_use]
pub fn parse_segment_file_name(path: &Path) -> Option<i64> {
    if path.extension()? != SEGMENT_FILE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Rounds `len` down to a multiple of `alignment`.
#[must_use]
pub const fn align_down(len: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return len;
    }
    len - len % alignment
}

/// Rounds `len` up to a multiple of `alignment`.
#[must_use]
pub const fn align_up(len: usize, alignment: usize) -> usize {
    align_down(len + alignment.saturating_sub(1), alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seglog_types::{GenId, Token};

    #[test]
    fn default_config() {
        let config = DatalogConfig::default();
        assert_eq!(config.alignment_size, 512);
        assert_eq!(config.segment_read_flags, 0);
        assert!(config.validate().is_ok());
        assert_eq!(config.stream_buffer_capacity(), 2 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = DatalogConfig::new("/var/lib/seglog")
            .with_stream_buffer_size(1024 * 1024)
            .with_alignment_size(4096)
            .with_segment_read_flags(0o40000);

        assert_eq!(config.base_path, PathBuf::from("/var/lib/seglog"));
        assert_eq!(config.stream_buffer_size, 1024 * 1024);
        assert_eq!(config.alignment_size, 4096);
        assert_eq!(config.segment_read_flags, 0o40000);
        assert_eq!(config.stream_buffer_capacity(), 64 * 1024);
    }

    #[test]
    fn validate_rejects_bad_sizes() {
        let config = DatalogConfig::default().with_alignment_size(500);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));

        let config = DatalogConfig::default().with_alignment_size(0);
        assert!(config.validate().is_err());

        let config = DatalogConfig::default().with_stream_buffer_size(1024);
        assert!(config.validate().is_err());
    }

    #[test]
    fn buffer_capacity_is_aligned() {
        let config = DatalogConfig::default().with_stream_buffer_size(16 * 1000);
        assert_eq!(config.stream_buffer_capacity(), 512);
    }

    #[test]
    fn datalog_path_layout() {
        let config = DatalogConfig::new("/data");
        let topic = TopicDataId::new("orders", Token::new(-9_000), GenId::new(2));
        assert_eq!(
            config.datalog_path(&topic),
            PathBuf::from("/data/orders/-9000/2")
        );
    }

    #[test]
    fn file_names() {
        assert_eq!(segment_file_name(0), "00000000000000000000.dlog");
        assert_eq!(segment_file_name(1024), "00000000000000001024.dlog");
        assert_eq!(index_file_name(7), "00000000000000000007.index");
    }

    #[test]
    fn parse_file_names() {
        assert_eq!(
            parse_segment_file_name(Path::new("00000000000000001024.dlog")),
            Some(1024)
        );
        assert_eq!(
            parse_segment_file_name(Path::new(&segment_file_name(-3))),
            Some(-3)
        );
        assert_eq!(
            parse_segment_file_name(Path::new("00000000000000001024.index")),
            None
        );
        assert_eq!(parse_segment_file_name(Path::new("notes.dlog")), None);
    }

    #[test]
    fn align_down_values() {
        assert_eq!(align_down(0, 512), 0);
        assert_eq!(align_down(511, 512), 0);
        assert_eq!(align_down(1537, 512), 1536);
        assert_eq!(align_down(100, 0), 100);
    }

    #[test]
    fn align_up_values() {
        assert_eq!(align_up(0, 512), 0);
        assert_eq!(align_up(1, 512), 512);
        assert_eq!(align_up(512, 512), 512);
        assert_eq!(align_up(513, 16), 528);
        assert_eq!(align_up(100, 0), 100);
    }
}
