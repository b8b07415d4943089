//! # seglog storage
//!
//! The read path of the segmented log: locating a topic-partition's
//! segment files, reading aligned byte ranges out of them and reassembling
//! chunks that straddle physical reads.
//!
//! ## Components
//!
//! - [`SegmentStore`] resolves segment paths and serves [`SegmentStore::read_range`]
//! - [`StreamBufferPool`] bounds the memory used by concurrent reads
//! - [`scan`] finds the chunk run holding an offset in a filled buffer
//! - [`ReadCursor`] and [`read_chunks_from`] drive the aligned read loop
//! - [`try_read_index_file`] is the best-effort sparse index lookup
//!
//! ## Direct I/O
//!
//! Every physical read length is a multiple of
//! [`DatalogConfig::alignment_size`]. Writers pad segment files with
//! [`seglog_chunk::ALIGNMENT_FLAG`] bytes so that chunk runs can start on
//! aligned positions; the reader skips that padding.
//!
//! This crate performs blocking file I/O. Async callers should run reads
//! on a blocking thread pool.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod error;
mod index;
mod pool;
mod reader;
mod store;

pub use config::{
    align_down, align_up, index_file_name, parse_segment_file_name, segment_file_name, DatalogConfig,
    INDEX_FILE_EXTENSION, SEGMENT_FILE_EXTENSION,
};
pub use cursor::{read_chunks_from, ReadCursor};
pub use error::{FetchFailure, StorageError, StorageResult};
pub use index::{try_read_index_file, IndexEntry, INDEX_ENTRY_SIZE};
pub use pool::{StreamBuffer, StreamBufferPool, STREAM_BUFFER_COUNT, STREAM_BUFFER_FRACTION};
pub use reader::{scan, Scan};
pub use store::{ReadOutcome, SegmentStore};
