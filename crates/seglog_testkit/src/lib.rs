//! # seglog testkit
//!
//! Test utilities for seglog.
//!
//! This crate provides:
//! - Segment fixtures ([`SegmentWriter`]) and a short-read wrapper ([`ShortReader`])
//! - Property-based test generators using proptest
//! - Byte-exact format vectors for cross-implementation checks
//! - An in-memory [`MemoryMetadata`] collaborator
//! - [`init_tracing`] for readable logs in failing tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seglog_testkit::prelude::*;
//!
//! #[test]
//! fn reads_back() {
//!     init_tracing();
//!     let mut writer = SegmentWriter::new(512);
//!     for chunk in contiguous_chunks(0, 10, 4, 100) {
//!         writer.append_aligned(&chunk);
//!     }
//!     // ... write the files and read them through the store
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;

/// Installs a fmt subscriber that writes through the test harness.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call
/// from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
