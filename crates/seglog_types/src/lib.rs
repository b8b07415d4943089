//! # seglog types
//!
//! Identifiers shared by the storage and replication crates, plus the
//! narrow contracts this core consumes from the rest of a broker.
//!
//! This crate provides:
//! - [`TopicDataId`] and the scalar ids it is built from
//! - [`Generation`] descriptors as handed out by the generation layer
//! - Collaborator traits ([`GenerationSource`], [`LocalMetadata`])
//!
//! Nothing here performs I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collab;
mod error;
mod types;

pub use collab::{GenerationSource, LocalMetadata};
pub use error::{CollabError, CollabResult};
pub use types::{GenId, GenStatus, Generation, RangeIndex, SegmentId, Token, TopicDataId};
