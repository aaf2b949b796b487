//! Repository pattern implementation for ingested metadata
//!
//! Job bodies only see the [`MetadataRepository`] trait. The relational store
//! behind it lives outside this crate; [`InMemoryMetadataRepository`] backs
//! the binary and the tests.

pub mod metadata;
pub mod traits;

pub use metadata::InMemoryMetadataRepository;
pub use traits::MetadataRepository;
