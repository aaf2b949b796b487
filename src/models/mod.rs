//! Domain models for ingested metadata

pub mod metadata;

pub use metadata::MetadataKind;
