//! Repository trait definitions

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::MetadataKind;

/// Storage for ingested metadata records
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Replace every stored record of `kind` with `records`
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of records stored
    async fn save(&self, kind: MetadataKind, records: Vec<serde_json::Value>) -> AppResult<usize>;

    /// Number of records currently stored for `kind`
    async fn count(&self, kind: MetadataKind) -> AppResult<usize>;

    /// Whether `kind` has been ingested at least once
    async fn exists(&self, kind: MetadataKind) -> AppResult<bool>;
}
