use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::MetadataRepository;
use crate::errors::AppResult;
use crate::models::MetadataKind;

/// Process-local metadata repository
#[derive(Debug, Default)]
pub struct InMemoryMetadataRepository {
    records: RwLock<HashMap<MetadataKind, Vec<serde_json::Value>>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn save(&self, kind: MetadataKind, records: Vec<serde_json::Value>) -> AppResult<usize> {
        let stored = records.len();
        self.records.write().await.insert(kind, records);
        debug!("Stored {} {} records", stored, kind);
        Ok(stored)
    }

    async fn count(&self, kind: MetadataKind) -> AppResult<usize> {
        Ok(self
            .records
            .read()
            .await
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn exists(&self, kind: MetadataKind) -> AppResult<bool> {
        Ok(self.records.read().await.contains_key(&kind))
    }
}
