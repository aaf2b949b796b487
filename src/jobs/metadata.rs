//! Metadata ingestion jobs
//!
//! Dependency graph:
//! - languages and categories run on their own interval
//! - countries run after languages
//! - channels run after both countries and categories

use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::INGESTION_GROUP;
use crate::config::IngestionConfig;
use crate::job_scheduling::{Job, JobBuilder, JobDataMap, JobKey, SchedulerHandle, TriggerPolicy};
use crate::models::MetadataKind;
use crate::repositories::MetadataRepository;
use crate::sources::IptvApiClient;

/// Registry tag of the ingestion job for `kind`
pub fn job_type_for(kind: MetadataKind) -> &'static str {
    match kind {
        MetadataKind::Languages => "ingest_languages",
        MetadataKind::Categories => "ingest_categories",
        MetadataKind::Countries => "ingest_countries",
        MetadataKind::Channels => "ingest_channels",
    }
}

pub fn job_key_for(kind: MetadataKind) -> JobKey {
    JobKey::new(job_type_for(kind), INGESTION_GROUP)
}

pub struct MetadataJobBuilder {
    kind: MetadataKind,
    interval_minutes: u32,
    offset_minutes: u32,
}

impl MetadataJobBuilder {
    pub fn new(kind: MetadataKind, config: &IngestionConfig) -> Self {
        let (interval_minutes, offset_minutes) = match kind {
            MetadataKind::Languages => (
                config.languages_interval_minutes,
                config.languages_interval_minutes,
            ),
            MetadataKind::Categories => (
                config.categories_interval_minutes,
                config.categories_interval_minutes,
            ),
            MetadataKind::Countries => (0, config.countries_offset_minutes),
            MetadataKind::Channels => (0, config.channels_offset_minutes),
        };
        Self {
            kind,
            interval_minutes,
            offset_minutes,
        }
    }
}

impl JobBuilder for MetadataJobBuilder {
    fn job_type(&self) -> &str {
        job_type_for(self.kind)
    }

    fn default_job_id(&self) -> String {
        job_type_for(self.kind).to_string()
    }

    fn job_group(&self) -> &str {
        INGESTION_GROUP
    }

    fn trigger_policy(&self) -> Option<TriggerPolicy> {
        match self.kind {
            MetadataKind::Languages | MetadataKind::Categories => {
                Some(TriggerPolicy::every_minutes(self.interval_minutes))
            }
            MetadataKind::Countries | MetadataKind::Channels => None,
        }
    }

    fn interval_in_minutes(&self) -> u32 {
        self.offset_minutes
    }

    fn job_data(&self) -> JobDataMap {
        JobDataMap::from([("kind".to_string(), self.kind.to_string())])
    }

    fn parent_job_key(&self) -> Option<JobKey> {
        match self.kind {
            MetadataKind::Countries => Some(job_key_for(MetadataKind::Languages)),
            _ => None,
        }
    }

    fn parent_job_keys(&self) -> Option<BTreeSet<JobKey>> {
        match self.kind {
            MetadataKind::Channels => Some(BTreeSet::from([
                job_key_for(MetadataKind::Countries),
                job_key_for(MetadataKind::Categories),
            ])),
            _ => None,
        }
    }
}

/// Fetches one metadata kind and replaces it in the repository
pub struct MetadataIngestJob {
    kind: MetadataKind,
    client: IptvApiClient,
    repository: Arc<dyn MetadataRepository>,
}

impl MetadataIngestJob {
    pub fn new(
        kind: MetadataKind,
        client: IptvApiClient,
        repository: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            kind,
            client,
            repository,
        }
    }
}

#[async_trait]
impl Job for MetadataIngestJob {
    async fn execute(
        &self,
        _job_data: &JobDataMap,
        _scheduler: SchedulerHandle,
    ) -> anyhow::Result<()> {
        let records = self
            .client
            .fetch(self.kind)
            .await
            .with_context(|| format!("Failed to fetch {}", self.kind))?;
        let stored = self
            .repository
            .save(self.kind, records)
            .await
            .with_context(|| format!("Failed to store {}", self.kind))?;

        info!("Ingested {} {} records", stored, self.kind);
        Ok(())
    }
}
