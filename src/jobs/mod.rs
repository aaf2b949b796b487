//! Concrete ingestion jobs and their builders

pub mod epg;
pub mod metadata;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::errors::AppResult;
use crate::job_scheduling::{JobBuilder, JobRegistry};
use crate::models::MetadataKind;
use crate::repositories::MetadataRepository;
use crate::services::EpgGrabber;
use crate::sources::IptvApiClient;

pub use epg::{EpgGrabJob, EpgGrabJobBuilder, GRAB_EPG_JOB_TYPE};
pub use metadata::{job_key_for, job_type_for, MetadataIngestJob, MetadataJobBuilder};

pub const INGESTION_GROUP: &str = "ingestion";
pub const EPG_GROUP: &str = "epg";

/// Register every job body this crate provides
pub fn register_all(
    registry: &mut JobRegistry,
    config: &Config,
    repository: Arc<dyn MetadataRepository>,
) -> AppResult<()> {
    let client = IptvApiClient::new(
        config.ingestion.api_base_url.clone(),
        config.ingestion.request_timeout,
    )?;

    for kind in MetadataKind::ALL {
        registry.register_instance(
            job_type_for(kind),
            Arc::new(MetadataIngestJob::new(kind, client.clone(), repository.clone())),
        );
    }

    if config.epg.enabled {
        let grabber = EpgGrabber::new(
            config.epg.grabber_command.clone(),
            config.epg.grabber_args.clone(),
            config.epg.timeout,
        );
        registry.register_instance(GRAB_EPG_JOB_TYPE, Arc::new(EpgGrabJob::new(grabber)));
    }

    info!("Registered job types: {}", registry.job_types().join(", "));
    Ok(())
}

/// Builders for the default ingestion graph
pub fn default_builders(config: &Config) -> Vec<Arc<dyn JobBuilder>> {
    let mut builders: Vec<Arc<dyn JobBuilder>> = MetadataKind::ALL
        .into_iter()
        .map(|kind| {
            Arc::new(MetadataJobBuilder::new(kind, &config.ingestion)) as Arc<dyn JobBuilder>
        })
        .collect();

    if config.epg.enabled {
        builders.extend(config.epg.sites.iter().map(|site| {
            Arc::new(EpgGrabJobBuilder::new(
                site.clone(),
                config.epg.work_dir.clone(),
                config.epg.offset_minutes,
            )) as Arc<dyn JobBuilder>
        }));
    }

    builders
}
