//! Per-site EPG grabbing, chained after channel ingestion

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use super::metadata::job_key_for;
use super::EPG_GROUP;
use crate::job_scheduling::{Job, JobBuilder, JobDataMap, JobKey, SchedulerHandle, TriggerPolicy};
use crate::models::MetadataKind;
use crate::services::EpgGrabber;

pub const GRAB_EPG_JOB_TYPE: &str = "grab_epg";

const SITE_KEY: &str = "site";
const CONFIG_KEY: &str = "config";
const CHANNELS_KEY: &str = "channels";
const OUTPUT_KEY: &str = "output";

/// One grab job instance per site, sharing the `grab_epg` job type
pub struct EpgGrabJobBuilder {
    site: String,
    work_dir: PathBuf,
    offset_minutes: u32,
}

impl EpgGrabJobBuilder {
    pub fn new(site: impl Into<String>, work_dir: impl Into<PathBuf>, offset_minutes: u32) -> Self {
        Self {
            site: site.into(),
            work_dir: work_dir.into(),
            offset_minutes,
        }
    }

    fn site_file(&self, suffix: &str) -> String {
        self.work_dir
            .join(format!("{}{}", self.site, suffix))
            .to_string_lossy()
            .into_owned()
    }
}

impl JobBuilder for EpgGrabJobBuilder {
    fn job_type(&self) -> &str {
        GRAB_EPG_JOB_TYPE
    }

    fn default_job_id(&self) -> String {
        format!("{}_{}", GRAB_EPG_JOB_TYPE, self.site)
    }

    fn job_group(&self) -> &str {
        EPG_GROUP
    }

    fn trigger_policy(&self) -> Option<TriggerPolicy> {
        None
    }

    fn interval_in_minutes(&self) -> u32 {
        self.offset_minutes
    }

    fn job_data(&self) -> JobDataMap {
        JobDataMap::from([
            (SITE_KEY.to_string(), self.site.clone()),
            (CONFIG_KEY.to_string(), self.site_file(".config.js")),
            (CHANNELS_KEY.to_string(), self.site_file(".channels.xml")),
            (OUTPUT_KEY.to_string(), self.site_file(".xml")),
        ])
    }

    fn parent_job_key(&self) -> Option<JobKey> {
        Some(job_key_for(MetadataKind::Channels))
    }
}

/// Runs the external grabber with the paths carried in the job data
pub struct EpgGrabJob {
    grabber: EpgGrabber,
}

impl EpgGrabJob {
    pub fn new(grabber: EpgGrabber) -> Self {
        Self { grabber }
    }
}

fn required<'a>(job_data: &'a JobDataMap, key: &str) -> anyhow::Result<&'a str> {
    job_data
        .get(key)
        .map(String::as_str)
        .with_context(|| format!("Missing '{key}' in job data"))
}

#[async_trait]
impl Job for EpgGrabJob {
    async fn execute(
        &self,
        job_data: &JobDataMap,
        _scheduler: SchedulerHandle,
    ) -> anyhow::Result<()> {
        let site = required(job_data, SITE_KEY)?;
        let output = Path::new(required(job_data, OUTPUT_KEY)?);

        let code = self
            .grabber
            .grab(
                Path::new(required(job_data, CONFIG_KEY)?),
                Path::new(required(job_data, CHANNELS_KEY)?),
                output,
            )
            .await
            .with_context(|| format!("EPG grab failed for site {site}"))?;

        if code != 0 {
            bail!("EPG grabber exited with code {code} for site {site}");
        }
        info!("Grabbed EPG for site {} into {}", site, output.display());
        Ok(())
    }
}
