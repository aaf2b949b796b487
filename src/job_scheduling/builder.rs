//! Job builder contract
//!
//! Every job-defining unit implements [`JobBuilder`]. The scheduler manager
//! never inspects the parent overrides directly: it resolves them once, at
//! registration, into a [`DependencyPolicy`].

use chrono::Utc;
use std::collections::BTreeSet;

use super::types::{
    JobDataMap, JobDescriptor, JobKey, Trigger, TriggerPolicy, DEFAULT_GROUP,
};
use crate::errors::SchedulingResult;

/// Declares a job's identity, schedule and parentage
pub trait JobBuilder: Send + Sync {
    /// Registry tag of the job body
    fn job_type(&self) -> &str;

    /// Job id used when `build_job` is called without an override
    fn default_job_id(&self) -> String;

    fn job_group(&self) -> &str {
        DEFAULT_GROUP
    }

    /// Self-scheduling rule; ignored for jobs with parents
    fn trigger_policy(&self) -> Option<TriggerPolicy>;

    /// Offset applied when this job is scheduled as a chained child
    fn interval_in_minutes(&self) -> u32;

    fn is_one_shot(&self) -> bool {
        false
    }

    fn job_data(&self) -> JobDataMap {
        JobDataMap::new()
    }

    fn parent_job_key(&self) -> Option<JobKey> {
        None
    }

    /// Takes precedence over [`JobBuilder::parent_job_key`] when non-empty
    fn parent_job_keys(&self) -> Option<BTreeSet<JobKey>> {
        None
    }

    fn job_key(&self, job_id: Option<&str>) -> JobKey {
        let name = job_id
            .map(str::to_string)
            .unwrap_or_else(|| self.default_job_id());
        JobKey::new(name, self.job_group())
    }

    /// Parents after applying the plural-over-singular precedence
    fn resolved_parent_keys(&self) -> BTreeSet<JobKey> {
        match self.parent_job_keys() {
            Some(keys) if !keys.is_empty() => keys,
            _ => self.parent_job_key().into_iter().collect(),
        }
    }

    fn build_job(&self, job_id: Option<&str>) -> JobDescriptor {
        JobDescriptor {
            key: self.job_key(job_id),
            job_type: self.job_type().to_string(),
            trigger_policy: self.trigger_policy(),
            one_shot: self.is_one_shot(),
            parent_keys: self.resolved_parent_keys(),
            payload: self.job_data(),
        }
    }

    /// `None` means "do not self-schedule". Jobs with any parent never
    /// self-schedule, they run exclusively through chaining.
    fn build_trigger(&self, trigger_id: Option<&str>) -> SchedulingResult<Option<Trigger>> {
        if !self.resolved_parent_keys().is_empty() {
            return Ok(None);
        }
        let Some(policy) = self.trigger_policy() else {
            return Ok(None);
        };

        let job_key = self.job_key(None);
        let name = trigger_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_trigger", job_key.name));
        Trigger::new(name, job_key, policy, Utc::now()).map(Some)
    }
}

/// How a registered job gets onto the schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Scheduled on its own trigger; `None` registers the job without one
    Standalone(Option<Trigger>),
    /// Scheduled `offset_minutes` after every key in `keys` has completed
    ChainedAfter {
        keys: BTreeSet<JobKey>,
        offset_minutes: u32,
    },
}

impl DependencyPolicy {
    pub fn resolve(builder: &dyn JobBuilder) -> SchedulingResult<Self> {
        let keys = builder.resolved_parent_keys();
        if keys.is_empty() {
            Ok(Self::Standalone(builder.build_trigger(None)?))
        } else {
            Ok(Self::ChainedAfter {
                keys,
                offset_minutes: builder.interval_in_minutes(),
            })
        }
    }
}
