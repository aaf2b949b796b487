//! Live schedule storage
//!
//! Holds registered job descriptors and their triggers. Every mutation that
//! touches triggers happens under a single write lock, which is what upholds
//! the one-trigger-per-key invariant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{
    FiredTrigger, JobDescriptor, JobKey, RescheduleOutcome, ScheduleOutcome, Trigger,
};
use crate::errors::{SchedulingError, SchedulingResult};

/// Storage for jobs and their triggers
///
/// Job state persistence across restarts is up to the implementation; a
/// store shared between two scheduler managers behaves like a redeploy.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Register a job without scheduling it. Returns false if the key was
    /// taken and `replace` was not set.
    async fn add_job(&self, job: JobDescriptor, replace: bool) -> bool;

    /// Store `job` (replacing its descriptor) and `trigger`, unless the key
    /// already has a live trigger.
    async fn schedule_job(
        &self,
        job: JobDescriptor,
        trigger: Trigger,
    ) -> SchedulingResult<ScheduleOutcome>;

    /// Schedule a trigger for an already registered job
    async fn schedule_trigger(&self, trigger: Trigger) -> SchedulingResult<ScheduleOutcome>;

    /// Reschedule a chained job: keep a future-dated pending trigger,
    /// otherwise drop any stale trigger and the job, then store both fresh.
    async fn reschedule_job(
        &self,
        job: JobDescriptor,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> RescheduleOutcome;

    /// Remove a one-shot job and its trigger after its run. The key is
    /// remembered and refused by every later registration.
    async fn retire_job(&self, key: &JobKey) -> bool;

    async fn is_retired(&self, key: &JobKey) -> bool;

    async fn check_job_exists(&self, key: &JobKey) -> bool;

    async fn check_trigger_exists(&self, key: &JobKey) -> bool;

    async fn get_job(&self, key: &JobKey) -> Option<JobDescriptor>;

    async fn get_trigger(&self, key: &JobKey) -> Option<Trigger>;

    async fn job_keys(&self) -> Vec<JobKey>;

    async fn trigger_keys(&self) -> Vec<JobKey>;

    /// Claim up to `max` due triggers, earliest first. Claimed jobs are
    /// marked executing and are not claimed again until released.
    async fn acquire_due_triggers(&self, now: DateTime<Utc>, max: usize) -> Vec<FiredTrigger>;

    /// Clear the executing mark set by `acquire_due_triggers`
    async fn release(&self, key: &JobKey);

    /// Earliest pending fire time across all triggers
    async fn next_fire_time(&self) -> Option<DateTime<Utc>>;

    async fn stats(&self) -> JobStoreStats;
}

/// Statistics about the store state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStoreStats {
    pub registered_jobs: usize,
    pub live_triggers: usize,
    pub executing_jobs: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobKey, JobDescriptor>,
    /// Keyed by job key: at most one trigger per job
    triggers: HashMap<JobKey, Trigger>,
    executing: HashSet<JobKey>,
    /// One-shot jobs that already ran
    retired: HashSet<JobKey>,
}

/// Process-local job store
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: RwLock<StoreState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn add_job(&self, job: JobDescriptor, replace: bool) -> bool {
        let mut state = self.state.write().await;
        if state.retired.contains(&job.key) {
            debug!("Job {} is retired, not registering it", job.key);
            return false;
        }
        if !replace && state.jobs.contains_key(&job.key) {
            debug!("Job {} already registered, not replacing", job.key);
            return false;
        }
        debug!("Registered job {} (type: {})", job.key, job.job_type);
        state.jobs.insert(job.key.clone(), job);
        true
    }

    async fn schedule_job(
        &self,
        job: JobDescriptor,
        trigger: Trigger,
    ) -> SchedulingResult<ScheduleOutcome> {
        if trigger.job_key != job.key {
            return Err(SchedulingError::InvalidTrigger {
                job: job.key,
                reason: format!("trigger '{}' targets job '{}'", trigger.name, trigger.job_key),
            });
        }

        let mut state = self.state.write().await;
        if state.retired.contains(&job.key) {
            debug!("Job {} is retired, not scheduling it", job.key);
            return Ok(ScheduleOutcome::Retired);
        }
        if state.triggers.contains_key(&job.key) {
            debug!("Job {} already has a live trigger, skipping", job.key);
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }

        info!(
            "Scheduled job {} (trigger: {}, next fire: {})",
            job.key,
            trigger.name,
            trigger.next_fire_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        state.triggers.insert(job.key.clone(), trigger);
        state.jobs.insert(job.key.clone(), job);
        Ok(ScheduleOutcome::Scheduled)
    }

    async fn schedule_trigger(&self, trigger: Trigger) -> SchedulingResult<ScheduleOutcome> {
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(&trigger.job_key) {
            return Err(SchedulingError::JobNotFound {
                job: trigger.job_key,
            });
        }
        if state.triggers.contains_key(&trigger.job_key) {
            debug!("Job {} already has a live trigger, skipping", trigger.job_key);
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }

        info!(
            "Scheduled trigger {} for job {} at {}",
            trigger.name,
            trigger.job_key,
            trigger.next_fire_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        state.triggers.insert(trigger.job_key.clone(), trigger);
        Ok(ScheduleOutcome::Scheduled)
    }

    async fn reschedule_job(
        &self,
        job: JobDescriptor,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> RescheduleOutcome {
        let mut state = self.state.write().await;
        if state.retired.contains(&job.key) {
            debug!("Job {} is retired, not rescheduling it", job.key);
            return RescheduleOutcome::Retired;
        }

        if let Some(existing) = state.triggers.get(&job.key) {
            if existing.next_fire_time > now {
                debug!(
                    "Job {} already pending at {}, keeping existing trigger",
                    job.key,
                    existing.next_fire_time.format("%Y-%m-%d %H:%M:%S UTC")
                );
                return RescheduleOutcome::PendingTriggerKept;
            }
            debug!("Removing stale trigger {} for job {}", existing.name, job.key);
        }

        state.triggers.remove(&job.key);
        state.jobs.remove(&job.key);

        info!(
            "Rescheduled job {} for {}",
            job.key,
            trigger.next_fire_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        state.triggers.insert(job.key.clone(), trigger);
        state.jobs.insert(job.key.clone(), job);
        RescheduleOutcome::Rescheduled
    }

    async fn retire_job(&self, key: &JobKey) -> bool {
        let mut state = self.state.write().await;
        state.triggers.remove(key);
        state.retired.insert(key.clone());
        state.jobs.remove(key).is_some()
    }

    async fn is_retired(&self, key: &JobKey) -> bool {
        self.state.read().await.retired.contains(key)
    }

    async fn check_job_exists(&self, key: &JobKey) -> bool {
        self.state.read().await.jobs.contains_key(key)
    }

    async fn check_trigger_exists(&self, key: &JobKey) -> bool {
        self.state.read().await.triggers.contains_key(key)
    }

    async fn get_job(&self, key: &JobKey) -> Option<JobDescriptor> {
        self.state.read().await.jobs.get(key).cloned()
    }

    async fn get_trigger(&self, key: &JobKey) -> Option<Trigger> {
        self.state.read().await.triggers.get(key).cloned()
    }

    async fn job_keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.state.read().await.jobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn trigger_keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.state.read().await.triggers.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn acquire_due_triggers(&self, now: DateTime<Utc>, max: usize) -> Vec<FiredTrigger> {
        if max == 0 {
            return Vec::new();
        }

        let mut state = self.state.write().await;
        let StoreState {
            jobs,
            triggers,
            executing,
            ..
        } = &mut *state;

        let mut due: Vec<(DateTime<Utc>, JobKey)> = triggers
            .iter()
            .filter(|(key, trigger)| trigger.is_due(now) && !executing.contains(*key))
            .map(|(key, trigger)| (trigger.next_fire_time, key.clone()))
            .collect();
        due.sort();

        let mut fired = Vec::new();
        for (scheduled_fire_time, key) in due {
            if fired.len() >= max {
                break;
            }

            let Some(job) = jobs.get(&key).cloned() else {
                warn!("Dropping trigger for unregistered job {}", key);
                triggers.remove(&key);
                continue;
            };
            let Some(trigger) = triggers.get_mut(&key) else {
                continue;
            };

            let trigger_name = trigger.name.clone();
            if !trigger.advance(now) {
                debug!("Trigger {} for job {} is complete", trigger_name, key);
                triggers.remove(&key);
            }

            executing.insert(key);
            fired.push(FiredTrigger {
                job,
                trigger_name,
                scheduled_fire_time,
                fired_at: now,
            });
        }

        if !fired.is_empty() {
            debug!("Acquired {} due triggers", fired.len());
        }
        fired
    }

    async fn release(&self, key: &JobKey) {
        self.state.write().await.executing.remove(key);
    }

    async fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .await
            .triggers
            .values()
            .map(|trigger| trigger.next_fire_time)
            .min()
    }

    async fn stats(&self) -> JobStoreStats {
        let state = self.state.read().await;
        JobStoreStats {
            registered_jobs: state.jobs.len(),
            live_triggers: state.triggers.len(),
            executing_jobs: state.executing.len(),
        }
    }
}
