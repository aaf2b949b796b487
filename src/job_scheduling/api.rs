//! External API for the job scheduling system

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::chaining_listener::{ChainingListener, ExecutionSnapshot};
use super::job_store::JobStore;
use super::types::{JobDescriptor, JobKey, ScheduleOutcome, Trigger, TriggerPolicy};
use crate::errors::{SchedulingError, SchedulingResult};

/// Cloneable view of the live schedule, handed to job bodies and callers
/// outside the scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    store: Arc<dyn JobStore>,
    chaining: ChainingListener,
}

impl SchedulerHandle {
    pub fn new(store: Arc<dyn JobStore>, chaining: ChainingListener) -> Self {
        Self { store, chaining }
    }

    pub async fn job(&self, key: &JobKey) -> Option<JobDescriptor> {
        self.store.get_job(key).await
    }

    pub async fn trigger_of(&self, key: &JobKey) -> Option<Trigger> {
        self.store.get_trigger(key).await
    }

    pub async fn next_fire_time(&self, key: &JobKey) -> Option<DateTime<Utc>> {
        self.store
            .get_trigger(key)
            .await
            .map(|trigger| trigger.next_fire_time)
    }

    /// Keys with a live trigger
    pub async fn scheduled_job_keys(&self) -> Vec<JobKey> {
        self.store.trigger_keys().await
    }

    /// Every registered key, scheduled or not
    pub async fn job_keys(&self) -> Vec<JobKey> {
        self.store.job_keys().await
    }

    /// Fire a registered job as soon as the timer loop next polls.
    ///
    /// A job that already has a live trigger is left alone.
    pub async fn trigger_now(&self, key: &JobKey) -> SchedulingResult<ScheduleOutcome> {
        if !self.store.check_job_exists(key).await {
            return Err(SchedulingError::JobNotFound { job: key.clone() });
        }

        let now = Utc::now();
        let trigger = Trigger::new(
            format!("manual:{}", key.name),
            key.clone(),
            TriggerPolicy::FireOnceAt { fire_at: now },
            now,
        )?;
        let outcome = self.store.schedule_trigger(trigger).await?;
        if outcome == ScheduleOutcome::Scheduled {
            info!("API: Triggered immediate run of job {}", key);
        }
        Ok(outcome)
    }

    pub async fn execution_snapshot(&self) -> SchedulingResult<ExecutionSnapshot> {
        self.chaining.snapshot().await
    }

    /// Health check endpoint for the scheduling system
    pub async fn health_check(&self) -> SchedulingHealthStatus {
        let stats = self.store.stats().await;
        let listener_running = self.chaining.snapshot().await.is_ok();

        SchedulingHealthStatus {
            is_healthy: listener_running,
            listener_running,
            registered_jobs: stats.registered_jobs,
            live_triggers: stats.live_triggers,
            executing_jobs: stats.executing_jobs,
            next_fire_time: self.store.next_fire_time().await,
        }
    }
}

/// Health status of the scheduling system
#[derive(Debug, Clone, Serialize)]
pub struct SchedulingHealthStatus {
    pub is_healthy: bool,
    pub listener_running: bool,
    pub registered_jobs: usize,
    pub live_triggers: usize,
    pub executing_jobs: usize,
    pub next_fire_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::job_store::MemoryJobStore;
    use crate::job_scheduling::types::{CompletionGating, JobDataMap};
    use std::collections::BTreeSet;

    fn channels() -> JobDescriptor {
        JobDescriptor {
            key: JobKey::new("ingest_channels", "ingestion"),
            job_type: "ingest_channels".to_string(),
            trigger_policy: None,
            one_shot: false,
            parent_keys: BTreeSet::new(),
            payload: JobDataMap::new(),
        }
    }

    #[tokio::test]
    async fn test_trigger_now_schedules_registered_job_once() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let handle = SchedulerHandle::new(
            store.clone(),
            ChainingListener::spawn(store.clone(), CompletionGating::default()),
        );
        let job = channels();

        assert!(matches!(
            handle.trigger_now(&job.key).await,
            Err(SchedulingError::JobNotFound { .. })
        ));

        store.add_job(job.clone(), false).await;
        assert_eq!(handle.trigger_now(&job.key).await.unwrap(), ScheduleOutcome::Scheduled);
        assert_eq!(
            handle.trigger_now(&job.key).await.unwrap(),
            ScheduleOutcome::AlreadyScheduled
        );
        assert_eq!(handle.scheduled_job_keys().await, vec![job.key.clone()]);
        assert!(handle.next_fire_time(&job.key).await.unwrap() <= Utc::now());
    }

    #[tokio::test]
    async fn test_health_check_reports_store_state() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let handle = SchedulerHandle::new(
            store.clone(),
            ChainingListener::spawn(store.clone(), CompletionGating::default()),
        );
        store.add_job(channels(), false).await;

        let health = handle.health_check().await;
        assert!(health.is_healthy);
        assert_eq!(health.registered_jobs, 1);
        assert_eq!(health.live_triggers, 0);
        assert_eq!(health.next_fire_time, None);
    }
}
