//! Job executor service for performing the actual work

use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::api::SchedulerHandle;
use super::job_store::JobStore;
use super::listener::ListenerManager;
use super::registry::JobRegistry;
use super::types::{FiredTrigger, JobCompletion, JobExecutionContext, JobResult};
use crate::errors::JobExecutionFailure;

/// Runs one fired trigger: listeners, body, completion bookkeeping
pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    listeners: Arc<ListenerManager>,
    store: Arc<dyn JobStore>,
    handle: SchedulerHandle,
    job_timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        listeners: Arc<ListenerManager>,
        store: Arc<dyn JobStore>,
        handle: SchedulerHandle,
        job_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            listeners,
            store,
            handle,
            job_timeout,
        }
    }

    /// Run `fired` on its own task, holding `permit` until the completion
    /// has been processed
    pub fn spawn(
        self: &Arc<Self>,
        fired: FiredTrigger,
        permit: OwnedSemaphorePermit,
    ) -> JoinHandle<JobCompletion> {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let completion = executor.execute(fired).await;
            drop(permit);
            completion
        })
    }

    /// Execute a fired trigger to completion.
    ///
    /// Body failures never escape: they are logged and delivered to the
    /// listeners as part of the returned completion.
    pub async fn execute(&self, fired: FiredTrigger) -> JobCompletion {
        let context = JobExecutionContext::from(fired);
        let job_key = context.job_key().clone();

        info!(
            "Starting execution of job {} (trigger: {}, scheduled: {}, instance: {})",
            job_key,
            context.trigger_name,
            context.scheduled_fire_time.format("%Y-%m-%d %H:%M:%S UTC"),
            context.fire_instance_id
        );
        self.listeners.notify_to_be_executed(&context).await;

        let start_time = Instant::now();
        let result = self.run_body(&context).await;
        let completion = JobCompletion {
            completed_at: Utc::now(),
            duration: start_time.elapsed(),
            result,
        };

        match &completion.result {
            Ok(()) => info!(
                "Job {} completed successfully in {:?}",
                job_key, completion.duration
            ),
            Err(e) => error!("{} (after {:?})", e, completion.duration),
        }

        self.listeners
            .notify_was_executed(&context, &completion)
            .await;

        if context.job.one_shot && self.store.retire_job(&job_key).await {
            debug!("Retired one-shot job {}", job_key);
        }
        self.store.release(&job_key).await;

        completion
    }

    async fn run_body(&self, context: &JobExecutionContext) -> JobResult {
        let job_key = context.job_key().clone();
        let Some(job) = self.registry.instantiate(&context.job.job_type) else {
            return Err(JobExecutionFailure::UnknownJobType {
                job: job_key,
                job_type: context.job.job_type.clone(),
            });
        };

        let payload = context.job.payload.clone();
        let handle = self.handle.clone();
        let mut task = tokio::spawn(async move { job.execute(&payload, handle).await });

        match timeout(self.job_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(JobExecutionFailure::Failed {
                job: job_key,
                message: format!("{e:#}"),
            }),
            Ok(Err(join_error)) if join_error.is_panic() => Err(JobExecutionFailure::Panicked {
                job: job_key,
                message: panic_message(join_error.into_panic()),
            }),
            Ok(Err(_)) => Err(JobExecutionFailure::Cancelled { job: job_key }),
            Err(_) => {
                task.abort();
                Err(JobExecutionFailure::TimedOut {
                    job: job_key,
                    timeout: self.job_timeout,
                })
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::chaining_listener::ChainingListener;
    use crate::job_scheduling::job_store::MemoryJobStore;
    use crate::job_scheduling::traits::Job;
    use crate::job_scheduling::types::{
        CompletionGating, JobDataMap, JobDescriptor, JobKey, Trigger,
    };
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct Succeeds;
    struct Fails;
    struct Panics;
    struct Hangs;

    #[async_trait]
    impl Job for Succeeds {
        async fn execute(&self, _: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Job for Fails {
        async fn execute(&self, _: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("HTTP error: 503").context("Failed to fetch languages"))
        }
    }

    #[async_trait]
    impl Job for Panics {
        async fn execute(&self, _: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
            panic!("malformed payload");
        }
    }

    #[async_trait]
    impl Job for Hangs {
        async fn execute(&self, _: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<dyn JobStore>,
        executor: JobExecutor,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let chaining = ChainingListener::spawn(store.clone(), CompletionGating::default());
        let mut registry = JobRegistry::new();
        registry
            .register_instance("succeeds", Arc::new(Succeeds))
            .register_instance("fails", Arc::new(Fails))
            .register_instance("panics", Arc::new(Panics))
            .register_instance("hangs", Arc::new(Hangs));
        let executor = JobExecutor::new(
            Arc::new(registry),
            Arc::new(ListenerManager::new()),
            store.clone(),
            SchedulerHandle::new(store.clone(), chaining),
            Duration::from_millis(50),
        );
        Fixture { store, executor }
    }

    async fn fire(store: &Arc<dyn JobStore>, job_type: &str, one_shot: bool) -> FiredTrigger {
        let job = JobDescriptor {
            key: JobKey::new(job_type, "tests"),
            job_type: job_type.to_string(),
            trigger_policy: None,
            one_shot,
            parent_keys: BTreeSet::new(),
            payload: JobDataMap::new(),
        };
        let now = Utc::now();
        store
            .schedule_job(job.clone(), Trigger::fire_once_at(job.key.clone(), now))
            .await
            .unwrap();
        store.acquire_due_triggers(now, 1).await.remove(0)
    }

    #[tokio::test]
    async fn test_successful_job_releases_key() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "succeeds", false).await;

        let completion = executor.execute(fired).await;

        assert!(completion.succeeded());
        assert_eq!(store.stats().await.executing_jobs, 0);
        assert!(store.check_job_exists(&JobKey::new("succeeds", "tests")).await);
    }

    #[tokio::test]
    async fn test_failure_carries_error_chain() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "fails", false).await;

        let completion = executor.execute(fired).await;

        match completion.result {
            Err(JobExecutionFailure::Failed { message, .. }) => {
                assert_eq!(message, "Failed to fetch languages: HTTP error: 503");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "panics", false).await;

        let completion = executor.execute(fired).await;

        assert!(matches!(
            completion.result,
            Err(JobExecutionFailure::Panicked { ref message, .. }) if message == "malformed payload"
        ));
        assert_eq!(store.stats().await.executing_jobs, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "hangs", false).await;

        let completion = executor.execute(fired).await;

        assert!(matches!(
            completion.result,
            Err(JobExecutionFailure::TimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_reported() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "ingest_planets", false).await;

        let completion = executor.execute(fired).await;

        assert!(matches!(
            completion.result,
            Err(JobExecutionFailure::UnknownJobType { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_holds_permit_until_completion() {
        let Fixture { store, executor } = fixture();
        let executor = Arc::new(executor);
        let workers = Arc::new(tokio::sync::Semaphore::new(1));
        let fired = fire(&store, "hangs", false).await;

        let permit = workers.clone().try_acquire_owned().unwrap();
        let running = executor.spawn(fired, permit);
        assert_eq!(workers.available_permits(), 0);

        let completion = running.await.unwrap();
        assert!(!completion.succeeded());
        assert_eq!(workers.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_job_is_removed_after_run() {
        let Fixture { store, executor } = fixture();
        let fired = fire(&store, "succeeds", true).await;

        executor.execute(fired).await;

        let key = JobKey::new("succeeds", "tests");
        assert!(!store.check_job_exists(&key).await);
        assert!(store.is_retired(&key).await);
        assert_eq!(store.stats().await.executing_jobs, 0);
    }
}
