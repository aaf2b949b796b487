//! Timer loop dispatching due triggers onto the worker pool

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job_executor::JobExecutor;
use super::job_store::JobStore;

/// Service responsible for firing due triggers
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    workers: Arc<Semaphore>,
    pool_size: usize,
    poll_interval: Duration,
    shutdown_grace: Duration,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
        pool_size: usize,
        poll_interval: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            store,
            executor,
            workers: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            poll_interval,
            shutdown_grace,
        }
    }

    /// Number of job bodies currently holding a worker
    pub fn running_count(&self) -> usize {
        self.pool_size - self.workers.available_permits()
    }

    /// Run the timer loop until `cancellation_token` fires
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting job runner (workers: {}, poll interval: {})",
            self.pool_size,
            humantime::format_duration(self.poll_interval)
        );
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.dispatch_due().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Job runner received cancellation signal");
                    self.wait_for_running_jobs_to_complete().await;
                    break;
                }
            }
        }

        info!("Job runner stopped");
    }

    /// Claim due triggers for every free worker and hand them to the executor.
    ///
    /// Workers are reserved before any trigger is claimed; unused permits go
    /// back to the pool when dropped.
    pub async fn dispatch_due(&self) -> usize {
        let mut permits = Vec::new();
        while let Ok(permit) = self.workers.clone().try_acquire_owned() {
            permits.push(permit);
        }
        if permits.is_empty() {
            debug!("All {} workers busy, waiting", self.pool_size);
            return 0;
        }

        let fired = self.store.acquire_due_triggers(Utc::now(), permits.len()).await;
        let dispatched = fired.len();
        for (trigger, permit) in fired.into_iter().zip(permits) {
            self.executor.spawn(trigger, permit);
        }
        dispatched
    }

    async fn wait_for_running_jobs_to_complete(&self) {
        let running = self.running_count();
        if running == 0 {
            return;
        }

        info!(
            "Waiting up to {} for {} running job(s) to complete...",
            humantime::format_duration(self.shutdown_grace),
            running
        );
        let all_workers = u32::try_from(self.pool_size).unwrap_or(u32::MAX);
        match timeout(self.shutdown_grace, self.workers.acquire_many(all_workers)).await {
            Ok(Ok(_permits)) => info!("All jobs completed successfully"),
            Ok(Err(_)) => warn!("Worker pool closed while waiting for running jobs"),
            Err(_) => warn!(
                "Shutdown grace period elapsed with {} job(s) still running",
                self.running_count()
            ),
        }
    }
}
