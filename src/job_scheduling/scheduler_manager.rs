//! Scheduler manager: registration and lifecycle of the schedule

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::api::SchedulerHandle;
use super::builder::{DependencyPolicy, JobBuilder};
use super::chaining_listener::ChainingListener;
use super::job_executor::JobExecutor;
use super::job_runner::JobRunner;
use super::job_store::JobStore;
use super::listener::ListenerManager;
use super::registry::JobRegistry;
use super::traits::JobListener;
use super::types::{ChainLink, JobKey, ScheduleOutcome};
use crate::config::SchedulerConfig;
use crate::errors::{SchedulingError, SchedulingResult};

/// What registering a single builder did to the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Job stored with a fresh trigger
    Scheduled,
    /// Key already had a live trigger, left untouched
    AlreadyScheduled,
    /// Job stored without a trigger and chained after its parents
    Chained,
    /// Job stored without a trigger and without parents
    Registered,
    /// One-shot job that already ran, left off the schedule
    Retired,
}

struct RunningScheduler {
    cancellation_token: CancellationToken,
    runner_task: JoinHandle<()>,
}

/// Owns the job store, the listeners and the timer loop
pub struct SchedulerManager {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    listeners: Arc<ListenerManager>,
    chaining_listener: ChainingListener,
    handle: SchedulerHandle,
    running: Mutex<Option<RunningScheduler>>,
}

impl SchedulerManager {
    /// Create a manager over `store`. Must be called within a tokio runtime,
    /// the chaining listener task is spawned here.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        registry: JobRegistry,
    ) -> SchedulingResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SchedulingError::startup("no tokio runtime available"));
        }

        let chaining_listener = ChainingListener::spawn(store.clone(), config.completion_gating);
        let handle = SchedulerHandle::new(store.clone(), chaining_listener.clone());

        Ok(Self {
            config,
            store,
            registry: Arc::new(registry),
            listeners: Arc::new(ListenerManager::new()),
            chaining_listener,
            handle,
            running: Mutex::new(None),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn chaining_listener(&self) -> &ChainingListener {
        &self.chaining_listener
    }

    /// Attach an additional job listener, notified after those already added
    pub async fn add_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.listeners.add_job_listener(listener).await;
    }

    pub async fn is_started(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Register every builder and start the timer loop.
    ///
    /// All builders are validated before anything is stored. Calling this on
    /// a started manager is a no-op.
    pub async fn schedule_jobs_and_start<I>(&self, builders: I) -> SchedulingResult<()>
    where
        I: IntoIterator<Item = Arc<dyn JobBuilder>>,
    {
        let builders: Vec<Arc<dyn JobBuilder>> = builders.into_iter().collect();
        let mut running = self.running.lock().await;
        if running.is_some() {
            info!("Scheduler already started, ignoring start request");
            return Ok(());
        }

        let mut known: HashSet<JobKey> = self.store.job_keys().await.into_iter().collect();
        known.extend(builders.iter().map(|builder| builder.job_key(None)));

        let mut resolved = Vec::with_capacity(builders.len());
        for builder in &builders {
            let policy = self.validate(builder.as_ref(), &known)?;
            resolved.push((builder, policy));
        }

        let mut graph = self.stored_parent_links().await;
        for builder in &builders {
            graph.insert(builder.job_key(None), builder.resolved_parent_keys());
        }
        check_acyclic(&graph)?;

        for (builder, policy) in resolved {
            self.apply(builder.as_ref(), policy).await?;
        }

        self.listeners
            .add_job_listener(Arc::new(self.chaining_listener.clone()))
            .await;

        let executor = Arc::new(JobExecutor::new(
            self.registry.clone(),
            self.listeners.clone(),
            self.store.clone(),
            self.handle.clone(),
            self.config.job_timeout,
        ));
        let runner = JobRunner::new(
            self.store.clone(),
            executor,
            self.config.worker_pool_size,
            self.config.poll_interval,
            self.config.shutdown_grace,
        );
        let cancellation_token = CancellationToken::new();
        let loop_token = cancellation_token.clone();
        let runner_task = tokio::spawn(async move { runner.run(loop_token).await });

        *running = Some(RunningScheduler {
            cancellation_token,
            runner_task,
        });
        info!(
            "Scheduler started with {} job(s), {} scheduled",
            self.store.job_keys().await.len(),
            self.store.trigger_keys().await.len()
        );
        Ok(())
    }

    /// Register a single builder, before or after start
    pub async fn register(
        &self,
        builder: &dyn JobBuilder,
    ) -> SchedulingResult<RegistrationOutcome> {
        let mut known: HashSet<JobKey> = self.store.job_keys().await.into_iter().collect();
        known.insert(builder.job_key(None));

        let policy = self.validate(builder, &known)?;
        let mut graph = self.stored_parent_links().await;
        graph.insert(builder.job_key(None), builder.resolved_parent_keys());
        check_acyclic(&graph)?;

        self.apply(builder, policy).await
    }

    /// Stop the timer loop, waiting for running jobs up to the shutdown grace
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Scheduler not running, nothing to shut down");
            return;
        };

        info!("Shutting down scheduler");
        running.cancellation_token.cancel();
        if let Err(e) = running.runner_task.await {
            debug!("Job runner task ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
    }

    fn validate(
        &self,
        builder: &dyn JobBuilder,
        known: &HashSet<JobKey>,
    ) -> SchedulingResult<DependencyPolicy> {
        let job_key = builder.job_key(None);

        if !self.registry.contains(builder.job_type()) {
            return Err(SchedulingError::UnknownJobType {
                job: job_key,
                job_type: builder.job_type().to_string(),
            });
        }

        if let Some(parent) = builder
            .resolved_parent_keys()
            .into_iter()
            .find(|parent| !known.contains(parent))
        {
            return Err(SchedulingError::UnknownParent {
                job: job_key,
                parent,
            });
        }

        DependencyPolicy::resolve(builder)
    }

    /// Parent keys of every chained job already in the store
    async fn stored_parent_links(&self) -> HashMap<JobKey, BTreeSet<JobKey>> {
        let mut graph = HashMap::new();
        for key in self.store.job_keys().await {
            if let Some(job) = self.store.get_job(&key).await {
                if job.is_chained() {
                    graph.insert(key, job.parent_keys);
                }
            }
        }
        graph
    }

    async fn apply(
        &self,
        builder: &dyn JobBuilder,
        policy: DependencyPolicy,
    ) -> SchedulingResult<RegistrationOutcome> {
        let job = builder.build_job(None);
        if self.store.is_retired(&job.key).await {
            info!("One-shot job {} already ran, not registering it again", job.key);
            return Ok(RegistrationOutcome::Retired);
        }

        match policy {
            DependencyPolicy::ChainedAfter {
                keys,
                offset_minutes,
            } => {
                self.store.add_job(job.clone(), true).await;
                self.chaining_listener
                    .add_job_chain_link(ChainLink::new(job, offset_minutes, keys))
                    .await?;
                Ok(RegistrationOutcome::Chained)
            }
            DependencyPolicy::Standalone(Some(trigger)) => {
                if self.store.check_trigger_exists(&job.key).await {
                    debug!("Job {} already has a trigger, skipping", job.key);
                    return Ok(RegistrationOutcome::AlreadyScheduled);
                }
                match self.store.schedule_job(job, trigger).await? {
                    ScheduleOutcome::Scheduled => Ok(RegistrationOutcome::Scheduled),
                    ScheduleOutcome::AlreadyScheduled => {
                        Ok(RegistrationOutcome::AlreadyScheduled)
                    }
                    ScheduleOutcome::Retired => Ok(RegistrationOutcome::Retired),
                }
            }
            DependencyPolicy::Standalone(None) => {
                self.store.add_job(job, true).await;
                Ok(RegistrationOutcome::Registered)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Reject a parent graph in which some job is its own ancestor
fn check_acyclic(graph: &HashMap<JobKey, BTreeSet<JobKey>>) -> SchedulingResult<()> {
    let mut roots: Vec<&JobKey> = graph.keys().collect();
    roots.sort();

    let mut visits = HashMap::new();
    for root in roots {
        if let Some(job) = find_cycle(root, graph, &mut visits) {
            return Err(SchedulingError::DependencyCycle { job });
        }
    }
    Ok(())
}

fn find_cycle<'a>(
    key: &'a JobKey,
    graph: &'a HashMap<JobKey, BTreeSet<JobKey>>,
    visits: &mut HashMap<&'a JobKey, Visit>,
) -> Option<JobKey> {
    match visits.get(key) {
        Some(Visit::Done) => return None,
        Some(Visit::InProgress) => return Some(key.clone()),
        None => {}
    }

    visits.insert(key, Visit::InProgress);
    for parent in graph.get(key).into_iter().flatten() {
        if let Some(job) = find_cycle(parent, graph, visits) {
            return Some(job);
        }
    }
    visits.insert(key, Visit::Done);
    None
}
