//! Dependency-based job chaining
//!
//! The chaining listener owns all execution state (executed / in-progress
//! flags, per-link arrivals) inside a single task. Listener callbacks and
//! registration send commands over a channel and wait for the reply, so
//! every state transition for a completion, including the eligibility check
//! and the resulting reschedule, happens as one serialized step.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::job_store::JobStore;
use super::traits::JobListener;
use super::types::{
    ChainLink, CompletionGating, JobCompletion, JobExecutionContext, JobKey, JobResult,
    RescheduleOutcome, Trigger,
};
use crate::errors::{SchedulingError, SchedulingResult};

pub const CHAINING_LISTENER_NAME: &str = "chaining_listener";

/// Lifecycle phase of a job as seen by the chaining listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    /// `job_to_be_executed` received, completion pending
    Fired,
    Completed,
}

/// Per-job bookkeeping reported by [`ChainingListener::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobExecutionState {
    pub job: JobKey,
    /// Last counted completion is newer than the last start
    pub executed: bool,
    /// Scheduled by chaining and not yet completed
    pub in_progress: bool,
    pub phase: JobPhase,
    pub last_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLinkState {
    pub job: JobKey,
    pub offset_minutes: u32,
    pub execute_after: BTreeSet<JobKey>,
    /// Parents whose completion arrived since the child last fired
    pub arrived: BTreeSet<JobKey>,
}

/// Point-in-time copy of the listener state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSnapshot {
    pub jobs: Vec<JobExecutionState>,
    pub links: Vec<ChainLinkState>,
    pub retired: Vec<JobKey>,
}

impl ExecutionSnapshot {
    pub fn job(&self, key: &JobKey) -> Option<&JobExecutionState> {
        self.jobs.iter().find(|state| &state.job == key)
    }

    pub fn link(&self, key: &JobKey) -> Option<&ChainLinkState> {
        self.links.iter().find(|link| &link.job == key)
    }
}

/// A child that was put on the schedule by a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainedSchedule {
    pub job: JobKey,
    pub fire_at: DateTime<Utc>,
    pub outcome: RescheduleOutcome,
}

enum ListenerCommand {
    AddChainLink {
        link: ChainLink,
        respond: oneshot::Sender<()>,
    },
    JobStarted {
        job: JobKey,
        respond: oneshot::Sender<()>,
    },
    JobCompleted {
        job: JobKey,
        completed_at: DateTime<Utc>,
        result: JobResult,
        one_shot: bool,
        respond: oneshot::Sender<Vec<ChainedSchedule>>,
    },
    Snapshot {
        respond: oneshot::Sender<ExecutionSnapshot>,
    },
}

/// Handle to the chaining listener task
#[derive(Clone)]
pub struct ChainingListener {
    commands: mpsc::UnboundedSender<ListenerCommand>,
}

impl ChainingListener {
    /// Spawn the listener task on the current tokio runtime
    pub fn spawn(store: Arc<dyn JobStore>, gating: CompletionGating) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let state = ChainState::new(store, gating);
        tokio::spawn(state.run(receiver));
        Self { commands }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ListenerCommand,
    ) -> SchedulingResult<T> {
        let (respond, response) = oneshot::channel();
        self.commands
            .send(command(respond))
            .map_err(|_| SchedulingError::ListenerUnavailable)?;
        response
            .await
            .map_err(|_| SchedulingError::ListenerUnavailable)
    }

    /// Register or replace the link for `link.job.key`
    pub async fn add_job_chain_link(&self, link: ChainLink) -> SchedulingResult<()> {
        self.request(|respond| ListenerCommand::AddChainLink { link, respond })
            .await
    }

    pub async fn record_start(&self, job: JobKey) -> SchedulingResult<()> {
        self.request(|respond| ListenerCommand::JobStarted { job, respond })
            .await
    }

    /// Record a completion and schedule every child it makes eligible
    pub async fn record_completion(
        &self,
        job: JobKey,
        completed_at: DateTime<Utc>,
        result: JobResult,
        one_shot: bool,
    ) -> SchedulingResult<Vec<ChainedSchedule>> {
        self.request(|respond| ListenerCommand::JobCompleted {
            job,
            completed_at,
            result,
            one_shot,
            respond,
        })
        .await
    }

    pub async fn snapshot(&self) -> SchedulingResult<ExecutionSnapshot> {
        self.request(|respond| ListenerCommand::Snapshot { respond })
            .await
    }
}

#[async_trait]
impl JobListener for ChainingListener {
    fn name(&self) -> &str {
        CHAINING_LISTENER_NAME
    }

    async fn job_to_be_executed(&self, context: &JobExecutionContext) {
        if let Err(e) = self.record_start(context.job_key().clone()).await {
            warn!("Could not record start of job {}: {}", context.job_key(), e);
        }
    }

    async fn job_was_executed(&self, context: &JobExecutionContext, completion: &JobCompletion) {
        let result = self
            .record_completion(
                context.job_key().clone(),
                completion.completed_at,
                completion.result.clone(),
                context.job.one_shot,
            )
            .await;
        if let Err(e) = result {
            warn!("Could not record completion of job {}: {}", context.job_key(), e);
        }
    }
}

#[derive(Debug, Default)]
struct JobFlags {
    executed: bool,
    in_progress: bool,
    phase: JobPhase,
    last_completed_at: Option<DateTime<Utc>>,
}

struct LinkEntry {
    link: ChainLink,
    arrived: HashSet<JobKey>,
}

struct ChainState {
    store: Arc<dyn JobStore>,
    gating: CompletionGating,
    flags: HashMap<JobKey, JobFlags>,
    links: Vec<LinkEntry>,
    retired: HashSet<JobKey>,
}

impl ChainState {
    fn new(store: Arc<dyn JobStore>, gating: CompletionGating) -> Self {
        Self {
            store,
            gating,
            flags: HashMap::new(),
            links: Vec::new(),
            retired: HashSet::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ListenerCommand>) {
        debug!("Chaining listener started");
        while let Some(command) = commands.recv().await {
            match command {
                ListenerCommand::AddChainLink { link, respond } => {
                    self.add_link(link);
                    let _ = respond.send(());
                }
                ListenerCommand::JobStarted { job, respond } => {
                    self.on_started(job);
                    let _ = respond.send(());
                }
                ListenerCommand::JobCompleted {
                    job,
                    completed_at,
                    result,
                    one_shot,
                    respond,
                } => {
                    let scheduled = self.on_completed(job, completed_at, result, one_shot).await;
                    let _ = respond.send(scheduled);
                }
                ListenerCommand::Snapshot { respond } => {
                    let _ = respond.send(self.snapshot());
                }
            }
        }
        debug!("Chaining listener stopped");
    }

    fn add_link(&mut self, link: ChainLink) {
        if let Some(entry) = self
            .links
            .iter_mut()
            .find(|entry| entry.link.job.key == link.job.key)
        {
            debug!("Replacing chain link for job {}", link.job.key);
            entry.arrived.retain(|parent| link.execute_after.contains(parent));
            entry.link = link;
            return;
        }

        debug!(
            "Chaining job {} after {} parent(s), offset {}m",
            link.job.key,
            link.execute_after.len(),
            link.offset_minutes
        );
        self.links.push(LinkEntry {
            link,
            arrived: HashSet::new(),
        });
    }

    fn on_started(&mut self, job: JobKey) {
        if let Some(entry) = self.links.iter_mut().find(|entry| entry.link.job.key == job) {
            entry.arrived.clear();
        }
        let flags = self.flags.entry(job).or_default();
        flags.executed = false;
        flags.phase = JobPhase::Fired;
    }

    async fn on_completed(
        &mut self,
        job: JobKey,
        completed_at: DateTime<Utc>,
        result: JobResult,
        one_shot: bool,
    ) -> Vec<ChainedSchedule> {
        let counted = self.gating.counts(&result);
        {
            let flags = self.flags.entry(job.clone()).or_default();
            flags.in_progress = false;
            flags.phase = JobPhase::Completed;
            flags.last_completed_at = Some(completed_at);
            if counted {
                flags.executed = true;
            }
        }
        if one_shot {
            self.retired.insert(job.clone());
        }
        if !counted {
            debug!("Completion of {} does not satisfy dependents", job);
            return Vec::new();
        }

        let mut eligible = Vec::new();
        for entry in self.links.iter_mut().filter(|entry| entry.link.depends_on(&job)) {
            entry.arrived.insert(job.clone());

            let child = &entry.link.job.key;
            if self.retired.contains(child) {
                debug!("Job {} was a one-shot and already ran, not chaining", child);
                continue;
            }
            if self.flags.get(child).is_some_and(|flags| flags.in_progress) {
                debug!("Job {} already scheduled by chaining, waiting for it", child);
                continue;
            }

            let ready = entry.link.execute_after.iter().all(|parent| {
                entry.arrived.contains(parent)
                    && self.flags.get(parent).is_some_and(|flags| flags.executed)
            });
            if !ready {
                continue;
            }

            entry.arrived.clear();
            eligible.push(entry.link.clone());
        }

        let mut scheduled = Vec::with_capacity(eligible.len());
        for link in eligible {
            let child = link.job.key.clone();
            let fire_at = completed_at + Duration::minutes(i64::from(link.offset_minutes));
            let trigger = Trigger::fire_once_at(child.clone(), fire_at);
            let outcome = self.store.reschedule_job(link.job, trigger, completed_at).await;
            if outcome == RescheduleOutcome::Retired {
                debug!("Job {} was retired by the store, not chaining", child);
                self.retired.insert(child);
                continue;
            }

            self.flags.entry(child.clone()).or_default().in_progress = true;
            info!(
                "Job {} completed, chained job {} scheduled for {}",
                job,
                child,
                fire_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            scheduled.push(ChainedSchedule {
                job: child,
                fire_at,
                outcome,
            });
        }
        scheduled
    }

    fn snapshot(&self) -> ExecutionSnapshot {
        let mut jobs: Vec<JobExecutionState> = self
            .flags
            .iter()
            .map(|(key, flags)| JobExecutionState {
                job: key.clone(),
                executed: flags.executed,
                in_progress: flags.in_progress,
                phase: flags.phase,
                last_completed_at: flags.last_completed_at,
            })
            .collect();
        jobs.sort_by(|a, b| a.job.cmp(&b.job));

        let links = self
            .links
            .iter()
            .map(|entry| ChainLinkState {
                job: entry.link.job.key.clone(),
                offset_minutes: entry.link.offset_minutes,
                execute_after: entry.link.execute_after.clone(),
                arrived: entry.arrived.iter().cloned().collect(),
            })
            .collect();

        let mut retired: Vec<JobKey> = self.retired.iter().cloned().collect();
        retired.sort();

        ExecutionSnapshot {
            jobs,
            links,
            retired,
        }
    }
}
