//! Job scheduling subsystem
//!
//! Registers periodic and one-shot ingestion jobs, runs a job only once all
//! of its parents have completed, and keeps at most one live trigger per job.
//!
//! The system is built around these components:
//! - `JobBuilder`: declares a job's identity, schedule and parentage
//! - `JobStore`: trigger and descriptor storage with per-key deduplication
//! - `JobRunner`: timer loop dispatching due triggers onto a worker pool
//! - `JobExecutor`: runs job bodies and emits listener events
//! - `ChainingListener`: reschedules dependent jobs after their parents complete
//! - `SchedulerManager`: validates registrations and owns the lifecycle

pub mod api;
pub mod builder;
pub mod chaining_listener;
pub mod job_executor;
pub mod job_runner;
pub mod job_store;
pub mod listener;
pub mod registry;
pub mod scheduler_manager;
pub mod traits;
pub mod types;

pub use api::{SchedulerHandle, SchedulingHealthStatus};
pub use builder::{DependencyPolicy, JobBuilder};
pub use chaining_listener::{ChainedSchedule, ChainingListener, ExecutionSnapshot, JobPhase};
pub use job_executor::JobExecutor;
pub use job_runner::JobRunner;
pub use job_store::{JobStore, JobStoreStats, MemoryJobStore};
pub use listener::ListenerManager;
pub use registry::JobRegistry;
pub use scheduler_manager::{RegistrationOutcome, SchedulerManager};
pub use traits::{Job, JobListener};
pub use types::*;
