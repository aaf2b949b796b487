//! Error type definitions for the IPTV ingestion service
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that keeps scheduling failures,
//! job failures and collaborator failures apart.

use std::time::Duration;

use thiserror::Error;

use crate::job_scheduling::types::JobKey;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Scheduling subsystem errors
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Metadata source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// External grabber process errors
    #[error("Grabber error: {0}")]
    Grabber(#[from] GrabberError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while registering jobs or driving the schedule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// A chained job names a parent that no registration provides. Such a
    /// child could never become eligible, so it is refused up front.
    #[error("Job '{job}' depends on unknown parent job '{parent}'")]
    UnknownParent { job: JobKey, parent: JobKey },

    /// Following parent links from this job leads back to it
    #[error("Job '{job}' depends on itself through its parent chain")]
    DependencyCycle { job: JobKey },

    /// The descriptor's job type has no factory in the registry
    #[error("Job '{job}' uses unregistered job type '{job_type}'")]
    UnknownJobType { job: JobKey, job_type: String },

    /// Trigger could not be built from its policy
    #[error("Invalid trigger for job '{job}': {reason}")]
    InvalidTrigger { job: JobKey, reason: String },

    /// Job is not present in the store
    #[error("Job '{job}' is not registered")]
    JobNotFound { job: JobKey },

    /// The chaining listener task has stopped
    #[error("Chaining listener is not running")]
    ListenerUnavailable,

    /// The timer loop could not be started
    #[error("Failed to start scheduler: {message}")]
    StartupFailed { message: String },
}

/// Outcome of a job body that did not complete successfully
///
/// These never escape the execution engine; they are logged and handed to the
/// job listeners as part of the completion event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobExecutionFailure {
    /// The job body returned an error
    #[error("Job '{job}' failed: {message}")]
    Failed { job: JobKey, message: String },

    /// The job body exceeded its time budget
    #[error("Job '{job}' timed out after {}", humantime::format_duration(*.timeout))]
    TimedOut { job: JobKey, timeout: Duration },

    /// The job body panicked
    #[error("Job '{job}' panicked: {message}")]
    Panicked { job: JobKey, message: String },

    /// The job body was cancelled before it finished
    #[error("Job '{job}' was cancelled")]
    Cancelled { job: JobKey },

    /// No factory is registered for the descriptor's job type
    #[error("Job '{job}' has no registered implementation for type '{job_type}'")]
    UnknownJobType { job: JobKey, job_type: String },
}

impl JobExecutionFailure {
    /// Key of the job that failed
    pub fn job_key(&self) -> &JobKey {
        match self {
            Self::Failed { job, .. }
            | Self::TimedOut { job, .. }
            | Self::Panicked { job, .. }
            | Self::Cancelled { job }
            | Self::UnknownJobType { job, .. } => job,
        }
    }
}

/// Metadata source specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP transport failures
    #[error("HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },

    /// Payload was not the expected JSON array
    #[error("Parse error: {kind} - {message}")]
    ParseError { kind: String, message: String },
}

/// External EPG grabber errors
#[derive(Error, Debug)]
pub enum GrabberError {
    /// The process could not be spawned or awaited
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its timeout and was killed
    #[error("'{command}' timed out after {}", humantime::format_duration(*.timeout))]
    Timeout { command: String, timeout: Duration },

    /// The process was terminated by a signal
    #[error("'{command}' terminated without an exit code")]
    Terminated { command: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl SchedulingError {
    /// Create a startup error
    pub fn startup<S: Into<String>>(message: S) -> Self {
        Self::StartupFailed {
            message: message.into(),
        }
    }
}
