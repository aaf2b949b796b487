//! Centralized error handling for the IPTV ingestion service
//!
//! # Error Categories
//!
//! - **Scheduling Errors**: job registration and schedule mutation failures.
//!   These surface at startup and abort the process.
//! - **Job Execution Failures**: a job body failed, panicked or timed out.
//!   These are captured by the execution engine and reported to listeners,
//!   they never reach the dispatch loop.
//! - **Source Errors**: metadata API connectivity and parsing
//! - **Grabber Errors**: external EPG grabber process failures
//!
//! A schedule conflict (scheduling a key that already has a live trigger) is
//! not an error; see [`crate::job_scheduling::ScheduleOutcome`].
//!
//! # Usage
//!
//! ```rust
//! use iptv_ingest::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for scheduling Results
pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
