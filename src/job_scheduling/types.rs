//! Job scheduling type definitions

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{JobExecutionFailure, SchedulingError, SchedulingResult};

/// Group used when a builder does not name one
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Opaque key-value data handed to a job body
pub type JobDataMap = BTreeMap<String, String>;

/// Unique identity of a schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Time-based firing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Fire at the start time, then every `interval_minutes` if `repeat_forever`
    Interval {
        interval_minutes: u32,
        repeat_forever: bool,
    },
    /// Fire exactly once, used for offset-delayed chained execution
    FireOnceAt { fire_at: DateTime<Utc> },
    /// Fire on every match of a cron expression
    Cron { expression: String },
}

impl TriggerPolicy {
    pub fn every_minutes(interval_minutes: u32) -> Self {
        Self::Interval {
            interval_minutes,
            repeat_forever: true,
        }
    }

    fn parse_cron(expression: &str) -> Result<Schedule, String> {
        Schedule::from_str(expression)
            .map_err(|e| format!("Invalid cron expression '{expression}': {e}"))
    }
}

/// A live trigger in the schedule
///
/// The store holds at most one trigger per [`JobKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub job_key: JobKey,
    pub policy: TriggerPolicy,
    pub next_fire_time: DateTime<Utc>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub times_fired: u32,
}

impl Trigger {
    /// Build a trigger whose first fire is derived from `policy` and `start_at`
    pub fn new(
        name: impl Into<String>,
        job_key: JobKey,
        policy: TriggerPolicy,
        start_at: DateTime<Utc>,
    ) -> SchedulingResult<Self> {
        let next_fire_time = match &policy {
            TriggerPolicy::Interval {
                interval_minutes, ..
            } => {
                if *interval_minutes == 0 {
                    return Err(SchedulingError::InvalidTrigger {
                        job: job_key,
                        reason: "interval must be at least one minute".to_string(),
                    });
                }
                start_at
            }
            TriggerPolicy::FireOnceAt { fire_at } => *fire_at,
            TriggerPolicy::Cron { expression } => {
                let schedule = TriggerPolicy::parse_cron(expression).map_err(|reason| {
                    SchedulingError::InvalidTrigger {
                        job: job_key.clone(),
                        reason,
                    }
                })?;
                schedule.after(&start_at).next().ok_or_else(|| {
                    SchedulingError::InvalidTrigger {
                        job: job_key.clone(),
                        reason: format!("cron expression '{expression}' has no upcoming fire time"),
                    }
                })?
            }
        };

        Ok(Self {
            name: name.into(),
            job_key,
            policy,
            next_fire_time,
            previous_fire_time: None,
            times_fired: 0,
        })
    }

    /// Single-fire trigger used when a chained job is rescheduled
    pub fn fire_once_at(job_key: JobKey, fire_at: DateTime<Utc>) -> Self {
        Self {
            name: format!("chain:{}", job_key.name),
            job_key,
            policy: TriggerPolicy::FireOnceAt { fire_at },
            next_fire_time: fire_at,
            previous_fire_time: None,
            times_fired: 0,
        }
    }

    /// Check if this trigger should fire at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_time <= now
    }

    /// Record a fire and move to the next fire time.
    ///
    /// Returns false once the trigger has no further fire times and should be
    /// removed. Repeating intervals that fell behind skip the missed slots
    /// rather than firing once per slot.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) -> bool {
        let fired_at = self.next_fire_time;
        self.previous_fire_time = Some(fired_at);
        self.times_fired += 1;

        let next = match &self.policy {
            TriggerPolicy::Interval {
                interval_minutes,
                repeat_forever: true,
            } => {
                let step = Duration::minutes(i64::from(*interval_minutes));
                let mut next = fired_at + step;
                if next <= now {
                    let behind = (now - next).num_seconds() / step.num_seconds() + 1;
                    next += step * behind as i32;
                }
                Some(next)
            }
            TriggerPolicy::Interval {
                repeat_forever: false,
                ..
            }
            | TriggerPolicy::FireOnceAt { .. } => None,
            TriggerPolicy::Cron { expression } => TriggerPolicy::parse_cron(expression)
                .ok()
                .and_then(|schedule| schedule.after(&now.max(fired_at)).next()),
        };

        match next {
            Some(next) => {
                self.next_fire_time = next;
                true
            }
            None => false,
        }
    }
}

/// Immutable description of a registered job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub key: JobKey,
    /// Registry tag used to instantiate the job body
    pub job_type: String,
    pub trigger_policy: Option<TriggerPolicy>,
    pub one_shot: bool,
    pub parent_keys: BTreeSet<JobKey>,
    pub payload: JobDataMap,
}

impl JobDescriptor {
    pub fn is_chained(&self) -> bool {
        !self.parent_keys.is_empty()
    }
}

/// "Schedule `job`, `offset_minutes` after every key in `execute_after` completed"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub job: JobDescriptor,
    pub offset_minutes: u32,
    pub execute_after: BTreeSet<JobKey>,
}

impl ChainLink {
    pub fn new(job: JobDescriptor, offset_minutes: u32, execute_after: BTreeSet<JobKey>) -> Self {
        Self {
            job,
            offset_minutes,
            execute_after,
        }
    }

    pub fn depends_on(&self, key: &JobKey) -> bool {
        self.execute_after.contains(key)
    }
}

/// Result of trying to place a trigger in the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled,
    /// The key already had a live trigger; nothing was changed
    AlreadyScheduled,
    /// The key belongs to a one-shot job that already ran
    Retired,
}

/// Result of rescheduling a chained job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    /// Stale state was cleared and the job scheduled fresh
    Rescheduled,
    /// A future-dated trigger was already pending and was kept
    PendingTriggerKept,
    /// The key belongs to a one-shot job that already ran
    Retired,
}

/// Whether a failed completion still satisfies dependent jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionGating {
    /// Only successful completions mark a job executed
    #[default]
    SuccessOnly,
    /// Every completion marks a job executed, regardless of outcome
    Unconditional,
}

impl CompletionGating {
    pub fn counts(&self, result: &JobResult) -> bool {
        match self {
            Self::SuccessOnly => result.is_ok(),
            Self::Unconditional => true,
        }
    }
}

/// A trigger that has been claimed for execution
#[derive(Debug, Clone)]
pub struct FiredTrigger {
    pub job: JobDescriptor,
    pub trigger_name: String,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

/// Everything the execution engine and listeners know about one firing
#[derive(Debug, Clone)]
pub struct JobExecutionContext {
    pub fire_instance_id: Uuid,
    pub job: JobDescriptor,
    pub trigger_name: String,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

impl From<FiredTrigger> for JobExecutionContext {
    fn from(fired: FiredTrigger) -> Self {
        Self {
            fire_instance_id: Uuid::new_v4(),
            job: fired.job,
            trigger_name: fired.trigger_name,
            scheduled_fire_time: fired.scheduled_fire_time,
            fired_at: fired.fired_at,
        }
    }
}

impl JobExecutionContext {
    pub fn job_key(&self) -> &JobKey {
        &self.job.key
    }
}

pub type JobResult = Result<(), JobExecutionFailure>;

/// Completion event payload
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub completed_at: DateTime<Utc>,
    pub duration: std::time::Duration,
    pub result: JobResult,
}

impl JobCompletion {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> JobKey {
        JobKey::new("ingest_languages", "ingestion")
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_job_key_display() {
        assert_eq!(key().to_string(), "ingestion.ingest_languages");
    }

    #[test]
    fn test_interval_trigger_fires_at_start_then_every_interval() {
        let mut trigger =
            Trigger::new("t", key(), TriggerPolicy::every_minutes(60), at(10, 0)).unwrap();
        assert_eq!(trigger.next_fire_time, at(10, 0));
        assert!(trigger.is_due(at(10, 0)));
        assert!(!trigger.is_due(at(9, 59)));

        assert!(trigger.advance(at(10, 0)));
        assert_eq!(trigger.next_fire_time, at(11, 0));
        assert_eq!(trigger.previous_fire_time, Some(at(10, 0)));
        assert_eq!(trigger.times_fired, 1);
    }

    #[test]
    fn test_interval_trigger_skips_missed_slots() {
        let mut trigger =
            Trigger::new("t", key(), TriggerPolicy::every_minutes(15), at(10, 0)).unwrap();

        // Fired late, at 10:50: slots 10:15, 10:30, 10:45 are skipped
        assert!(trigger.advance(at(10, 50)));
        assert_eq!(trigger.next_fire_time, at(11, 0));
    }

    #[test]
    fn test_non_repeating_interval_fires_once() {
        let policy = TriggerPolicy::Interval {
            interval_minutes: 5,
            repeat_forever: false,
        };
        let mut trigger = Trigger::new("t", key(), policy, at(10, 0)).unwrap();
        assert!(!trigger.advance(at(10, 0)));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = Trigger::new("t", key(), TriggerPolicy::every_minutes(0), at(10, 0));
        assert!(matches!(result, Err(SchedulingError::InvalidTrigger { .. })));
    }

    #[test]
    fn test_fire_once_trigger() {
        let mut trigger = Trigger::fire_once_at(key(), at(10, 2));
        assert_eq!(trigger.next_fire_time, at(10, 2));
        assert!(!trigger.advance(at(10, 2)));
    }

    #[test]
    fn test_cron_trigger() {
        let policy = TriggerPolicy::Cron {
            expression: "0 0 */6 * * *".to_string(),
        };
        let mut trigger = Trigger::new("t", key(), policy, at(10, 0)).unwrap();
        assert_eq!(trigger.next_fire_time, at(12, 0));

        assert!(trigger.advance(at(12, 0)));
        assert_eq!(trigger.next_fire_time, at(18, 0));
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        let policy = TriggerPolicy::Cron {
            expression: "invalid".to_string(),
        };
        let err = Trigger::new("t", key(), policy, at(10, 0)).unwrap_err();
        assert!(err.to_string().contains("Invalid cron expression"));
    }

    #[test]
    fn test_completion_gating() {
        let failed: JobResult = Err(JobExecutionFailure::Cancelled { job: key() });
        assert!(CompletionGating::SuccessOnly.counts(&Ok(())));
        assert!(!CompletionGating::SuccessOnly.counts(&failed));
        assert!(CompletionGating::Unconditional.counts(&failed));
    }
}
