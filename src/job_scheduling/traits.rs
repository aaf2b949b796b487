//! Seams between the scheduler and the code it drives

use async_trait::async_trait;

use super::api::SchedulerHandle;
use super::types::{JobCompletion, JobDataMap, JobExecutionContext};

/// A job body
///
/// Bodies perform network or process I/O. The execution engine runs them on
/// their own task, so they may take as long as the configured job timeout.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, job_data: &JobDataMap, scheduler: SchedulerHandle)
    -> anyhow::Result<()>;
}

/// Observer of job execution events
///
/// `job_to_be_executed` is delivered before the body starts and
/// `job_was_executed` after it finished (successfully or not). Both are
/// awaited, so a listener that returns has fully processed the event.
#[async_trait]
pub trait JobListener: Send + Sync {
    fn name(&self) -> &str;

    async fn job_to_be_executed(&self, context: &JobExecutionContext);

    async fn job_was_executed(&self, context: &JobExecutionContext, completion: &JobCompletion);
}
