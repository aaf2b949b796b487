//! Job type registry
//!
//! Maps a job-type tag to a factory that produces the job body. Populated at
//! startup; the execution engine looks bodies up by tag at fire time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::traits::Job;

pub type JobFactory = Arc<dyn Fn() -> Arc<dyn Job> + Send + Sync>;

#[derive(Default, Clone)]
pub struct JobRegistry {
    factories: HashMap<String, JobFactory>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `job_type`
    pub fn register<F>(&mut self, job_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Job> + Send + Sync + 'static,
    {
        self.factories.insert(job_type.into(), Arc::new(factory));
        self
    }

    /// Register a single shared instance for `job_type`
    pub fn register_instance(
        &mut self,
        job_type: impl Into<String>,
        job: Arc<dyn Job>,
    ) -> &mut Self {
        self.register(job_type, move || job.clone())
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    pub fn instantiate(&self, job_type: &str) -> Option<Arc<dyn Job>> {
        self.factories.get(job_type).map(|factory| factory())
    }

    pub fn job_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::api::SchedulerHandle;
    use crate::job_scheduling::types::JobDataMap;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn execute(&self, _: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup_by_tag() {
        let mut registry = JobRegistry::new();
        registry
            .register("ingest_languages", || Arc::new(Noop) as Arc<dyn Job>)
            .register_instance("grab_epg", Arc::new(Noop));

        assert!(registry.contains("ingest_languages"));
        assert!(registry.instantiate("grab_epg").is_some());
        assert!(registry.instantiate("ingest_planets").is_none());
        assert_eq!(registry.job_types(), vec!["grab_epg", "ingest_languages"]);
    }
}
