use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iptv_ingest::config::SchedulerConfig;
use iptv_ingest::job_scheduling::{
    Job, JobBuilder, JobDataMap, JobKey, JobRegistry, JobStore, MemoryJobStore, SchedulerHandle,
    RegistrationOutcome, SchedulerManager, TriggerPolicy,
};

/// Appends the job name from its payload to a shared log
struct Recorder {
    runs: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Job for Recorder {
    async fn execute(&self, job_data: &JobDataMap, _: SchedulerHandle) -> anyhow::Result<()> {
        let name = job_data.get("name").cloned().unwrap_or_default();
        self.runs.lock().unwrap().push(name);
        Ok(())
    }
}

struct TestBuilder {
    name: &'static str,
    policy: Option<TriggerPolicy>,
    parents: Vec<&'static str>,
    one_shot: bool,
}

impl TestBuilder {
    fn root(name: &'static str, policy: TriggerPolicy) -> Self {
        Self {
            name,
            policy: Some(policy),
            parents: Vec::new(),
            one_shot: false,
        }
    }

    fn after(name: &'static str, parents: Vec<&'static str>) -> Self {
        Self {
            name,
            policy: None,
            parents,
            one_shot: false,
        }
    }
}

impl JobBuilder for TestBuilder {
    fn job_type(&self) -> &str {
        "recorder"
    }

    fn default_job_id(&self) -> String {
        self.name.to_string()
    }

    fn job_group(&self) -> &str {
        "lifecycle"
    }

    fn trigger_policy(&self) -> Option<TriggerPolicy> {
        self.policy.clone()
    }

    fn interval_in_minutes(&self) -> u32 {
        0
    }

    fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    fn job_data(&self) -> JobDataMap {
        JobDataMap::from([("name".to_string(), self.name.to_string())])
    }

    fn parent_job_keys(&self) -> Option<BTreeSet<JobKey>> {
        Some(self.parents.iter().map(|p| key(p)).collect())
    }
}

fn key(name: &str) -> JobKey {
    JobKey::new(name, "lifecycle")
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(10),
        job_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(5),
        ..SchedulerConfig::default()
    }
}

fn manager(store: Arc<dyn JobStore>, runs: Arc<Mutex<Vec<String>>>) -> SchedulerManager {
    let mut registry = JobRegistry::new();
    registry.register_instance("recorder", Arc::new(Recorder { runs }));
    SchedulerManager::new(fast_config(), store, registry).unwrap()
}

fn builders(list: Vec<TestBuilder>) -> Vec<Arc<dyn JobBuilder>> {
    list.into_iter()
        .map(|b| Arc::new(b) as Arc<dyn JobBuilder>)
        .collect()
}

async fn wait_for(runs: &Arc<Mutex<Vec<String>>>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while runs.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("jobs did not run in time");
}

fn yearly() -> TriggerPolicy {
    TriggerPolicy::Cron {
        expression: "0 0 0 1 1 *".to_string(),
    }
}

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let runs = Arc::new(Mutex::new(Vec::new()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let manager = manager(store.clone(), runs.clone());

    manager
        .schedule_jobs_and_start(builders(vec![
            TestBuilder::after("channels", vec!["countries", "languages"]),
            TestBuilder::after("countries", vec!["languages"]),
            TestBuilder::root("languages", TriggerPolicy::every_minutes(60)),
        ]))
        .await
        .unwrap();

    wait_for(&runs, 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown().await;

    assert_eq!(
        *runs.lock().unwrap(),
        vec!["languages", "countries", "channels"]
    );
    assert_eq!(store.trigger_keys().await, vec![key("languages")]);
}

#[tokio::test]
async fn test_one_shot_job_leaves_schedule_after_its_run() {
    let runs = Arc::new(Mutex::new(Vec::new()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let manager = manager(store.clone(), runs.clone());

    let mut backfill = TestBuilder::root("backfill", TriggerPolicy::every_minutes(60));
    backfill.one_shot = true;
    manager
        .schedule_jobs_and_start(builders(vec![backfill]))
        .await
        .unwrap();

    wait_for(&runs, 1).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.check_job_exists(&key("backfill")).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("one-shot job was not removed");
    manager.shutdown().await;

    assert!(!store.check_trigger_exists(&key("backfill")).await);
    assert!(manager.handle().job_keys().await.is_empty());
}

#[tokio::test]
async fn test_one_shot_job_does_not_run_again_after_redeploy() {
    let runs = Arc::new(Mutex::new(Vec::new()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let backfill = || {
        let mut backfill = TestBuilder::root("backfill", TriggerPolicy::every_minutes(60));
        backfill.one_shot = true;
        backfill
    };

    let first = manager(store.clone(), runs.clone());
    first
        .schedule_jobs_and_start(builders(vec![backfill()]))
        .await
        .unwrap();
    wait_for(&runs, 1).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !store.is_retired(&key("backfill")).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("one-shot job was not retired");
    first.shutdown().await;

    let second = manager(store.clone(), runs.clone());
    second
        .schedule_jobs_and_start(builders(vec![backfill()]))
        .await
        .unwrap();
    assert_eq!(
        second.register(&backfill()).await.unwrap(),
        RegistrationOutcome::Retired
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    second.shutdown().await;

    assert_eq!(*runs.lock().unwrap(), vec!["backfill"]);
    assert!(store.job_keys().await.is_empty());
    assert!(store.trigger_keys().await.is_empty());
}

#[tokio::test]
async fn test_restart_with_shared_store_keeps_single_trigger() {
    let runs = Arc::new(Mutex::new(Vec::new()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let jobs = || {
        builders(vec![
            TestBuilder::root("languages", yearly()),
            TestBuilder::after("countries", vec!["languages"]),
        ])
    };

    let first = manager(store.clone(), runs.clone());
    first.schedule_jobs_and_start(jobs()).await.unwrap();
    first.schedule_jobs_and_start(jobs()).await.unwrap();
    let scheduled_at = first.handle().next_fire_time(&key("languages")).await;
    first.shutdown().await;

    let second = manager(store.clone(), runs.clone());
    second.schedule_jobs_and_start(jobs()).await.unwrap();

    assert_eq!(store.trigger_keys().await, vec![key("languages")]);
    assert_eq!(
        second.handle().next_fire_time(&key("languages")).await,
        scheduled_at
    );
    assert_eq!(
        store.job_keys().await,
        vec![key("countries"), key("languages")]
    );
    second.shutdown().await;
}

#[tokio::test]
async fn test_trigger_now_runs_an_unscheduled_job() {
    let runs = Arc::new(Mutex::new(Vec::new()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let manager = manager(store.clone(), runs.clone());

    manager
        .schedule_jobs_and_start(builders(vec![
            TestBuilder::root("languages", yearly()),
            TestBuilder::after("countries", vec!["languages"]),
        ]))
        .await
        .unwrap();

    manager.handle().trigger_now(&key("countries")).await.unwrap();
    wait_for(&runs, 1).await;
    manager.shutdown().await;

    assert_eq!(*runs.lock().unwrap(), vec!["countries"]);
}
