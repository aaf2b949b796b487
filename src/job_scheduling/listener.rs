//! Job listener fan-out

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::JobListener;
use super::types::{JobCompletion, JobExecutionContext};

/// Ordered set of job listeners notified around every execution
#[derive(Default)]
pub struct ListenerManager {
    listeners: RwLock<Vec<Arc<dyn JobListener>>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener. A listener with the same name is replaced.
    pub async fn add_job_listener(&self, listener: Arc<dyn JobListener>) {
        let mut listeners = self.listeners.write().await;
        if let Some(existing) = listeners.iter_mut().find(|l| l.name() == listener.name()) {
            debug!("Replacing job listener '{}'", listener.name());
            *existing = listener;
        } else {
            debug!("Added job listener '{}'", listener.name());
            listeners.push(listener);
        }
    }

    pub async fn listener_names(&self) -> Vec<String> {
        self.listeners
            .read()
            .await
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    pub async fn notify_to_be_executed(&self, context: &JobExecutionContext) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.job_to_be_executed(context).await;
        }
    }

    pub async fn notify_was_executed(
        &self,
        context: &JobExecutionContext,
        completion: &JobCompletion,
    ) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.job_was_executed(context, completion).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        name: String,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl JobListener for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn job_to_be_executed(&self, _: &JobExecutionContext) {
            self.events.lock().unwrap().push(format!("{}:before", self.name));
        }

        async fn job_was_executed(&self, _: &JobExecutionContext, _: &JobCompletion) {
            self.events.lock().unwrap().push(format!("{}:after", self.name));
        }
    }

    #[tokio::test]
    async fn test_listeners_replaced_by_name() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let manager = ListenerManager::new();
        for name in ["chaining", "audit", "chaining"] {
            manager
                .add_job_listener(Arc::new(Recording {
                    name: name.to_string(),
                    events: events.clone(),
                }))
                .await;
        }
        assert_eq!(manager.listener_names().await, vec!["chaining", "audit"]);
    }
}
