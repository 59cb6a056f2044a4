use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use onair_runner::EventRunner;
use tokio::sync::RwLock;

/// Live runners keyed by event id.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: Arc<RwLock<BTreeMap<String, Arc<EventRunner>>>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `runner` unless its event id is already tracked. Returns true
    /// when inserted.
    pub async fn insert_if_absent(&self, runner: Arc<EventRunner>) -> bool {
        let mut runners = self.runners.write().await;
        if runners.contains_key(runner.event_id()) {
            return false;
        }
        runners.insert(runner.event_id().to_string(), runner);
        true
    }

    pub async fn contains(&self, event_id: &str) -> bool {
        self.runners.read().await.contains_key(event_id)
    }

    pub async fn get(&self, event_id: &str) -> Option<Arc<EventRunner>> {
        self.runners.read().await.get(event_id).cloned()
    }

    /// Drops runners that are no longer running and whose first event time is
    /// more than `grace` before `now`. Returns the removed event ids.
    pub async fn remove_concluded(&self, now: DateTime<Utc>, grace: Duration) -> Vec<String> {
        let mut runners = self.runners.write().await;
        let concluded: Vec<String> = runners
            .iter()
            .filter(|(_, runner)| {
                !runner.is_running() && now.signed_duration_since(runner.first_event_time()) > grace
            })
            .map(|(event_id, _)| event_id.clone())
            .collect();
        for event_id in &concluded {
            runners.remove(event_id);
        }
        concluded
    }

    pub async fn snapshot(&self) -> Vec<Arc<EventRunner>> {
        self.runners.read().await.values().cloned().collect()
    }

    pub async fn running_count(&self) -> usize {
        self.runners
            .read()
            .await
            .values()
            .filter(|runner| runner.is_running())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.runners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runners.read().await.is_empty()
    }
}
