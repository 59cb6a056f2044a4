use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use onair_runner::{notifications, notify_best_effort, Notifier};
use tokio::sync::Mutex;
use tracing::error;

/// Turns job failures into operator alerts, at most one per cooldown.
pub struct FailureSentinel {
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    last_alert: Mutex<Option<DateTime<Utc>>>,
}

impl FailureSentinel {
    pub fn new(notifier: Arc<dyn Notifier>, cooldown: Duration) -> Self {
        Self {
            notifier,
            cooldown,
            last_alert: Mutex::new(None),
        }
    }

    /// Logs the failure and alerts unless an alert went out within the
    /// cooldown. Returns true when an alert was sent.
    pub async fn report(&self, job: &str, failure: &str, now: DateTime<Utc>) -> bool {
        error!(job, error = failure, "scheduled job failed");
        {
            let mut last_alert = self.last_alert.lock().await;
            if last_alert.is_some_and(|last| now.signed_duration_since(last) < self.cooldown) {
                return false;
            }
            *last_alert = Some(now);
        }
        let notification = notifications::job_failure(job, failure);
        notify_best_effort(self.notifier.as_ref(), &notification).await;
        true
    }

    pub async fn last_alert(&self) -> Option<DateTime<Utc>> {
        *self.last_alert.lock().await
    }
}
