use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational snapshot written by the orchestrator and read by monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportedStatus {
    pub running_events_count: usize,
    pub scheduled_events_count: usize,
    pub upcoming_broadcasts_count: usize,
    pub last_validated_events: Option<DateTime<Utc>>,
    pub last_checked_for_imminent_events: Option<DateTime<Utc>>,
    pub last_ran_monitoring_task: Option<DateTime<Utc>>,
    pub last_ran_cleanup_task: Option<DateTime<Utc>>,
    pub app_started: Option<DateTime<Utc>>,
}
