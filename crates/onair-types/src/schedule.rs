use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyStatus {
    Public,
    #[default]
    Unlisted,
    Private,
}

/// Where a schedule row sits relative to its broadcast provisioning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    CreationOverdue,
    Okay,
    Missed,
    Past,
}

/// One row from a schedule source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub row_number: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub scheduled_start_time: DateTime<Utc>,
    #[serde(default)]
    pub automated: bool,
    #[serde(default)]
    pub privacy: PrivacyStatus,
    #[serde(rename = "max_length_ms", with = "crate::duration_ms")]
    pub max_length: Duration,
    #[serde(default)]
    pub template: String,
    pub stream_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub scheduled_creation_time: DateTime<Utc>,
    pub first_event_time: DateTime<Utc>,
    pub latest_end_time: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl ScheduleEvent {
    /// Returns the provisioned event id, ignoring blank cells.
    pub fn provisioned_event_id(&self) -> Option<&str> {
        self.event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Row selection applied by [`ScheduleEvent`] listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    CreationOverdue,
    Okay,
    /// Automated rows whose first event time lies strictly within `window`
    /// of `now`, in either direction.
    ImminentAutomated {
        now: DateTime<Utc>,
        window: Duration,
    },
}

impl EventFilter {
    pub fn matches(&self, event: &ScheduleEvent) -> bool {
        match self {
            Self::CreationOverdue => event.lifecycle == Lifecycle::CreationOverdue,
            Self::Okay => event.lifecycle == Lifecycle::Okay,
            Self::ImminentAutomated { now, window } => {
                event.automated
                    && event.first_event_time.signed_duration_since(*now).abs() < *window
            }
        }
    }
}

/// Summary returned by event-store metadata lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub name: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub stream_id: String,
}

/// Input for creating an event record from a provisioned schedule row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: String,
    pub name: String,
    pub stream_id: String,
    pub scheduled_start_time: DateTime<Utc>,
    pub template: String,
}
