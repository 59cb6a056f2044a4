//! Store contracts for onair event automation plus in-memory and JSON-directory
//! backends.
//!
//! The runner and orchestrator only talk to the traits declared here: the
//! event store holding per-event step lists, the schedule source listing
//! upcoming rows, the status reporter used by the watchdog, and the broadcast
//! platform that owns the public live streams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod json_dir;
mod memory;

pub use json_dir::{JsonEventStore, JsonScheduleSource, JsonStatusReporter};
pub use memory::{
    InMemoryBroadcastPlatform, InMemoryEventStore, InMemoryScheduleSource,
    InMemoryStatusReporter,
};
pub use onair_types::{
    Broadcast, BroadcastRequest, BroadcastStatus, BroadcastTransition, BroadcastUpdate, EndState,
    EventFilter, EventMetadata, Lifecycle, NewEvent, PrivacyStatus, ReportedStatus, RunningEvent,
    ScheduleEvent, Step, StepTransitionError, StreamStatus,
};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store and platform implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event '{0}' not found")]
    EventNotFound(String),
    #[error("event '{0}' already exists")]
    EventAlreadyExists(String),
    #[error("template '{0}' not found")]
    TemplateNotFound(String),
    #[error("schedule '{0}' not found")]
    ScheduleNotFound(String),
    #[error("row {row} not found in schedule '{schedule}'")]
    RowNotFound { schedule: String, row: u32 },
    #[error("broadcast '{0}' not found")]
    BroadcastNotFound(String),
    #[error("stream '{0}' not found")]
    StreamNotFound(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to persist '{path}': {message}")]
    Persist { path: String, message: String },
    #[error(transparent)]
    Transition(#[from] StepTransitionError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persistent per-event step lists.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, event_id: &str) -> StoreResult<RunningEvent>;
    async fn set_step_start_time(
        &self,
        event_id: &str,
        step_id: u32,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn step_complete(
        &self,
        event_id: &str,
        step_id: u32,
        ended_at: DateTime<Utc>,
        end_state: EndState,
        message: &str,
    ) -> StoreResult<()>;
    async fn set_scheduled_start_time(
        &self,
        event_id: &str,
        scheduled_start_time: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn create_event(&self, event: NewEvent) -> StoreResult<()>;
    async fn delete_event(&self, event_id: &str) -> StoreResult<()>;
    async fn get_metadata(&self, event_id: &str) -> StoreResult<EventMetadata>;
    async fn get_events(&self) -> StoreResult<Vec<String>>;
}

/// Read-mostly view over the planning schedules.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn list_schedules(&self) -> StoreResult<Vec<String>>;
    async fn list_events(
        &self,
        schedule: &str,
        filter: EventFilter,
    ) -> StoreResult<Vec<ScheduleEvent>>;
    async fn set_event_id(&self, schedule: &str, row_number: u32, event_id: &str)
        -> StoreResult<()>;
}

/// Operational status sink read back by the watchdog.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report_running_events_count(&self, count: usize) -> StoreResult<()>;
    async fn report_scheduled_events_count(&self, count: usize) -> StoreResult<()>;
    async fn report_upcoming_broadcasts_count(&self, count: usize) -> StoreResult<()>;
    async fn report_validated_events(&self, at: DateTime<Utc>) -> StoreResult<()>;
    async fn report_checked_for_imminent_events(&self, at: DateTime<Utc>) -> StoreResult<()>;
    async fn report_ran_monitoring_task(&self, at: DateTime<Utc>) -> StoreResult<()>;
    async fn report_ran_cleanup_task(&self, at: DateTime<Utc>) -> StoreResult<()>;
    async fn report_app_started(&self, at: DateTime<Utc>) -> StoreResult<()>;
    async fn get(&self) -> StoreResult<ReportedStatus>;
}

/// Live-streaming platform that owns public broadcasts.
#[async_trait]
pub trait BroadcastPlatform: Send + Sync {
    async fn create_broadcast(&self, request: BroadcastRequest) -> StoreResult<Broadcast>;
    async fn get_broadcast(&self, broadcast_id: &str) -> StoreResult<Broadcast>;
    async fn update_broadcast(
        &self,
        broadcast_id: &str,
        update: BroadcastUpdate,
    ) -> StoreResult<Broadcast>;
    async fn transition_broadcast(
        &self,
        broadcast_id: &str,
        transition: BroadcastTransition,
    ) -> StoreResult<Broadcast>;
    async fn stream_status(&self, stream_id: &str) -> StoreResult<StreamStatus>;
    async fn count_upcoming_broadcasts(&self) -> StoreResult<usize>;

    async fn end_broadcast(&self, broadcast_id: &str) -> StoreResult<Broadcast> {
        self.transition_broadcast(broadcast_id, BroadcastTransition::Complete)
            .await
    }
}

/// Event record persisted by store backends.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub name: String,
    #[serde(flatten)]
    pub event: RunningEvent,
}

impl EventRecord {
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            name: self.name.clone(),
            scheduled_start_time: self.event.scheduled_start_time,
            stream_id: self.event.stream_id.clone(),
        }
    }
}

/// Builds a fresh event record from a template's steps.
/// Placeholder in template step parameters replaced by the event id.
pub const EVENT_ID_PLACEHOLDER: &str = "{event_id}";
/// Placeholder in template step parameters replaced by the stream id.
pub const STREAM_ID_PLACEHOLDER: &str = "{stream_id}";

pub(crate) fn record_from_template(event: NewEvent, template_steps: &[Step]) -> EventRecord {
    let steps = template_steps
        .iter()
        .map(|step| Step {
            parameter: step
                .parameter
                .replace(EVENT_ID_PLACEHOLDER, &event.event_id)
                .replace(STREAM_ID_PLACEHOLDER, &event.stream_id),
            start_time: None,
            end_time: None,
            end_state: EndState::Unset,
            message: String::new(),
            ..step.clone()
        })
        .collect();
    EventRecord {
        name: event.name,
        event: RunningEvent {
            event_id: event.event_id,
            stream_id: event.stream_id,
            scheduled_start_time: event.scheduled_start_time,
            steps,
        },
    }
}
