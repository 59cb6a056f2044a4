use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    record_from_template, Broadcast, BroadcastPlatform, BroadcastRequest, BroadcastStatus,
    BroadcastTransition, BroadcastUpdate, EndState, EventFilter, EventMetadata, EventRecord,
    EventStore, NewEvent, ReportedStatus, RunningEvent, ScheduleEvent, ScheduleSource,
    StatusReporter, Step, StoreError, StoreResult, StreamStatus,
};

/// In-memory event store for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<EventStoreInner>,
}

#[derive(Debug, Default)]
struct EventStoreInner {
    events: BTreeMap<String, EventRecord>,
    templates: HashMap<String, Vec<Step>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an event record.
    pub async fn insert_event(&self, name: impl Into<String>, event: RunningEvent) {
        let mut inner = self.inner.write().await;
        inner.events.insert(
            event.event_id.clone(),
            EventRecord {
                name: name.into(),
                event,
            },
        );
    }

    pub async fn insert_template(&self, name: impl Into<String>, steps: Vec<Step>) {
        self.inner.write().await.templates.insert(name.into(), steps);
    }

    pub async fn contains_event(&self, event_id: &str) -> bool {
        self.inner.read().await.events.contains_key(event_id)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_event(&self, event_id: &str) -> StoreResult<RunningEvent> {
        self.inner
            .read()
            .await
            .events
            .get(event_id)
            .map(|record| record.event.clone())
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))
    }

    async fn set_step_start_time(
        &self,
        event_id: &str,
        step_id: u32,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
        record.event.record_step_start(step_id, started_at)?;
        Ok(())
    }

    async fn step_complete(
        &self,
        event_id: &str,
        step_id: u32,
        ended_at: DateTime<Utc>,
        end_state: EndState,
        message: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
        record
            .event
            .record_step_completion(step_id, ended_at, end_state, message)?;
        Ok(())
    }

    async fn set_scheduled_start_time(
        &self,
        event_id: &str,
        scheduled_start_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
        record.event.scheduled_start_time = scheduled_start_time;
        Ok(())
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.events.contains_key(&event.event_id) {
            return Err(StoreError::EventAlreadyExists(event.event_id));
        }
        let template = inner
            .templates
            .get(&event.template)
            .ok_or_else(|| StoreError::TemplateNotFound(event.template.clone()))?;
        let record = record_from_template(event, template);
        inner
            .events
            .insert(record.event.event_id.clone(), record);
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .events
            .remove(event_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))
    }

    async fn get_metadata(&self, event_id: &str) -> StoreResult<EventMetadata> {
        self.inner
            .read()
            .await
            .events
            .get(event_id)
            .map(EventRecord::metadata)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))
    }

    async fn get_events(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.read().await.events.keys().cloned().collect())
    }
}

/// In-memory schedule source keyed by schedule name.
#[derive(Debug, Default)]
pub struct InMemoryScheduleSource {
    schedules: RwLock<BTreeMap<String, Vec<ScheduleEvent>>>,
}

impl InMemoryScheduleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_schedule(&self, name: impl Into<String>, rows: Vec<ScheduleEvent>) {
        self.schedules.write().await.insert(name.into(), rows);
    }

    pub async fn rows(&self, schedule: &str) -> Vec<ScheduleEvent> {
        self.schedules
            .read()
            .await
            .get(schedule)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScheduleSource for InMemoryScheduleSource {
    async fn list_schedules(&self) -> StoreResult<Vec<String>> {
        Ok(self.schedules.read().await.keys().cloned().collect())
    }

    async fn list_events(
        &self,
        schedule: &str,
        filter: EventFilter,
    ) -> StoreResult<Vec<ScheduleEvent>> {
        let schedules = self.schedules.read().await;
        let rows = schedules
            .get(schedule)
            .ok_or_else(|| StoreError::ScheduleNotFound(schedule.to_string()))?;
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn set_event_id(
        &self,
        schedule: &str,
        row_number: u32,
        event_id: &str,
    ) -> StoreResult<()> {
        let mut schedules = self.schedules.write().await;
        let rows = schedules
            .get_mut(schedule)
            .ok_or_else(|| StoreError::ScheduleNotFound(schedule.to_string()))?;
        let row = rows
            .iter_mut()
            .find(|row| row.row_number == row_number)
            .ok_or_else(|| StoreError::RowNotFound {
                schedule: schedule.to_string(),
                row: row_number,
            })?;
        row.event_id = Some(event_id.to_string());
        Ok(())
    }
}

/// In-memory status snapshot.
#[derive(Debug, Default)]
pub struct InMemoryStatusReporter {
    status: RwLock<ReportedStatus>,
}

impl InMemoryStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: ReportedStatus) -> Self {
        Self {
            status: RwLock::new(status),
        }
    }
}

#[async_trait]
impl StatusReporter for InMemoryStatusReporter {
    async fn report_running_events_count(&self, count: usize) -> StoreResult<()> {
        self.status.write().await.running_events_count = count;
        Ok(())
    }

    async fn report_scheduled_events_count(&self, count: usize) -> StoreResult<()> {
        self.status.write().await.scheduled_events_count = count;
        Ok(())
    }

    async fn report_upcoming_broadcasts_count(&self, count: usize) -> StoreResult<()> {
        self.status.write().await.upcoming_broadcasts_count = count;
        Ok(())
    }

    async fn report_validated_events(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.status.write().await.last_validated_events = Some(at);
        Ok(())
    }

    async fn report_checked_for_imminent_events(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.status.write().await.last_checked_for_imminent_events = Some(at);
        Ok(())
    }

    async fn report_ran_monitoring_task(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.status.write().await.last_ran_monitoring_task = Some(at);
        Ok(())
    }

    async fn report_ran_cleanup_task(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.status.write().await.last_ran_cleanup_task = Some(at);
        Ok(())
    }

    async fn report_app_started(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.status.write().await.app_started = Some(at);
        Ok(())
    }

    async fn get(&self) -> StoreResult<ReportedStatus> {
        Ok(self.status.read().await.clone())
    }
}

/// In-memory broadcast platform. Records every transition request so callers
/// can assert on what was sent.
#[derive(Debug, Default)]
pub struct InMemoryBroadcastPlatform {
    inner: RwLock<PlatformInner>,
}

#[derive(Debug, Default)]
struct PlatformInner {
    next_id: u64,
    broadcasts: BTreeMap<String, Broadcast>,
    streams: HashMap<String, StreamStatus>,
    transitions: Vec<(String, BroadcastTransition)>,
    rejected_titles: HashSet<String>,
}

impl InMemoryBroadcastPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_broadcast(&self, broadcast: Broadcast) {
        self.inner
            .write()
            .await
            .broadcasts
            .insert(broadcast.broadcast_id.clone(), broadcast);
    }

    pub async fn set_stream_status(&self, stream_id: impl Into<String>, status: StreamStatus) {
        self.inner
            .write()
            .await
            .streams
            .insert(stream_id.into(), status);
    }

    pub async fn set_broadcast_status(&self, broadcast_id: &str, status: BroadcastStatus) {
        if let Some(broadcast) = self.inner.write().await.broadcasts.get_mut(broadcast_id) {
            broadcast.status = status;
        }
    }

    /// Makes `create_broadcast` fail for requests carrying `title`.
    pub async fn reject_title(&self, title: impl Into<String>) {
        self.inner.write().await.rejected_titles.insert(title.into());
    }

    pub async fn transitions(&self) -> Vec<(String, BroadcastTransition)> {
        self.inner.read().await.transitions.clone()
    }

    pub async fn broadcasts(&self) -> Vec<Broadcast> {
        self.inner.read().await.broadcasts.values().cloned().collect()
    }
}

#[async_trait]
impl BroadcastPlatform for InMemoryBroadcastPlatform {
    async fn create_broadcast(&self, request: BroadcastRequest) -> StoreResult<Broadcast> {
        let mut inner = self.inner.write().await;
        if inner.rejected_titles.contains(&request.title) {
            return Err(StoreError::Unavailable(format!(
                "broadcast '{}' rejected by platform",
                request.title
            )));
        }
        inner.next_id = inner.next_id.saturating_add(1);
        let broadcast = Broadcast {
            broadcast_id: format!("broadcast-{}", inner.next_id),
            title: request.title,
            description: request.description,
            scheduled_start_time: request.scheduled_start_time,
            privacy: request.privacy,
            status: BroadcastStatus::Created,
            stream_id: request.stream_id,
        };
        inner
            .broadcasts
            .insert(broadcast.broadcast_id.clone(), broadcast.clone());
        Ok(broadcast)
    }

    async fn get_broadcast(&self, broadcast_id: &str) -> StoreResult<Broadcast> {
        self.inner
            .read()
            .await
            .broadcasts
            .get(broadcast_id)
            .cloned()
            .ok_or_else(|| StoreError::BroadcastNotFound(broadcast_id.to_string()))
    }

    async fn update_broadcast(
        &self,
        broadcast_id: &str,
        update: BroadcastUpdate,
    ) -> StoreResult<Broadcast> {
        let mut inner = self.inner.write().await;
        let broadcast = inner
            .broadcasts
            .get_mut(broadcast_id)
            .ok_or_else(|| StoreError::BroadcastNotFound(broadcast_id.to_string()))?;
        broadcast.title = update.title;
        broadcast.description = update.description;
        broadcast.scheduled_start_time = update.scheduled_start_time;
        broadcast.privacy = update.privacy;
        Ok(broadcast.clone())
    }

    async fn transition_broadcast(
        &self,
        broadcast_id: &str,
        transition: BroadcastTransition,
    ) -> StoreResult<Broadcast> {
        let mut inner = self.inner.write().await;
        inner
            .transitions
            .push((broadcast_id.to_string(), transition));
        let broadcast = inner
            .broadcasts
            .get_mut(broadcast_id)
            .ok_or_else(|| StoreError::BroadcastNotFound(broadcast_id.to_string()))?;
        broadcast.status = transition.target_status();
        Ok(broadcast.clone())
    }

    async fn stream_status(&self, stream_id: &str) -> StoreResult<StreamStatus> {
        self.inner
            .read()
            .await
            .streams
            .get(stream_id)
            .copied()
            .ok_or_else(|| StoreError::StreamNotFound(stream_id.to_string()))
    }

    async fn count_upcoming_broadcasts(&self) -> StoreResult<usize> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .values()
            .filter(|broadcast| {
                matches!(
                    broadcast.status,
                    BroadcastStatus::Created | BroadcastStatus::Ready
                )
            })
            .count())
    }
}
