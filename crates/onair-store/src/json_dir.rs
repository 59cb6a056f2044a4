use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onair_core::write_json_atomic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    record_from_template, EndState, EventFilter, EventMetadata, EventRecord, EventStore, NewEvent,
    ReportedStatus, RunningEvent, ScheduleEvent, ScheduleSource, StatusReporter, Step,
    StoreError, StoreResult,
};

const EVENTS_DIR: &str = "events";
const TEMPLATES_DIR: &str = "templates";
const SCHEDULES_DIR: &str = "schedules";
const STATUS_FILE: &str = "status.json";

fn validate_identifier(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(id.to_string()))
    }
}

fn document_path(dir: &Path, id: &str) -> StoreResult<PathBuf> {
    validate_identifier(id)?;
    Ok(dir.join(format!("{id}.json")))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    write_json_atomic(path, value).map_err(|error| StoreError::Persist {
        path: path.display().to_string(),
        message: format!("{error:#}"),
    })?;
    debug!(path = %path.display(), "persisted json document");
    Ok(())
}

fn list_document_ids(dir: &Path) -> StoreResult<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Runs filesystem work on the blocking pool.
async fn run_blocking<T, F>(task: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| StoreError::Unavailable(format!("filesystem task failed: {error}")))?
}

async fn read_document<T>(path: PathBuf) -> StoreResult<Option<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    run_blocking(move || read_json(&path)).await
}

async fn write_document<T>(path: PathBuf, value: T) -> StoreResult<()>
where
    T: Serialize + Send + 'static,
{
    run_blocking(move || write_json(&path, &value)).await
}

async fn list_documents(dir: PathBuf) -> StoreResult<Vec<String>> {
    run_blocking(move || list_document_ids(&dir)).await
}

/// Event store keeping one JSON document per event under `<root>/events`.
/// Templates are read from `<root>/templates/<name>.json` as step arrays.
#[derive(Debug)]
pub struct JsonEventStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn event_path(&self, event_id: &str) -> StoreResult<PathBuf> {
        document_path(&self.root.join(EVENTS_DIR), event_id)
    }

    async fn load(&self, event_id: &str) -> StoreResult<EventRecord> {
        read_document(self.event_path(event_id)?)
            .await?
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))
    }

    async fn modify(
        &self,
        event_id: &str,
        apply: impl FnOnce(&mut EventRecord) -> StoreResult<()> + Send,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(event_id).await?;
        apply(&mut record)?;
        write_document(self.event_path(event_id)?, record).await
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn get_event(&self, event_id: &str) -> StoreResult<RunningEvent> {
        Ok(self.load(event_id).await?.event)
    }

    async fn set_step_start_time(
        &self,
        event_id: &str,
        step_id: u32,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.modify(event_id, |record| {
            record
                .event
                .record_step_start(step_id, started_at)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn step_complete(
        &self,
        event_id: &str,
        step_id: u32,
        ended_at: DateTime<Utc>,
        end_state: EndState,
        message: &str,
    ) -> StoreResult<()> {
        let message = message.to_string();
        self.modify(event_id, move |record| {
            record
                .event
                .record_step_completion(step_id, ended_at, end_state, message)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn set_scheduled_start_time(
        &self,
        event_id: &str,
        scheduled_start_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.modify(event_id, |record| {
            record.event.scheduled_start_time = scheduled_start_time;
            Ok(())
        })
        .await
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.event_path(&event.event_id)?;
        let existing_path = path.clone();
        if run_blocking(move || Ok(existing_path.exists())).await? {
            return Err(StoreError::EventAlreadyExists(event.event_id));
        }
        let template_path = document_path(&self.root.join(TEMPLATES_DIR), &event.template)?;
        let steps: Vec<Step> = read_document(template_path)
            .await?
            .ok_or_else(|| StoreError::TemplateNotFound(event.template.clone()))?;
        let record = record_from_template(event, &steps);
        write_document(path, record).await
    }

    async fn delete_event(&self, event_id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.event_path(event_id)?;
        let missing = event_id.to_string();
        run_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::EventNotFound(missing))
            }
            Err(error) => Err(error.into()),
        })
        .await
    }

    async fn get_metadata(&self, event_id: &str) -> StoreResult<EventMetadata> {
        Ok(self.load(event_id).await?.metadata())
    }

    async fn get_events(&self) -> StoreResult<Vec<String>> {
        list_documents(self.root.join(EVENTS_DIR)).await
    }
}

/// Schedule source reading `<root>/schedules/<name>.json` row arrays.
#[derive(Debug)]
pub struct JsonScheduleSource {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonScheduleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, schedule: &str) -> StoreResult<(PathBuf, Vec<ScheduleEvent>)> {
        let path = document_path(&self.root.join(SCHEDULES_DIR), schedule)?;
        let rows = read_document(path.clone())
            .await?
            .ok_or_else(|| StoreError::ScheduleNotFound(schedule.to_string()))?;
        Ok((path, rows))
    }
}

#[async_trait]
impl ScheduleSource for JsonScheduleSource {
    async fn list_schedules(&self) -> StoreResult<Vec<String>> {
        list_documents(self.root.join(SCHEDULES_DIR)).await
    }

    async fn list_events(
        &self,
        schedule: &str,
        filter: EventFilter,
    ) -> StoreResult<Vec<ScheduleEvent>> {
        let (_, rows) = self.load(schedule).await?;
        Ok(rows.into_iter().filter(|row| filter.matches(row)).collect())
    }

    async fn set_event_id(
        &self,
        schedule: &str,
        row_number: u32,
        event_id: &str,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let (path, mut rows) = self.load(schedule).await?;
        let row = rows
            .iter_mut()
            .find(|row| row.row_number == row_number)
            .ok_or_else(|| StoreError::RowNotFound {
                schedule: schedule.to_string(),
                row: row_number,
            })?;
        row.event_id = Some(event_id.to_string());
        write_document(path, rows).await
    }
}

/// Status reporter persisting the snapshot to `<root>/status.json`.
#[derive(Debug)]
pub struct JsonStatusReporter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStatusReporter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(STATUS_FILE),
            write_lock: Mutex::new(()),
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut ReportedStatus) + Send) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut status: ReportedStatus = read_document(self.path.clone())
            .await?
            .unwrap_or_default();
        apply(&mut status);
        write_document(self.path.clone(), status).await
    }
}

#[async_trait]
impl StatusReporter for JsonStatusReporter {
    async fn report_running_events_count(&self, count: usize) -> StoreResult<()> {
        self.update(|status| status.running_events_count = count)
            .await
    }

    async fn report_scheduled_events_count(&self, count: usize) -> StoreResult<()> {
        self.update(|status| status.scheduled_events_count = count)
            .await
    }

    async fn report_upcoming_broadcasts_count(&self, count: usize) -> StoreResult<()> {
        self.update(|status| status.upcoming_broadcasts_count = count)
            .await
    }

    async fn report_validated_events(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.update(|status| status.last_validated_events = Some(at))
            .await
    }

    async fn report_checked_for_imminent_events(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.update(|status| status.last_checked_for_imminent_events = Some(at))
            .await
    }

    async fn report_ran_monitoring_task(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.update(|status| status.last_ran_monitoring_task = Some(at))
            .await
    }

    async fn report_ran_cleanup_task(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.update(|status| status.last_ran_cleanup_task = Some(at))
            .await
    }

    async fn report_app_started(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.update(|status| status.app_started = Some(at)).await
    }

    async fn get(&self) -> StoreResult<ReportedStatus> {
        Ok(read_document(self.path.clone()).await?.unwrap_or_default())
    }
}
