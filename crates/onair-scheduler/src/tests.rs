use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use onair_runner::{CommandExecutor, InMemoryNotifier, RunnerConfig, RunnerState};
use onair_store::{
    Broadcast, BroadcastPlatform, BroadcastStatus, BroadcastTransition, EventFilter, EventStore,
    InMemoryBroadcastPlatform, InMemoryEventStore, InMemoryScheduleSource,
    InMemoryStatusReporter, Lifecycle, PrivacyStatus, ReportedStatus, RunningEvent,
    ScheduleEvent, ScheduleSource, StatusReporter, Step, StoreError, StoreResult,
};
use tokio_util::sync::CancellationToken;

use super::*;

struct AcknowledgingExecutor;

#[async_trait]
impl CommandExecutor for AcknowledgingExecutor {
    async fn execute(
        &self,
        action: &str,
        _parameter: &str,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        Ok(format!("{action} done"))
    }
}

struct OfflineScheduleSource;

#[async_trait]
impl ScheduleSource for OfflineScheduleSource {
    async fn list_schedules(&self) -> StoreResult<Vec<String>> {
        Err(StoreError::Unavailable("schedule sheet offline".to_string()))
    }

    async fn list_events(
        &self,
        _schedule: &str,
        _filter: EventFilter,
    ) -> StoreResult<Vec<ScheduleEvent>> {
        Err(StoreError::Unavailable("schedule sheet offline".to_string()))
    }

    async fn set_event_id(&self, _schedule: &str, _row: u32, _event_id: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("schedule sheet offline".to_string()))
    }
}

struct Fixture {
    events: Arc<InMemoryEventStore>,
    schedules: Arc<InMemoryScheduleSource>,
    status: Arc<InMemoryStatusReporter>,
    platform: Arc<InMemoryBroadcastPlatform>,
    notifier: Arc<InMemoryNotifier>,
    orchestrator: Arc<Orchestrator>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_status(ReportedStatus::default())
    }

    fn with_status(status: ReportedStatus) -> Self {
        let events = Arc::new(InMemoryEventStore::new());
        let schedules = Arc::new(InMemoryScheduleSource::new());
        let status = Arc::new(InMemoryStatusReporter::with_status(status));
        let platform = Arc::new(InMemoryBroadcastPlatform::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let deps = OrchestratorDeps {
            events: events.clone(),
            schedules: schedules.clone(),
            status: status.clone(),
            platform: platform.clone(),
            executor: Arc::new(AcknowledgingExecutor),
            notifier: notifier.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(deps, test_config()).expect("orchestrator"));
        Self {
            events,
            schedules,
            status,
            platform,
            notifier,
            orchestrator,
        }
    }

    /// Stores an event whose only step is hours away so its runner stays up.
    async fn insert_long_event(&self, event_id: &str, start: DateTime<Utc>) {
        self.events
            .insert_event(
                "Sunday Eucharist",
                RunningEvent {
                    event_id: event_id.to_string(),
                    stream_id: "stream-1".to_string(),
                    scheduled_start_time: start,
                    steps: vec![Step::absolute(1, Duration::hours(3), "camera_on", "1")],
                },
            )
            .await;
    }

    async fn subjects_starting_with(&self, prefix: &str) -> usize {
        self.notifier
            .subjects()
            .await
            .iter()
            .filter(|subject| subject.starts_with(prefix))
            .count()
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        runner: RunnerConfig {
            tick_interval: StdDuration::from_millis(10),
        },
        ..OrchestratorConfig::default()
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 10, 0, 0).unwrap()
}

fn row(
    row_number: u32,
    name: &str,
    first_event_time: DateTime<Utc>,
    automated: bool,
    lifecycle: Lifecycle,
    event_id: Option<&str>,
) -> ScheduleEvent {
    ScheduleEvent {
        row_number,
        name: name.to_string(),
        description: format!("{name} live from the nave"),
        thumbnail: None,
        scheduled_start_time: first_event_time + Duration::minutes(15),
        automated,
        privacy: PrivacyStatus::Public,
        max_length: Duration::minutes(90),
        template: "eucharist".to_string(),
        stream_id: "stream-1".to_string(),
        event_id: event_id.map(str::to_string),
        scheduled_creation_time: first_event_time - Duration::days(7),
        first_event_time,
        latest_end_time: first_event_time + Duration::minutes(120),
        lifecycle,
        custom: Vec::new(),
    }
}

#[tokio::test]
async fn functional_imminent_events_start_only_within_window() {
    let fixture = Fixture::new();
    let now = Utc::now();
    let offsets = [("evt-a", -11), ("evt-b", -1), ("evt-c", 9), ("evt-d", 11)];
    let mut rows = Vec::new();
    for (index, &(event_id, minutes)) in offsets.iter().enumerate() {
        let first = now + Duration::minutes(minutes);
        fixture.insert_long_event(event_id, first).await;
        rows.push(row(
            index as u32 + 2,
            event_id,
            first,
            true,
            Lifecycle::Okay,
            Some(event_id),
        ));
    }
    fixture.insert_long_event("evt-manual", now).await;
    rows.push(row(9, "Choral Evensong", now, false, Lifecycle::Okay, Some("evt-manual")));
    fixture.schedules.insert_schedule("st-marys", rows).await;

    let report = fixture
        .orchestrator
        .start_imminent_events(now)
        .await
        .expect("imminent events");

    assert_eq!(report.considered, 2);
    assert_eq!(report.started, vec!["evt-b".to_string(), "evt-c".to_string()]);
    assert_eq!(report.tracked, 2);
    let status = fixture.status.get().await.expect("status");
    assert_eq!(status.running_events_count, 2);
    assert_eq!(status.last_checked_for_imminent_events, Some(now));
    assert!(fixture.orchestrator.registry().contains("evt-b").await);
    assert!(!fixture.orchestrator.registry().contains("evt-manual").await);
    assert_eq!(fixture.subjects_starting_with("Event starting").await, 2);
}

#[tokio::test]
async fn functional_imminent_events_do_not_start_tracked_event_twice() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture.insert_long_event("evt-1", now).await;
    fixture
        .schedules
        .insert_schedule(
            "st-marys",
            vec![row(2, "Sunday Eucharist", now, true, Lifecycle::Okay, Some("evt-1"))],
        )
        .await;

    let first = fixture.orchestrator.start_imminent_events(now).await.expect("first");
    let second = fixture
        .orchestrator
        .start_imminent_events(now + Duration::minutes(5))
        .await
        .expect("second");

    assert_eq!(first.started, vec!["evt-1".to_string()]);
    assert!(second.started.is_empty());
    assert_eq!(second.already_tracked, 1);
    assert_eq!(fixture.subjects_starting_with("Event starting").await, 1);
}

#[tokio::test]
async fn regression_runner_without_event_record_alerts_and_is_not_retried() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture
        .schedules
        .insert_schedule(
            "st-marys",
            vec![row(2, "Sunday Eucharist", now, true, Lifecycle::Okay, Some("evt-missing"))],
        )
        .await;

    let first = fixture.orchestrator.start_imminent_events(now).await.expect("first");
    assert_eq!(first.start_failed, 1);
    assert!(first.started.is_empty());
    assert_eq!(fixture.subjects_starting_with("Unable to start event").await, 1);

    let second = fixture.orchestrator.start_imminent_events(now).await.expect("second");
    assert_eq!(second.already_tracked, 1);
    assert_eq!(fixture.subjects_starting_with("Unable to start event").await, 1);
    let runner = fixture
        .orchestrator
        .registry()
        .get("evt-missing")
        .await
        .expect("tracked");
    assert_eq!(runner.state(), RunnerState::Idle);
}

#[tokio::test]
async fn functional_provisioning_continues_past_rejected_row() {
    let fixture = Fixture::new();
    let now = fixed_now();
    fixture
        .events
        .insert_template("eucharist", vec![Step::absolute(1, Duration::zero(), "camera_on", "1")])
        .await;
    fixture.platform.reject_title("Vigil").await;
    let first = now + Duration::days(3);
    fixture
        .schedules
        .insert_schedule(
            "st-marys",
            vec![
                row(2, "Sunday Eucharist", first, true, Lifecycle::CreationOverdue, None),
                row(3, "Vigil", first, true, Lifecycle::CreationOverdue, None),
                row(4, "Choral Evensong", first, false, Lifecycle::CreationOverdue, Some(" ")),
            ],
        )
        .await;

    let report = fixture
        .orchestrator
        .create_and_validate_events(now)
        .await
        .expect("provisioning");

    assert_eq!(report.provisioned, 2);
    assert_eq!(report.provisioning_failed, 1);
    let rows = fixture.schedules.rows("st-marys").await;
    assert_eq!(rows[0].event_id.as_deref(), Some("broadcast-1"));
    assert_eq!(rows[1].event_id, None);
    assert_eq!(rows[2].event_id.as_deref(), Some("broadcast-2"));
    assert!(fixture.events.contains_event("broadcast-1").await);
    assert!(!fixture.events.contains_event("broadcast-2").await);

    let created = fixture.platform.get_broadcast("broadcast-1").await.expect("broadcast");
    assert_eq!(created.title, "Sunday Eucharist");
    assert_eq!(created.privacy, PrivacyStatus::Public);
    assert_eq!(created.scheduled_start_time, first + Duration::minutes(15));
}

#[tokio::test]
async fn functional_validation_repairs_broadcast_and_start_time_drift() {
    let fixture = Fixture::new();
    let now = fixed_now();
    let first = now + Duration::days(2);
    let scheduled = row(2, "Sunday Eucharist", first, true, Lifecycle::Okay, Some("evt-1"));
    fixture
        .platform
        .insert_broadcast(Broadcast {
            broadcast_id: "evt-1".to_string(),
            title: "Sunday Mass".to_string(),
            description: scheduled.description.clone(),
            scheduled_start_time: scheduled.scheduled_start_time,
            privacy: PrivacyStatus::Public,
            status: BroadcastStatus::Ready,
            stream_id: "stream-1".to_string(),
        })
        .await;
    fixture.insert_long_event("evt-1", first - Duration::hours(1)).await;
    fixture.schedules.insert_schedule("st-marys", vec![scheduled.clone()]).await;

    let report = fixture
        .orchestrator
        .create_and_validate_events(now)
        .await
        .expect("validation");

    assert_eq!(report.validated, 1);
    assert_eq!(report.broadcasts_updated, 1);
    assert_eq!(report.start_times_corrected, 1);
    let broadcast = fixture.platform.get_broadcast("evt-1").await.expect("broadcast");
    assert_eq!(broadcast.title, "Sunday Eucharist");
    let stored = fixture.events.get_event("evt-1").await.expect("event");
    assert_eq!(stored.scheduled_start_time, scheduled.scheduled_start_time);

    let status = fixture.status.get().await.expect("status");
    assert_eq!(status.scheduled_events_count, 1);
    assert_eq!(status.upcoming_broadcasts_count, 1);
    assert_eq!(status.last_validated_events, Some(now));

    let again = fixture
        .orchestrator
        .create_and_validate_events(now)
        .await
        .expect("second validation");
    assert_eq!(again.broadcasts_updated, 0);
    assert_eq!(again.start_times_corrected, 0);
}

#[tokio::test]
async fn functional_overrunning_event_is_stopped_once() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture.insert_long_event("evt-1", now).await;
    let mut scheduled = row(2, "Sunday Eucharist", now, true, Lifecycle::Okay, Some("evt-1"));
    scheduled.latest_end_time = now + Duration::minutes(1);
    fixture.schedules.insert_schedule("st-marys", vec![scheduled]).await;
    fixture.orchestrator.start_imminent_events(now).await.expect("start");

    let report = fixture
        .orchestrator
        .run_monitoring(now + Duration::minutes(2))
        .await
        .expect("monitoring");
    assert_eq!(report.overrun_events, vec!["evt-1".to_string()]);
    let runner = fixture.orchestrator.registry().get("evt-1").await.expect("runner");
    assert_eq!(runner.state(), RunnerState::Stopped);

    let again = fixture
        .orchestrator
        .run_monitoring(now + Duration::minutes(3))
        .await
        .expect("monitoring again");
    assert!(again.overrun_events.is_empty());
    assert_eq!(fixture.subjects_starting_with("Event overrun").await, 1);

    let mut transitions = Vec::new();
    for _ in 0..50 {
        transitions = fixture.platform.transitions().await;
        if !transitions.is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(
        transitions,
        vec![("evt-1".to_string(), BroadcastTransition::Complete)]
    );
}

#[tokio::test]
async fn functional_watchdog_flags_each_job_against_its_own_last_run() {
    let now = fixed_now();
    let fixture = Fixture::with_status(ReportedStatus {
        app_started: Some(now - Duration::hours(2)),
        last_validated_events: Some(now - Duration::minutes(30)),
        last_checked_for_imminent_events: Some(now - Duration::minutes(6)),
        ..ReportedStatus::default()
    });

    let report = fixture.orchestrator.run_monitoring(now).await.expect("monitoring");

    assert_eq!(report.missed_jobs, vec![JobKind::ImminentEvents]);
    assert_eq!(
        fixture.notifier.subjects().await,
        vec!["Scheduled task missed: start_imminent_events".to_string()]
    );
    let status = fixture.status.get().await.expect("status");
    assert_eq!(status.last_ran_monitoring_task, Some(now));
}

#[tokio::test]
async fn regression_watchdog_measures_never_run_jobs_from_app_start() {
    let now = fixed_now();
    let fixture = Fixture::with_status(ReportedStatus {
        app_started: Some(now - Duration::minutes(3)),
        ..ReportedStatus::default()
    });
    let report = fixture.orchestrator.run_monitoring(now).await.expect("monitoring");
    assert!(report.missed_jobs.is_empty());

    let report = fixture
        .orchestrator
        .run_monitoring(now + Duration::minutes(70))
        .await
        .expect("monitoring later");
    assert_eq!(
        report.missed_jobs,
        vec![JobKind::CreateAndValidate, JobKind::ImminentEvents]
    );
}

#[tokio::test]
async fn functional_concluded_runners_are_dropped_after_grace() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture
        .events
        .insert_event(
            "Said Mass",
            RunningEvent {
                event_id: "evt-1".to_string(),
                stream_id: "stream-1".to_string(),
                scheduled_start_time: now,
                steps: Vec::new(),
            },
        )
        .await;
    fixture
        .schedules
        .insert_schedule(
            "st-marys",
            vec![row(2, "Said Mass", now, true, Lifecycle::Okay, Some("evt-1"))],
        )
        .await;
    fixture.orchestrator.start_imminent_events(now).await.expect("start");
    let runner = fixture.orchestrator.registry().get("evt-1").await.expect("runner");
    tokio::time::timeout(StdDuration::from_secs(2), runner.wait_until_stopped())
        .await
        .expect("runner stops once every step succeeded");

    let within_grace = fixture
        .orchestrator
        .start_imminent_events(now + Duration::minutes(5))
        .await
        .expect("within grace");
    assert!(within_grace.removed.is_empty());
    assert_eq!(within_grace.tracked, 1);

    let past_grace = fixture
        .orchestrator
        .start_imminent_events(now + Duration::minutes(11))
        .await
        .expect("past grace");
    assert_eq!(past_grace.removed, vec!["evt-1".to_string()]);
    assert!(fixture.orchestrator.registry().is_empty().await);
    let status = fixture.status.get().await.expect("status");
    assert_eq!(status.running_events_count, 0);
}

#[tokio::test]
async fn functional_cleanup_deletes_only_records_past_retention() {
    let fixture = Fixture::new();
    let now = fixed_now();
    fixture.insert_long_event("evt-old", now - Duration::days(8)).await;
    fixture.insert_long_event("evt-recent", now - Duration::days(6)).await;

    let report = fixture
        .orchestrator
        .cleanup_event_records(now)
        .await
        .expect("cleanup");

    assert_eq!(report.examined, 2);
    assert_eq!(report.deleted, vec!["evt-old".to_string()]);
    assert!(!fixture.events.contains_event("evt-old").await);
    assert!(fixture.events.contains_event("evt-recent").await);
    let status = fixture.status.get().await.expect("status");
    assert_eq!(status.last_ran_cleanup_task, Some(now));
}

#[tokio::test]
async fn functional_health_tracks_monitoring_and_job_failures() {
    let now = Utc::now();
    let fixture = Fixture::with_status(ReportedStatus {
        app_started: Some(now - Duration::minutes(20)),
        ..ReportedStatus::default()
    });

    let stale = fixture.orchestrator.health(now).await.expect("health");
    assert!(!stale.healthy);

    fixture.orchestrator.run_monitoring(now).await.expect("monitoring");
    let fresh = fixture.orchestrator.health(now).await.expect("health");
    assert!(fresh.healthy, "{fresh:?}");

    fixture.orchestrator.sentinel().report("monitoring", "boom", now).await;
    let failing = fixture.orchestrator.health(now).await.expect("health");
    assert!(!failing.healthy);
    assert!(failing
        .checks
        .iter()
        .any(|check| check.name == "recent_unhandled_failure" && !check.healthy));
}

#[tokio::test]
async fn regression_job_errors_reach_failure_sentinel() {
    let notifier = Arc::new(InMemoryNotifier::new());
    let deps = OrchestratorDeps {
        events: Arc::new(InMemoryEventStore::new()),
        schedules: Arc::new(OfflineScheduleSource),
        status: Arc::new(InMemoryStatusReporter::new()),
        platform: Arc::new(InMemoryBroadcastPlatform::new()),
        executor: Arc::new(AcknowledgingExecutor),
        notifier: notifier.clone(),
    };
    let orchestrator = Arc::new(Orchestrator::new(deps, test_config()).expect("orchestrator"));

    orchestrator
        .run_job_guarded(JobKind::CreateAndValidate, Utc::now())
        .await;
    orchestrator
        .run_job_guarded(JobKind::ImminentEvents, Utc::now())
        .await;

    assert_eq!(
        notifier.subjects().await,
        vec!["Error occurred - create_and_validate_events".to_string()]
    );
    assert!(orchestrator.sentinel().last_alert().await.is_some());
}

#[tokio::test]
async fn integration_shutdown_stops_runners_without_ending_broadcasts() {
    let fixture = Fixture::new();
    let now = Utc::now();
    fixture.insert_long_event("evt-1", now).await;
    fixture
        .schedules
        .insert_schedule(
            "st-marys",
            vec![row(2, "Sunday Eucharist", now, true, Lifecycle::Okay, Some("evt-1"))],
        )
        .await;
    fixture.orchestrator.start_imminent_events(now).await.expect("start");
    assert_eq!(fixture.orchestrator.registry().running_count().await, 1);

    let handle = spawn(fixture.orchestrator.clone()).expect("spawn");
    tokio::time::timeout(StdDuration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown completes");

    assert_eq!(fixture.orchestrator.registry().running_count().await, 0);
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    assert!(fixture.platform.transitions().await.is_empty());
}
