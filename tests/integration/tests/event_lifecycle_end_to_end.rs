use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use httpmock::Method::POST;
use httpmock::MockServer;
use onair_actions::{
    ActionRegistry, ActionSettings, CameraDirectory, ACTION_CAMERA_ON, ACTION_PREVIEW_LIVEBROADCAST,
    ACTION_START_LIVEBROADCAST,
};
use onair_runner::{InMemoryNotifier, RunnerConfig};
use onair_scheduler::{Orchestrator, OrchestratorConfig, OrchestratorDeps};
use onair_store::{
    BroadcastTransition, EndState, EventFilter, EventStore, InMemoryBroadcastPlatform, JsonEventStore,
    JsonScheduleSource, JsonStatusReporter, Lifecycle, PrivacyStatus, RunningEvent,
    ScheduleEvent, ScheduleSource, StatusReporter, Step, EVENT_ID_PLACEHOLDER,
};
use tempfile::tempdir;

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    std::fs::write(path, serde_json::to_vec_pretty(value).expect("encode")).expect("write");
}

fn schedule_row(now: DateTime<Utc>) -> ScheduleEvent {
    let scheduled_start_time = now + Duration::seconds(1);
    ScheduleEvent {
        row_number: 2,
        name: "Sunday Eucharist".to_string(),
        description: "Live from the nave".to_string(),
        thumbnail: None,
        scheduled_start_time,
        automated: true,
        privacy: PrivacyStatus::Public,
        max_length: Duration::minutes(90),
        template: "eucharist".to_string(),
        stream_id: "stream-1".to_string(),
        event_id: None,
        scheduled_creation_time: now - Duration::days(7),
        first_event_time: now,
        latest_end_time: now + Duration::minutes(120),
        lifecycle: Lifecycle::CreationOverdue,
        custom: Vec::new(),
    }
}

async fn wait_for_recorded_starts(store: &JsonEventStore, event_id: &str) -> RunningEvent {
    let mut event = store.get_event(event_id).await.expect("event record");
    for _ in 0..100 {
        if event.steps.iter().all(|step| step.start_time.is_some()) {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        event = store.get_event(event_id).await.expect("event record");
    }
    event
}

#[tokio::test]
async fn integration_provisioned_event_runs_every_step_and_is_cleaned_up() {
    let camera = MockServer::start_async().await;
    let camera_on = camera.mock(|when, then| {
        when.method(POST).path("/api/on");
        then.status(200);
    });

    let temp = tempdir().expect("tempdir");
    let root = temp.path();
    let now = Utc::now();
    let template = vec![
        Step::absolute(1, Duration::zero(), ACTION_CAMERA_ON, "Organ Loft"),
        Step::relative(2, Duration::zero(), ACTION_PREVIEW_LIVEBROADCAST, EVENT_ID_PLACEHOLDER),
        Step::relative(3, Duration::zero(), ACTION_START_LIVEBROADCAST, EVENT_ID_PLACEHOLDER),
    ];
    write_json(
        &root.join("templates/eucharist.json"),
        &serde_json::to_value(&template).expect("template json"),
    );
    write_json(
        &root.join("schedules/st-marys.json"),
        &serde_json::to_value(vec![schedule_row(now)]).expect("schedule json"),
    );

    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let settings = ActionSettings {
        cameras: CameraDirectory::from_toml_str(&format!(
            "[cameras]\n\"Organ Loft\" = \"{}\"\n",
            camera.address()
        ))
        .expect("cameras"),
        ..ActionSettings::default()
    };
    let executor = ActionRegistry::standard(&settings, platform.clone()).expect("registry");
    let events = Arc::new(JsonEventStore::new(root));
    let schedules = Arc::new(JsonScheduleSource::new(root));
    let status = Arc::new(JsonStatusReporter::new(root));
    let notifier = Arc::new(InMemoryNotifier::new());
    let orchestrator = Orchestrator::new(
        OrchestratorDeps {
            events: events.clone(),
            schedules: schedules.clone(),
            status: status.clone(),
            platform: platform.clone(),
            executor: Arc::new(executor),
            notifier: notifier.clone(),
        },
        OrchestratorConfig {
            runner: RunnerConfig {
                tick_interval: StdDuration::from_millis(20),
            },
            ..OrchestratorConfig::default()
        },
    )
    .expect("orchestrator");

    let provisioning = orchestrator
        .create_and_validate_events(now)
        .await
        .expect("provisioning");
    assert_eq!(provisioning.provisioned, 1);
    let rows = schedules
        .list_events("st-marys", EventFilter::CreationOverdue)
        .await
        .expect("rows");
    assert_eq!(rows[0].event_id.as_deref(), Some("broadcast-1"));
    let record = events.get_event("broadcast-1").await.expect("event record");
    assert_eq!(record.steps[1].parameter, "broadcast-1");

    let imminent = orchestrator
        .start_imminent_events(Utc::now())
        .await
        .expect("imminent");
    assert_eq!(imminent.started, vec!["broadcast-1".to_string()]);
    let runner = orchestrator
        .registry()
        .get("broadcast-1")
        .await
        .expect("tracked runner");
    tokio::time::timeout(StdDuration::from_secs(10), runner.wait_until_stopped())
        .await
        .expect("event finishes");

    camera_on.assert();
    assert_eq!(
        platform.transitions().await,
        vec![
            ("broadcast-1".to_string(), BroadcastTransition::Testing),
            ("broadcast-1".to_string(), BroadcastTransition::Live),
        ]
    );
    let finished = wait_for_recorded_starts(&events, "broadcast-1").await;
    assert!(finished
        .steps
        .iter()
        .all(|step| step.end_state == EndState::Success && step.start_time.is_some()));
    assert_eq!(finished.steps[0].message, "Camera Organ Loft is on");
    assert!(notifier
        .subjects()
        .await
        .contains(&"Event starting: Sunday Eucharist".to_string()));

    let snapshot = status.get().await.expect("status");
    assert_eq!(snapshot.running_events_count, 1);
    assert_eq!(snapshot.upcoming_broadcasts_count, 1);

    let cleanup = orchestrator
        .cleanup_event_records(now + Duration::days(8))
        .await
        .expect("cleanup");
    assert_eq!(cleanup.deleted, vec!["broadcast-1".to_string()]);
    assert!(!root.join("events/broadcast-1.json").exists());
}
