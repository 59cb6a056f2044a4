use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use onair_store::{
    Broadcast, BroadcastPlatform, BroadcastStatus, BroadcastTransition, InMemoryBroadcastPlatform,
    StreamStatus,
};
use tokio_util::sync::CancellationToken;

use super::*;

fn fast_poll(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        max_attempts,
        interval: Duration::from_millis(5),
    }
}

fn settings_for(server: &MockServer) -> ActionSettings {
    let mut cameras = CameraDirectory::default();
    cameras
        .cameras
        .insert("Organ Loft".to_string(), server.address().to_string());
    ActionSettings {
        cameras,
        pa_status_url: Some(server.url("/status")),
        pa_poll: fast_poll(3),
        platform_poll: fast_poll(50),
        request_timeout: Duration::from_secs(5),
    }
}

fn broadcast(broadcast_id: &str, status: BroadcastStatus) -> Broadcast {
    Broadcast {
        broadcast_id: broadcast_id.to_string(),
        title: "Sung Eucharist".to_string(),
        description: String::new(),
        scheduled_start_time: Utc.with_ymd_and_hms(2024, 6, 2, 10, 30, 0).unwrap(),
        privacy: onair_store::PrivacyStatus::Public,
        status,
        stream_id: "stream-1".to_string(),
    }
}

#[test]
fn unit_camera_directory_parses_toml_table() {
    let directory = CameraDirectory::from_toml_str(
        r#"
[cameras]
"Left Pillar" = "controller-3"
"Organ Loft" = "controller-2"
"#,
    )
    .expect("parse");
    assert_eq!(directory.hostname("Organ Loft"), Some("controller-2"));
    assert_eq!(directory.hostname(" Left Pillar "), Some("controller-3"));
    assert_eq!(directory.hostname("Font"), None);
}

#[tokio::test]
async fn functional_unknown_action_resolves_as_not_implemented() {
    let registry = ActionRegistry::new();
    let message = registry
        .execute("Select scene", "Intro", &CancellationToken::new())
        .await
        .expect("unknown actions succeed");
    assert_eq!(message, "Command Select scene not implemented");
}

#[tokio::test]
async fn functional_camera_on_posts_to_controller() {
    let server = MockServer::start_async().await;
    let camera = server.mock(|when, then| {
        when.method(POST).path("/api/on");
        then.status(200);
    });
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry = ActionRegistry::standard(&settings_for(&server), platform).expect("registry");

    let message = registry
        .execute(ACTION_CAMERA_ON, "Organ Loft", &CancellationToken::new())
        .await
        .expect("camera on");
    assert_eq!(message, "Camera Organ Loft is on");
    camera.assert();
}

#[tokio::test]
async fn regression_camera_errors_surface_name_and_status() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/off");
        then.status(503);
    });
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry = ActionRegistry::standard(&settings_for(&server), platform).expect("registry");

    let rejected = registry
        .execute(ACTION_CAMERA_OFF, "Organ Loft", &CancellationToken::new())
        .await
        .expect_err("camera rejected");
    assert!(rejected
        .to_string()
        .contains("camera Organ Loft responded with status 503"));

    let unknown = registry
        .execute(ACTION_CAMERA_ON, "Balcony", &CancellationToken::new())
        .await
        .expect_err("unknown camera");
    assert!(unknown.to_string().contains("Camera Balcony not recognised"));
}

#[tokio::test]
async fn functional_wait_for_pa_on_resolves_when_desk_reports_on() {
    let server = MockServer::start_async().await;
    let status = server.mock(|when, then| {
        when.method(GET).path("/status");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"pa":"on"}"#);
    });
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry = ActionRegistry::standard(&settings_for(&server), platform).expect("registry");

    let message = registry
        .execute(ACTION_WAIT_FOR_PA_ON, "", &CancellationToken::new())
        .await
        .expect("pa on");
    assert_eq!(message, "PA is now on");
    status.assert_hits(1);
}

#[tokio::test]
async fn regression_wait_for_pa_off_times_out_after_poll_budget() {
    let server = MockServer::start_async().await;
    let status = server.mock(|when, then| {
        when.method(GET).path("/status");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"pa":"on"}"#);
    });
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry = ActionRegistry::standard(&settings_for(&server), platform).expect("registry");

    let error = registry
        .execute(ACTION_WAIT_FOR_PA_OFF, "", &CancellationToken::new())
        .await
        .expect_err("timeout");
    assert!(error.to_string().ends_with("Timeout"));
    status.assert_hits(3);
}

#[tokio::test]
async fn functional_pa_actions_are_not_registered_without_status_url() {
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry =
        ActionRegistry::standard(&ActionSettings::default(), platform).expect("registry");
    assert!(!registry.contains(ACTION_WAIT_FOR_PA_ON));
    assert!(registry.contains(ACTION_START_LIVEBROADCAST));
    assert_eq!(registry.names().len(), 7);
}

#[tokio::test]
async fn functional_broadcast_actions_drive_platform_transitions() {
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    platform
        .insert_broadcast(broadcast("bc-1", BroadcastStatus::Ready))
        .await;
    let registry =
        ActionRegistry::standard(&ActionSettings::default(), platform.clone()).expect("registry");
    let cancel = CancellationToken::new();

    registry
        .execute(ACTION_PREVIEW_LIVEBROADCAST, "bc-1", &cancel)
        .await
        .expect("preview");
    let ready = registry
        .execute(ACTION_WAIT_FOR_LIVEBROADCAST_READY, "bc-1", &cancel)
        .await
        .expect("testing");
    assert_eq!(ready, "Broadcast is now testing");
    let live = registry
        .execute(ACTION_START_LIVEBROADCAST, "bc-1", &cancel)
        .await
        .expect("live");
    assert_eq!(live, "Broadcast bc-1 is now live");
    registry
        .execute(ACTION_STOP_LIVEBROADCAST, "bc-1", &cancel)
        .await
        .expect("complete");

    assert_eq!(
        platform.transitions().await,
        vec![
            ("bc-1".to_string(), BroadcastTransition::Testing),
            ("bc-1".to_string(), BroadcastTransition::Live),
            ("bc-1".to_string(), BroadcastTransition::Complete),
        ]
    );
}

#[tokio::test]
async fn functional_wait_for_livestream_ready_polls_until_active() {
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    platform
        .set_stream_status("stream-1", StreamStatus::Ready)
        .await;
    let registry =
        ActionRegistry::standard(&settings_without_pa(), platform.clone()).expect("registry");

    let flipper = platform.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        flipper
            .set_stream_status("stream-1", StreamStatus::Active)
            .await;
    });

    let message = registry
        .execute(
            ACTION_WAIT_FOR_LIVESTREAM_READY,
            "stream-1",
            &CancellationToken::new(),
        )
        .await
        .expect("active");
    assert_eq!(message, "Stream stream-1 is now active");
    assert_eq!(
        platform.stream_status("stream-1").await.expect("status"),
        StreamStatus::Active
    );
}

#[tokio::test]
async fn regression_broadcast_actions_require_parameter() {
    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let registry =
        ActionRegistry::standard(&ActionSettings::default(), platform).expect("registry");
    let error = registry
        .execute(ACTION_START_LIVEBROADCAST, "  ", &CancellationToken::new())
        .await
        .expect_err("missing id");
    assert!(error.to_string().contains("missing broadcast id parameter"));
}

fn settings_without_pa() -> ActionSettings {
    ActionSettings {
        platform_poll: fast_poll(200),
        ..ActionSettings::default()
    }
}
