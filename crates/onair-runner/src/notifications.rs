//! Plain-text alert bodies.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use onair_core::humanize_duration;
use onair_types::{EndState, ReferenceTime, RunningEvent, Step};

use crate::Notification;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn optional_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(timestamp).unwrap_or_else(|| "-".to_string())
}

fn scheduled_column(event: &RunningEvent, step: &Step) -> String {
    match step.reference_time {
        ReferenceTime::RelativeToPreviousStep => format!("+{}", humanize_duration(step.offset)),
        ReferenceTime::AbsoluteFromScheduledStart => event
            .scheduled_start_time
            .checked_add_signed(step.offset)
            .map(timestamp)
            .unwrap_or_else(|| "?".to_string()),
    }
}

fn end_state_label(end_state: EndState) -> &'static str {
    match end_state {
        EndState::Unset => "pending",
        EndState::Success => "ok",
        EndState::Failure => "FAILED",
    }
}

/// Renders the step table. `highlight` marks one step id with `>>`.
pub fn running_order(event: &RunningEvent, highlight: Option<u32>) -> String {
    let mut table = String::from("Running order\n");
    for step in &event.steps {
        let marker = if highlight == Some(step.id) { ">>" } else { "  " };
        let _ = writeln!(
            table,
            "{marker} {:>3} {:<22} {:<24} {:<18} start={} end={} [{}] {}",
            step.id,
            scheduled_column(event, step),
            step.action,
            step.parameter,
            optional_timestamp(step.start_time),
            optional_timestamp(step.end_time),
            end_state_label(step.end_state),
            step.message,
        );
    }
    table
}

pub fn application_start(now: DateTime<Utc>) -> Notification {
    Notification::new(
        "Stream automation started",
        format!("Application starting at {}", timestamp(now)),
    )
}

pub fn scheduled_task_missed(
    job: &str,
    cadence: &str,
    last_ran: DateTime<Utc>,
) -> Notification {
    Notification::new(
        format!("Scheduled task missed: {job}"),
        format!(
            "Should run task {job} every {cadence}, but it last ran at {}",
            timestamp(last_ran)
        ),
    )
}

pub fn event_starting(name: &str, event: &RunningEvent) -> Notification {
    Notification::new(
        format!("Event starting: {name}"),
        format!(
            "Preparing to stream event {name}, which is due to broadcast at {}\n\n{}",
            timestamp(event.scheduled_start_time),
            running_order(event, None)
        ),
    )
}

pub fn event_load_failure(name: &str, event_id: &str, error: &str) -> Notification {
    Notification::new(
        format!("Unable to start event: {name}"),
        format!("Could not load event {event_id} for {name}\n\n{error}"),
    )
}

pub fn step_failure(name: &str, event: &RunningEvent, step_id: u32, error: &str) -> Notification {
    let action = event
        .step(step_id)
        .map(|step| step.action.as_str())
        .unwrap_or("unknown");
    Notification::new(
        format!("Event error: {name}"),
        format!(
            "An error occurred while streaming {name} at step {step_id} ({action})\n\n{error}\n\n{}",
            running_order(event, Some(step_id))
        ),
    )
}

pub fn overrun(
    name: &str,
    last_event_time: DateTime<Utc>,
    event: Option<&RunningEvent>,
    now: DateTime<Utc>,
) -> Notification {
    let mut body = format!(
        "{name} has overrun. It was due to finish by {} but was still running at {}. \
The broadcast has been stopped but cameras may still be on.",
        timestamp(last_event_time),
        timestamp(now)
    );
    if let Some(event) = event {
        body.push_str("\n\n");
        body.push_str(&running_order(event, None));
    }
    Notification::new(format!("Event overrun: {name}"), body)
}

pub fn job_failure(job: &str, error: &str) -> Notification {
    Notification::new(format!("Error occurred - {job}"), error.to_string())
}
