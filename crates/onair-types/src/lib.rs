//! Shared data types for onair event automation.
//!
//! Holds the step model that runners execute, the schedule rows the
//! orchestrator reads, broadcast platform records, and the status snapshot
//! consumed by the watchdog.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod broadcast;
mod schedule;
mod status;

pub use broadcast::{
    Broadcast, BroadcastRequest, BroadcastStatus, BroadcastTransition, BroadcastUpdate,
    StreamStatus,
};
pub use schedule::{EventFilter, EventMetadata, Lifecycle, NewEvent, PrivacyStatus, ScheduleEvent};
pub use status::ReportedStatus;

/// Error returned when a step mutation would break the step lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepTransitionError {
    #[error("step {step_id} not found in event '{event_id}'")]
    UnknownStep { event_id: String, step_id: u32 },
    #[error("step {step_id} in event '{event_id}' was already started")]
    AlreadyStarted { event_id: String, step_id: u32 },
    #[error("invalid end state transition for step {step_id}: {from:?} -> {to:?}")]
    InvalidEndState {
        step_id: u32,
        from: EndState,
        to: EndState,
    },
}

/// How a step's trigger time is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTime {
    AbsoluteFromScheduledStart,
    RelativeToPreviousStep,
}

/// Terminal outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    #[default]
    Unset,
    Success,
    Failure,
}

impl EndState {
    /// Returns true when this state can transition to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unset, Self::Success) | (Self::Unset, Self::Failure)
        )
    }

    /// Returns true once the step has a recorded outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// One scheduled operation within an event's run sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: u32,
    pub reference_time: ReferenceTime,
    #[serde(rename = "offset_ms", with = "duration_ms")]
    pub offset: Duration,
    pub action: String,
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_state: EndState,
    #[serde(default)]
    pub message: String,
}

impl Step {
    /// Creates a step anchored on the event's scheduled start time.
    pub fn absolute(
        id: u32,
        offset: Duration,
        action: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ReferenceTime::AbsoluteFromScheduledStart,
            offset,
            action,
            parameter,
        )
    }

    /// Creates a step anchored on the previous step's successful end.
    pub fn relative(
        id: u32,
        offset: Duration,
        action: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ReferenceTime::RelativeToPreviousStep,
            offset,
            action,
            parameter,
        )
    }

    fn new(
        id: u32,
        reference_time: ReferenceTime,
        offset: Duration,
        action: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            id,
            reference_time,
            offset,
            action: action.into(),
            parameter: parameter.into(),
            start_time: None,
            end_time: None,
            end_state: EndState::Unset,
            message: String::new(),
        }
    }

    /// True once the step has been claimed for execution.
    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }
}

/// Aggregate for one event's run sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEvent {
    pub event_id: String,
    pub stream_id: String,
    pub scheduled_start_time: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl RunningEvent {
    /// Computes the instant the step at `index` becomes eligible to run.
    ///
    /// Absolute steps are anchored on the scheduled start time. Relative steps
    /// are only defined once the immediately preceding step succeeded with a
    /// recorded end time; otherwise this returns `None` and the caller retries
    /// on a later tick.
    pub fn trigger_time(&self, index: usize) -> Option<DateTime<Utc>> {
        let step = self.steps.get(index)?;
        match step.reference_time {
            ReferenceTime::AbsoluteFromScheduledStart => {
                self.scheduled_start_time.checked_add_signed(step.offset)
            }
            ReferenceTime::RelativeToPreviousStep => {
                let previous = self.steps.get(index.checked_sub(1)?)?;
                if previous.end_state != EndState::Success {
                    return None;
                }
                previous.end_time?.checked_add_signed(step.offset)
            }
        }
    }

    /// Returns true when every step finished successfully.
    pub fn all_steps_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.end_state == EndState::Success)
    }

    pub fn step(&self, step_id: u32) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    fn step_mut(&mut self, step_id: u32) -> Result<&mut Step, StepTransitionError> {
        let event_id = self.event_id.clone();
        self.steps
            .iter_mut()
            .find(|step| step.id == step_id)
            .ok_or(StepTransitionError::UnknownStep { event_id, step_id })
    }

    /// Claims a step for execution. A step can only be started once.
    pub fn record_step_start(
        &mut self,
        step_id: u32,
        started_at: DateTime<Utc>,
    ) -> Result<(), StepTransitionError> {
        let event_id = self.event_id.clone();
        let step = self.step_mut(step_id)?;
        if step.start_time.is_some() {
            return Err(StepTransitionError::AlreadyStarted { event_id, step_id });
        }
        step.start_time = Some(started_at);
        Ok(())
    }

    /// Records the terminal outcome of a step.
    pub fn record_step_completion(
        &mut self,
        step_id: u32,
        ended_at: DateTime<Utc>,
        end_state: EndState,
        message: impl Into<String>,
    ) -> Result<(), StepTransitionError> {
        let step = self.step_mut(step_id)?;
        if !step.end_state.can_transition_to(end_state) {
            return Err(StepTransitionError::InvalidEndState {
                step_id,
                from: step.end_state,
                to: end_state,
            });
        }
        step.end_time = Some(ended_at);
        step.end_state = end_state;
        step.message = message.into();
        Ok(())
    }
}

/// Serde adapter storing a signed chrono duration as whole milliseconds.
pub mod duration_ms {
    use chrono::Duration;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Duration::try_milliseconds(millis)
            .ok_or_else(|| D::Error::custom(format!("duration out of range: {millis}ms")))
    }
}
