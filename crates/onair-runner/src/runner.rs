use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use onair_core::delay_until;
use onair_store::{BroadcastPlatform, EventStore};
use onair_types::{EndState, RunningEvent, ScheduleEvent, Step};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notifications;
use crate::notifier::{notify_best_effort, Notifier};
use crate::CommandExecutor;

/// Runtime configuration for an event runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub tick_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            bail!("tick_interval must be greater than 0");
        }
        Ok(())
    }
}

/// Collaborators shared by every runner.
#[derive(Clone)]
pub struct RunnerDeps {
    pub store: Arc<dyn EventStore>,
    pub executor: Arc<dyn CommandExecutor>,
    pub notifier: Arc<dyn Notifier>,
    pub platform: Arc<dyn BroadcastPlatform>,
}

/// Identity and time window of the event a runner drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub event_id: String,
    pub name: String,
    pub first_event_time: DateTime<Utc>,
    pub last_event_time: DateTime<Utc>,
}

impl EventDescriptor {
    /// Builds a descriptor from a provisioned schedule row.
    pub fn from_schedule_row(row: &ScheduleEvent) -> Option<Self> {
        Some(Self {
            event_id: row.provisioned_event_id()?.to_string(),
            name: row.name.clone(),
            first_event_time: row.first_event_time,
            last_event_time: row.latest_end_time,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
    Stopped,
}

/// Outcome of a single step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success { message: String },
    Failure { error: String },
}

impl StepOutcome {
    fn end_state(&self) -> EndState {
        match self {
            Self::Success { .. } => EndState::Success,
            Self::Failure { .. } => EndState::Failure,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Success { message } => message,
            Self::Failure { error } => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepPhase {
    NotArmed,
    Armed,
    Fired,
}

#[derive(Debug)]
enum StepReport {
    Started {
        index: usize,
        at: DateTime<Utc>,
    },
    Completed {
        index: usize,
        at: DateTime<Utc>,
        outcome: StepOutcome,
    },
}

/// Drives the step list of one event from start to stop.
pub struct EventRunner {
    descriptor: EventDescriptor,
    deps: RunnerDeps,
    config: RunnerConfig,
    state: watch::Sender<RunnerState>,
    snapshot: watch::Sender<Option<RunningEvent>>,
    cancel: CancellationToken,
    /// Cancelled by `stop_event` or by the first failed step; armed timers
    /// watch this one.
    halt: CancellationToken,
}

impl EventRunner {
    pub fn new(descriptor: EventDescriptor, deps: RunnerDeps, config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(RunnerState::Idle);
        let (snapshot, _) = watch::channel(None);
        let cancel = CancellationToken::new();
        let halt = cancel.child_token();
        Ok(Self {
            descriptor,
            deps,
            config,
            state,
            snapshot,
            cancel,
            halt,
        })
    }

    pub fn event_id(&self) -> &str {
        &self.descriptor.event_id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn first_event_time(&self) -> DateTime<Utc> {
        self.descriptor.first_event_time
    }

    pub fn last_event_time(&self) -> DateTime<Utc> {
        self.descriptor.last_event_time
    }

    pub fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunnerState::Running
    }

    /// Latest in-memory copy of the event, once loaded.
    pub fn snapshot(&self) -> Option<RunningEvent> {
        self.snapshot.borrow().clone()
    }

    pub async fn wait_until_stopped(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == RunnerState::Stopped)
            .await;
    }

    /// Loads the event and spawns its control loop.
    ///
    /// A load failure is alerted and returned; the runner stays idle.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.state() != RunnerState::Idle {
            bail!("runner for event '{}' was already started", self.event_id());
        }

        let loaded = self
            .deps
            .store
            .get_event(self.event_id())
            .await
            .with_context(|| format!("failed to load event '{}'", self.event_id()));
        let event = match loaded {
            Ok(event) => event,
            Err(error) => {
                warn!(event_id = %self.event_id(), error = %format!("{error:#}"), "event load failed");
                let notification = notifications::event_load_failure(
                    self.name(),
                    self.event_id(),
                    &format!("{error:#}"),
                );
                notify_best_effort(self.deps.notifier.as_ref(), &notification).await;
                return Err(error);
            }
        };

        let started = self.state.send_if_modified(|state| {
            if *state == RunnerState::Idle {
                *state = RunnerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            bail!("runner for event '{}' was stopped before start", self.event_id());
        }

        info!(
            event_id = %self.event_id(),
            name = %self.name(),
            steps = event.steps.len(),
            "event runner started"
        );
        self.snapshot.send_replace(Some(event.clone()));
        let notification = notifications::event_starting(self.name(), &event);
        notify_best_effort(self.deps.notifier.as_ref(), &notification).await;

        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.control_loop(event).await });
        Ok(())
    }

    /// Stops the runner and abandons every pending step timer.
    ///
    /// When `stop_underlying_broadcast` is set the broadcast is ended in the
    /// background. Only the first call has any effect.
    pub fn stop_event(&self, stop_underlying_broadcast: bool) {
        let stopped = self.state.send_if_modified(|state| {
            if *state == RunnerState::Stopped {
                false
            } else {
                *state = RunnerState::Stopped;
                true
            }
        });
        if !stopped {
            return;
        }
        self.cancel.cancel();
        info!(
            event_id = %self.event_id(),
            stop_underlying_broadcast,
            "event runner stopped"
        );

        if stop_underlying_broadcast {
            let platform = Arc::clone(&self.deps.platform);
            let event_id = self.event_id().to_string();
            tokio::spawn(async move {
                if let Err(error) = platform.end_broadcast(&event_id).await {
                    warn!(event_id = %event_id, error = %error, "failed to end broadcast");
                }
            });
        }
    }

    async fn control_loop(self: Arc<Self>, mut event: RunningEvent) {
        let (reports_tx, mut reports) = mpsc::unbounded_channel();
        let mut phases: Vec<StepPhase> = event
            .steps
            .iter()
            .map(|step| {
                if step.has_started() {
                    StepPhase::Fired
                } else {
                    StepPhase::NotArmed
                }
            })
            .collect();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(report) = reports.recv() => {
                    self.apply_report(&mut event, &mut phases, report).await;
                }
                _ = ticker.tick() => {
                    self.arm_ready_steps(&event, &mut phases, &reports_tx);
                }
            }
            if self.is_running() && event.all_steps_succeeded() {
                info!(event_id = %self.event_id(), "all steps succeeded");
                self.stop_event(false);
            }
        }
        debug!(event_id = %self.event_id(), "control loop exited");
    }

    fn arm_ready_steps(
        self: &Arc<Self>,
        event: &RunningEvent,
        phases: &mut [StepPhase],
        reports: &mpsc::UnboundedSender<StepReport>,
    ) {
        let now = Utc::now();
        for (index, step) in event.steps.iter().enumerate() {
            if phases[index] != StepPhase::NotArmed || step.has_started() {
                continue;
            }
            let Some(trigger_time) = event.trigger_time(index) else {
                continue;
            };
            phases[index] = StepPhase::Armed;
            let delay = delay_until(trigger_time, now);
            debug!(
                event_id = %self.event_id(),
                step_id = step.id,
                action = %step.action,
                delay_ms = delay.as_millis() as u64,
                "step armed"
            );
            tokio::spawn(Arc::clone(self).fire_when_due(
                index,
                step.clone(),
                delay,
                reports.clone(),
            ));
        }
    }

    async fn fire_when_due(
        self: Arc<Self>,
        index: usize,
        step: Step,
        delay: Duration,
        reports: mpsc::UnboundedSender<StepReport>,
    ) {
        tokio::select! {
            biased;
            _ = self.halt.cancelled() => {
                debug!(event_id = %self.event_id(), step_id = step.id, "armed step abandoned");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        let started_at = Utc::now();
        let _ = reports.send(StepReport::Started {
            index,
            at: started_at,
        });
        let (ended_at, outcome) = self.run_step(&step, started_at).await;
        let _ = reports.send(StepReport::Completed {
            index,
            at: ended_at,
            outcome,
        });
    }

    async fn run_step(&self, step: &Step, started_at: DateTime<Utc>) -> (DateTime<Utc>, StepOutcome) {
        info!(
            event_id = %self.event_id(),
            step_id = step.id,
            action = %step.action,
            parameter = %step.parameter,
            "step started"
        );
        let store = Arc::clone(&self.deps.store);
        let event_id = self.event_id().to_string();
        let step_id = step.id;
        tokio::spawn(async move {
            if let Err(error) = store
                .set_step_start_time(&event_id, step_id, started_at)
                .await
            {
                warn!(event_id = %event_id, step_id, error = %error, "failed to persist step start");
            }
        });

        let outcome = match self
            .deps
            .executor
            .execute(&step.action, &step.parameter, &self.cancel)
            .await
        {
            Ok(message) => StepOutcome::Success { message },
            Err(error) => StepOutcome::Failure {
                error: format!("{error:#}"),
            },
        };
        let ended_at = Utc::now();
        if matches!(outcome, StepOutcome::Failure { .. }) {
            self.halt.cancel();
        }

        if let Err(error) = self
            .deps
            .store
            .step_complete(
                self.event_id(),
                step.id,
                ended_at,
                outcome.end_state(),
                outcome.message(),
            )
            .await
        {
            warn!(event_id = %self.event_id(), step_id = step.id, error = %error, "failed to persist step completion");
        }
        (ended_at, outcome)
    }

    async fn apply_report(
        &self,
        event: &mut RunningEvent,
        phases: &mut [StepPhase],
        report: StepReport,
    ) {
        match report {
            StepReport::Started { index, at } => {
                phases[index] = StepPhase::Fired;
                let step_id = event.steps[index].id;
                if let Err(error) = event.record_step_start(step_id, at) {
                    warn!(event_id = %self.event_id(), step_id, error = %error, "step start rejected");
                }
            }
            StepReport::Completed { index, at, outcome } => {
                let step_id = event.steps[index].id;
                if let Err(error) =
                    event.record_step_completion(step_id, at, outcome.end_state(), outcome.message())
                {
                    warn!(event_id = %self.event_id(), step_id, error = %error, "step completion rejected");
                }
                match &outcome {
                    StepOutcome::Success { message } => {
                        info!(event_id = %self.event_id(), step_id, message = %message, "step succeeded");
                    }
                    StepOutcome::Failure { error } => {
                        warn!(event_id = %self.event_id(), step_id, error = %error, "step failed");
                        if self.is_running() {
                            self.stop_event(false);
                            let notification =
                                notifications::step_failure(self.name(), event, step_id, error);
                            notify_best_effort(self.deps.notifier.as_ref(), &notification).await;
                        }
                    }
                }
            }
        }
        self.snapshot.send_replace(Some(event.clone()));
    }
}
