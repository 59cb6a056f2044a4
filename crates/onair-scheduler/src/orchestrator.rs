use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use onair_core::{elapsed_exceeds, humanize_duration, scale_duration};
use onair_runner::{
    notifications, notify_best_effort, CommandExecutor, EventDescriptor, EventRunner, Notifier,
    RunnerDeps,
};
use onair_store::{
    BroadcastPlatform, BroadcastRequest, BroadcastUpdate, EventFilter, EventStore, NewEvent,
    ScheduleEvent, ScheduleSource, StatusReporter,
};
use tracing::{info, warn};

use crate::config::{JobKind, JobSchedule, OrchestratorConfig};
use crate::health::{quiet_period_check, recency_check, HealthReport};
use crate::registry::RunnerRegistry;
use crate::sentinel::FailureSentinel;

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub events: Arc<dyn EventStore>,
    pub schedules: Arc<dyn ScheduleSource>,
    pub status: Arc<dyn StatusReporter>,
    pub platform: Arc<dyn BroadcastPlatform>,
    pub executor: Arc<dyn CommandExecutor>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub schedules: usize,
    pub provisioned: usize,
    pub provisioning_failed: usize,
    pub validated: usize,
    pub broadcasts_updated: usize,
    pub start_times_corrected: usize,
    pub validation_failed: usize,
    pub scheduled_events: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImminentReport {
    pub considered: usize,
    pub started: Vec<String>,
    pub start_failed: usize,
    pub already_tracked: usize,
    pub unprovisioned: usize,
    pub removed: Vec<String>,
    pub tracked: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringReport {
    pub missed_jobs: Vec<JobKind>,
    pub overrun_events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub examined: usize,
    pub deleted: Vec<String>,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ValidationOutcome {
    broadcast_updated: bool,
    start_time_corrected: bool,
}

/// Owns the runner registry and drives the periodic jobs.
pub struct Orchestrator {
    deps: OrchestratorDeps,
    config: OrchestratorConfig,
    schedules: HashMap<JobKind, JobSchedule>,
    registry: RunnerRegistry,
    sentinel: FailureSentinel,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let mut schedules = HashMap::new();
        for job in JobKind::ALL {
            schedules.insert(job, config.job_schedule(job)?);
        }
        let sentinel = FailureSentinel::new(deps.notifier.clone(), config.alert_cooldown);
        Ok(Self {
            deps,
            config,
            schedules,
            registry: RunnerRegistry::new(),
            sentinel,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub fn sentinel(&self) -> &FailureSentinel {
        &self.sentinel
    }

    pub fn job_schedule(&self, job: JobKind) -> Result<&JobSchedule> {
        self.schedules
            .get(&job)
            .ok_or_else(|| anyhow!("no schedule configured for job {job}"))
    }

    fn runner_deps(&self) -> RunnerDeps {
        RunnerDeps {
            store: self.deps.events.clone(),
            executor: self.deps.executor.clone(),
            notifier: self.deps.notifier.clone(),
            platform: self.deps.platform.clone(),
        }
    }

    /// Records the application start and sends the start-up notice.
    pub async fn report_app_started(&self, now: DateTime<Utc>) -> Result<()> {
        self.deps
            .status
            .report_app_started(now)
            .await
            .context("failed to record application start")?;
        notify_best_effort(
            self.deps.notifier.as_ref(),
            &notifications::application_start(now),
        )
        .await;
        Ok(())
    }

    /// Runs one job cycle and logs its report.
    pub async fn run_job(&self, job: JobKind, now: DateTime<Utc>) -> Result<()> {
        match job {
            JobKind::CreateAndValidate => {
                let report = self.create_and_validate_events(now).await?;
                info!(
                    job = %job,
                    schedules = report.schedules,
                    provisioned = report.provisioned,
                    provisioning_failed = report.provisioning_failed,
                    validated = report.validated,
                    broadcasts_updated = report.broadcasts_updated,
                    start_times_corrected = report.start_times_corrected,
                    validation_failed = report.validation_failed,
                    "job finished"
                );
            }
            JobKind::ImminentEvents => {
                let report = self.start_imminent_events(now).await?;
                info!(
                    job = %job,
                    considered = report.considered,
                    started = report.started.len(),
                    start_failed = report.start_failed,
                    removed = report.removed.len(),
                    tracked = report.tracked,
                    "job finished"
                );
            }
            JobKind::Monitoring => {
                let report = self.run_monitoring(now).await?;
                info!(
                    job = %job,
                    missed_jobs = report.missed_jobs.len(),
                    overrun_events = report.overrun_events.len(),
                    "job finished"
                );
            }
            JobKind::Cleanup => {
                let report = self.cleanup_event_records(now).await?;
                info!(
                    job = %job,
                    examined = report.examined,
                    deleted = report.deleted.len(),
                    failed = report.failed,
                    "job finished"
                );
            }
        }
        Ok(())
    }

    /// Runs one job cycle in its own task. Errors and panics go to the
    /// failure sentinel instead of the caller.
    pub async fn run_job_guarded(self: &Arc<Self>, job: JobKind, now: DateTime<Utc>) {
        let orchestrator = Arc::clone(self);
        let outcome = tokio::spawn(async move { orchestrator.run_job(job, now).await }).await;
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => format!("{error:#}"),
            Err(join_error) => format!("job task aborted: {join_error}"),
        };
        self.sentinel
            .report(job.as_str(), &failure, Utc::now())
            .await;
    }

    /// Provisions overdue schedule rows, then validates provisioned ones.
    pub async fn create_and_validate_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ProvisioningReport> {
        let schedules = self
            .deps
            .schedules
            .list_schedules()
            .await
            .context("failed to list schedules")?;
        let mut report = ProvisioningReport {
            schedules: schedules.len(),
            ..ProvisioningReport::default()
        };

        for schedule in &schedules {
            let overdue = match self
                .deps
                .schedules
                .list_events(schedule, EventFilter::CreationOverdue)
                .await
            {
                Ok(rows) => rows,
                Err(error) => {
                    warn!(schedule = %schedule, error = %error, "failed to list overdue events");
                    continue;
                }
            };
            for row in overdue {
                match self.provision(schedule, &row).await {
                    Ok(event_id) => {
                        report.provisioned = report.provisioned.saturating_add(1);
                        info!(schedule = %schedule, row = row.row_number, event_id = %event_id, "event provisioned");
                    }
                    Err(error) => {
                        report.provisioning_failed = report.provisioning_failed.saturating_add(1);
                        warn!(
                            schedule = %schedule,
                            row = row.row_number,
                            name = %row.name,
                            error = %format!("{error:#}"),
                            "provisioning failed, skipping"
                        );
                    }
                }
            }
        }

        for schedule in &schedules {
            let rows = match self
                .deps
                .schedules
                .list_events(schedule, EventFilter::Okay)
                .await
            {
                Ok(rows) => rows,
                Err(error) => {
                    warn!(schedule = %schedule, error = %error, "failed to list events for validation");
                    continue;
                }
            };
            for row in rows {
                if row.provisioned_event_id().is_none() {
                    continue;
                }
                report.scheduled_events = report.scheduled_events.saturating_add(1);
                match self.validate_row(&row).await {
                    Ok(outcome) => {
                        report.validated = report.validated.saturating_add(1);
                        if outcome.broadcast_updated {
                            report.broadcasts_updated = report.broadcasts_updated.saturating_add(1);
                        }
                        if outcome.start_time_corrected {
                            report.start_times_corrected =
                                report.start_times_corrected.saturating_add(1);
                        }
                    }
                    Err(error) => {
                        report.validation_failed = report.validation_failed.saturating_add(1);
                        warn!(
                            schedule = %schedule,
                            row = row.row_number,
                            error = %format!("{error:#}"),
                            "validation failed"
                        );
                    }
                }
            }
        }

        self.deps
            .status
            .report_scheduled_events_count(report.scheduled_events)
            .await
            .context("failed to report scheduled events count")?;
        match self.deps.platform.count_upcoming_broadcasts().await {
            Ok(count) => self
                .deps
                .status
                .report_upcoming_broadcasts_count(count)
                .await
                .context("failed to report upcoming broadcasts count")?,
            Err(error) => warn!(error = %error, "failed to count upcoming broadcasts"),
        }
        self.deps
            .status
            .report_validated_events(now)
            .await
            .context("failed to record validation time")?;
        Ok(report)
    }

    async fn provision(&self, schedule: &str, row: &ScheduleEvent) -> Result<String> {
        let broadcast = self
            .deps
            .platform
            .create_broadcast(BroadcastRequest {
                title: row.name.clone(),
                description: row.description.clone(),
                scheduled_start_time: row.scheduled_start_time,
                privacy: row.privacy,
                stream_id: row.stream_id.clone(),
                thumbnail: row.thumbnail.clone(),
            })
            .await
            .with_context(|| format!("failed to create broadcast for '{}'", row.name))?;
        let event_id = broadcast.broadcast_id;
        self.deps
            .schedules
            .set_event_id(schedule, row.row_number, &event_id)
            .await
            .with_context(|| format!("failed to record event id {event_id}"))?;
        if row.automated {
            self.deps
                .events
                .create_event(NewEvent {
                    event_id: event_id.clone(),
                    name: row.name.clone(),
                    stream_id: row.stream_id.clone(),
                    scheduled_start_time: row.scheduled_start_time,
                    template: row.template.clone(),
                })
                .await
                .with_context(|| format!("failed to create event record {event_id}"))?;
        }
        Ok(event_id)
    }

    async fn validate_row(&self, row: &ScheduleEvent) -> Result<ValidationOutcome> {
        let event_id = row
            .provisioned_event_id()
            .ok_or_else(|| anyhow!("row {} has no event id", row.row_number))?;
        let mut outcome = ValidationOutcome::default();
        let desired = BroadcastUpdate {
            title: row.name.clone(),
            description: row.description.clone(),
            scheduled_start_time: row.scheduled_start_time,
            privacy: row.privacy,
        };

        match self.deps.platform.get_broadcast(event_id).await {
            Ok(broadcast) if broadcast.differs_from(&desired) => {
                info!(event_id, "broadcast differs from schedule, updating");
                match self.deps.platform.update_broadcast(event_id, desired).await {
                    Ok(_) => outcome.broadcast_updated = true,
                    Err(error) => warn!(event_id, error = %error, "failed to update broadcast"),
                }
            }
            Ok(_) => {}
            Err(error) => warn!(event_id, error = %error, "failed to fetch broadcast"),
        }

        if row.automated {
            let stored = self
                .deps
                .events
                .get_event(event_id)
                .await
                .with_context(|| format!("could not find event record for {event_id}"))?;
            if stored.scheduled_start_time != row.scheduled_start_time {
                info!(
                    event_id,
                    stored = %stored.scheduled_start_time,
                    scheduled = %row.scheduled_start_time,
                    "scheduled start time drifted, updating event record"
                );
                self.deps
                    .events
                    .set_scheduled_start_time(event_id, row.scheduled_start_time)
                    .await
                    .with_context(|| format!("failed to update start time for {event_id}"))?;
                outcome.start_time_corrected = true;
            }
        }
        Ok(outcome)
    }

    /// Starts a runner for every imminent automated event, then drops
    /// concluded runners.
    pub async fn start_imminent_events(&self, now: DateTime<Utc>) -> Result<ImminentReport> {
        let schedules = self
            .deps
            .schedules
            .list_schedules()
            .await
            .context("failed to list schedules")?;
        let filter = EventFilter::ImminentAutomated {
            now,
            window: self.config.imminence_window,
        };
        let mut report = ImminentReport::default();

        for schedule in &schedules {
            let rows = match self.deps.schedules.list_events(schedule, filter).await {
                Ok(rows) => rows,
                Err(error) => {
                    warn!(schedule = %schedule, error = %error, "failed to list imminent events");
                    continue;
                }
            };
            for row in rows {
                report.considered = report.considered.saturating_add(1);
                let Some(descriptor) = EventDescriptor::from_schedule_row(&row) else {
                    report.unprovisioned = report.unprovisioned.saturating_add(1);
                    continue;
                };
                if self.registry.contains(&descriptor.event_id).await {
                    report.already_tracked = report.already_tracked.saturating_add(1);
                    continue;
                }
                let runner = Arc::new(EventRunner::new(
                    descriptor,
                    self.runner_deps(),
                    self.config.runner.clone(),
                )?);
                if !self.registry.insert_if_absent(runner.clone()).await {
                    report.already_tracked = report.already_tracked.saturating_add(1);
                    continue;
                }
                info!(event_id = %runner.event_id(), name = %runner.name(), "starting event");
                match runner.start().await {
                    Ok(()) => report.started.push(runner.event_id().to_string()),
                    Err(error) => {
                        report.start_failed = report.start_failed.saturating_add(1);
                        warn!(
                            event_id = %runner.event_id(),
                            error = %format!("{error:#}"),
                            "event runner failed to start"
                        );
                    }
                }
            }
        }

        report.removed = self
            .registry
            .remove_concluded(now, self.config.runner_grace)
            .await;
        for event_id in &report.removed {
            info!(event_id = %event_id, "cleaned up concluded event");
        }
        report.tracked = self.registry.len().await;
        self.deps
            .status
            .report_running_events_count(report.tracked)
            .await
            .context("failed to report running events count")?;
        self.deps
            .status
            .report_checked_for_imminent_events(now)
            .await
            .context("failed to record imminent events check")?;
        Ok(report)
    }

    /// Alerts on overdue jobs and force-stops overrunning events.
    pub async fn run_monitoring(&self, now: DateTime<Utc>) -> Result<MonitoringReport> {
        let mut report = MonitoringReport::default();

        match self.deps.status.get().await {
            Ok(status) => {
                for (job, last_run) in [
                    (JobKind::CreateAndValidate, status.last_validated_events),
                    (JobKind::ImminentEvents, status.last_checked_for_imminent_events),
                    (JobKind::Cleanup, status.last_ran_cleanup_task),
                ] {
                    let Some(reference) = last_run.or(status.app_started) else {
                        continue;
                    };
                    let Some(period) = self.job_schedule(job)?.period_after(reference) else {
                        continue;
                    };
                    let threshold = scale_duration(period, self.config.watchdog_tolerance);
                    if elapsed_exceeds(reference, now, threshold) {
                        warn!(job = %job, last_run = %reference, "scheduled job is overdue");
                        let notification = notifications::scheduled_task_missed(
                            job.as_str(),
                            &humanize_duration(period),
                            reference,
                        );
                        notify_best_effort(self.deps.notifier.as_ref(), &notification).await;
                        report.missed_jobs.push(job);
                    }
                }
            }
            Err(error) => warn!(error = %error, "failed to read status, skipping job watchdog"),
        }

        for runner in self.registry.snapshot().await {
            if !runner.is_running() || now <= runner.last_event_time() {
                continue;
            }
            warn!(
                event_id = %runner.event_id(),
                name = %runner.name(),
                due_to_finish = %runner.last_event_time(),
                "event overran, stopping now"
            );
            runner.stop_event(true);
            let snapshot = runner.snapshot();
            let notification = notifications::overrun(
                runner.name(),
                runner.last_event_time(),
                snapshot.as_ref(),
                now,
            );
            notify_best_effort(self.deps.notifier.as_ref(), &notification).await;
            report.overrun_events.push(runner.event_id().to_string());
        }

        self.deps
            .status
            .report_ran_monitoring_task(now)
            .await
            .context("failed to record monitoring run")?;
        Ok(report)
    }

    /// Deletes event records whose scheduled start is older than the
    /// retention window.
    pub async fn cleanup_event_records(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let event_ids = self
            .deps
            .events
            .get_events()
            .await
            .context("failed to list event records")?;
        let mut report = CleanupReport::default();

        for event_id in event_ids {
            report.examined = report.examined.saturating_add(1);
            match self.cleanup_one(&event_id, now).await {
                Ok(true) => report.deleted.push(event_id),
                Ok(false) => {}
                Err(error) => {
                    report.failed = report.failed.saturating_add(1);
                    warn!(event_id = %event_id, error = %format!("{error:#}"), "cleanup failed, skipping");
                }
            }
        }

        self.deps
            .status
            .report_ran_cleanup_task(now)
            .await
            .context("failed to record cleanup run")?;
        Ok(report)
    }

    async fn cleanup_one(&self, event_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let metadata = self
            .deps
            .events
            .get_metadata(event_id)
            .await
            .with_context(|| format!("failed to read metadata for {event_id}"))?;
        if !elapsed_exceeds(metadata.scheduled_start_time, now, self.config.retention) {
            return Ok(false);
        }
        info!(event_id, name = %metadata.name, "event record past retention, deleting");
        self.deps
            .events
            .delete_event(event_id)
            .await
            .with_context(|| format!("failed to delete {event_id}"))?;
        Ok(true)
    }

    /// Evaluates the monitoring and failure health checks.
    pub async fn health(&self, now: DateTime<Utc>) -> Result<HealthReport> {
        let status = self
            .deps
            .status
            .get()
            .await
            .context("failed to read status")?;
        let monitoring_reference = status.last_ran_monitoring_task.or(status.app_started);
        let checks = vec![
            recency_check(
                "monitoring_task",
                monitoring_reference,
                now,
                self.config.monitoring_health_window,
            ),
            quiet_period_check(
                "recent_unhandled_failure",
                self.sentinel.last_alert().await,
                now,
                self.config.failure_health_window,
            ),
        ];
        Ok(HealthReport::new(now, checks))
    }
}
