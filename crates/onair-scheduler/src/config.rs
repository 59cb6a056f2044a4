use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use onair_runner::RunnerConfig;

pub const DEFAULT_CREATE_AND_VALIDATE_CRON: &str = "0 0 * * * *";
pub const DEFAULT_IMMINENT_EVENTS_CRON: &str = "0 */5 * * * *";
pub const DEFAULT_MONITORING_CRON: &str = "0 */10 * * * *";
pub const DEFAULT_CLEANUP_CRON: &str = "0 7 2 * * *";

/// The orchestrator's periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    CreateAndValidate,
    ImminentEvents,
    Monitoring,
    Cleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::CreateAndValidate,
        JobKind::ImminentEvents,
        JobKind::Monitoring,
        JobKind::Cleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateAndValidate => "create_and_validate_events",
            Self::ImminentEvents => "start_imminent_events",
            Self::Monitoring => "monitoring",
            Self::Cleanup => "cleanup_event_records",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed cron cadence evaluated in a fixed timezone.
#[derive(Debug, Clone)]
pub struct JobSchedule {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl JobSchedule {
    /// Parses a 6-field cron expression. 5-field expressions get a leading
    /// seconds field of `0`.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self> {
        let expression = expression.trim();
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };
        let schedule = Schedule::from_str(&normalized)
            .with_context(|| format!("invalid cron expression '{expression}'"))?;
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| anyhow!("invalid timezone '{timezone}'"))?;
        Ok(Self {
            expression: normalized,
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = from.with_timezone(&self.timezone);
        self.schedule
            .after(&from)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    /// Gap between the next two occurrences after `from`.
    pub fn period_after(&self, from: DateTime<Utc>) -> Option<Duration> {
        let from = from.with_timezone(&self.timezone);
        let mut upcoming = self.schedule.after(&from);
        let first = upcoming.next()?;
        let second = upcoming.next()?;
        Some(second.signed_duration_since(first))
    }
}

/// Orchestrator cadences, windows and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub create_and_validate_cron: String,
    pub imminent_events_cron: String,
    pub monitoring_cron: String,
    pub cleanup_cron: String,
    pub timezone: String,
    pub imminence_window: Duration,
    pub runner_grace: Duration,
    pub retention: Duration,
    pub watchdog_tolerance: f64,
    pub alert_cooldown: Duration,
    pub monitoring_health_window: Duration,
    pub failure_health_window: Duration,
    pub runner: RunnerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            create_and_validate_cron: DEFAULT_CREATE_AND_VALIDATE_CRON.to_string(),
            imminent_events_cron: DEFAULT_IMMINENT_EVENTS_CRON.to_string(),
            monitoring_cron: DEFAULT_MONITORING_CRON.to_string(),
            cleanup_cron: DEFAULT_CLEANUP_CRON.to_string(),
            timezone: "UTC".to_string(),
            imminence_window: Duration::minutes(10),
            runner_grace: Duration::milliseconds(630_000),
            retention: Duration::days(7),
            watchdog_tolerance: 1.1,
            alert_cooldown: Duration::minutes(10),
            monitoring_health_window: Duration::minutes(11),
            failure_health_window: Duration::minutes(10),
            runner: RunnerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        for job in JobKind::ALL {
            self.job_schedule(job)?;
        }
        for (name, value) in [
            ("imminence_window", self.imminence_window),
            ("runner_grace", self.runner_grace),
            ("retention", self.retention),
            ("monitoring_health_window", self.monitoring_health_window),
            ("failure_health_window", self.failure_health_window),
        ] {
            if value <= Duration::zero() {
                bail!("{name} must be greater than 0");
            }
        }
        if self.alert_cooldown < Duration::zero() {
            bail!("alert_cooldown must not be negative");
        }
        if !self.watchdog_tolerance.is_finite() || self.watchdog_tolerance < 1.0 {
            bail!("watchdog_tolerance must be finite and >= 1.0");
        }
        self.runner.validate()
    }

    pub fn cron_for(&self, job: JobKind) -> &str {
        match job {
            JobKind::CreateAndValidate => &self.create_and_validate_cron,
            JobKind::ImminentEvents => &self.imminent_events_cron,
            JobKind::Monitoring => &self.monitoring_cron,
            JobKind::Cleanup => &self.cleanup_cron,
        }
    }

    pub fn job_schedule(&self, job: JobKind) -> Result<JobSchedule> {
        JobSchedule::parse(self.cron_for(job), &self.timezone)
            .with_context(|| format!("invalid schedule for job {job}"))
    }
}
