use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use clap::Parser;
use onair_actions::{ActionSettings, CameraDirectory, PollPolicy};
use onair_runner::RunnerConfig;
use onair_scheduler::{
    OrchestratorConfig, DEFAULT_CLEANUP_CRON, DEFAULT_CREATE_AND_VALIDATE_CRON,
    DEFAULT_IMMINENT_EVENTS_CRON, DEFAULT_MONITORING_CRON,
};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_tolerance(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || parsed < 1.0 {
        return Err("value must be a finite number of at least 1.0".to_string());
    }
    Ok(parsed)
}

fn millis(value: u64) -> Duration {
    Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "onair",
    about = "Runs scheduled live-stream events step by step",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "data-dir",
        env = "ONAIR_DATA_DIR",
        default_value = ".onair",
        help = "Directory holding event records, templates, schedules and status.json"
    )]
    pub(crate) data_dir: PathBuf,

    #[arg(
        long = "health-bind",
        env = "ONAIR_HEALTH_BIND",
        default_value = "127.0.0.1:8790",
        help = "Socket address for the /healthcheck endpoint (host:port)"
    )]
    pub(crate) health_bind: String,

    #[arg(
        long = "tick-interval-ms",
        env = "ONAIR_TICK_INTERVAL_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "How often each event runner re-evaluates its steps"
    )]
    pub(crate) tick_interval_ms: u64,

    #[arg(
        long = "imminence-window-ms",
        env = "ONAIR_IMMINENCE_WINDOW_MS",
        default_value_t = 600_000,
        value_parser = parse_positive_u64,
        help = "Start runners for automated events whose first step lies within this window"
    )]
    pub(crate) imminence_window_ms: u64,

    #[arg(
        long = "runner-grace-ms",
        env = "ONAIR_RUNNER_GRACE_MS",
        default_value_t = 630_000,
        value_parser = parse_positive_u64,
        help = "How long a stopped runner stays tracked after its first event time"
    )]
    pub(crate) runner_grace_ms: u64,

    #[arg(
        long = "retention-ms",
        env = "ONAIR_RETENTION_MS",
        default_value_t = 604_800_000,
        value_parser = parse_positive_u64,
        help = "Delete event records scheduled longer ago than this"
    )]
    pub(crate) retention_ms: u64,

    #[arg(
        long = "watchdog-tolerance",
        env = "ONAIR_WATCHDOG_TOLERANCE",
        default_value_t = 1.1,
        value_parser = parse_tolerance,
        help = "Multiple of a job's cadence after which it counts as missed"
    )]
    pub(crate) watchdog_tolerance: f64,

    #[arg(
        long = "alert-cooldown-ms",
        env = "ONAIR_ALERT_COOLDOWN_MS",
        default_value_t = 600_000,
        help = "Minimum gap between job failure alerts"
    )]
    pub(crate) alert_cooldown_ms: u64,

    #[arg(
        long = "timezone",
        env = "ONAIR_TIMEZONE",
        default_value = "UTC",
        help = "IANA timezone the cron cadences are evaluated in"
    )]
    pub(crate) timezone: String,

    #[arg(
        long = "create-and-validate-cron",
        env = "ONAIR_CREATE_AND_VALIDATE_CRON",
        default_value = DEFAULT_CREATE_AND_VALIDATE_CRON
    )]
    pub(crate) create_and_validate_cron: String,

    #[arg(
        long = "imminent-events-cron",
        env = "ONAIR_IMMINENT_EVENTS_CRON",
        default_value = DEFAULT_IMMINENT_EVENTS_CRON
    )]
    pub(crate) imminent_events_cron: String,

    #[arg(
        long = "monitoring-cron",
        env = "ONAIR_MONITORING_CRON",
        default_value = DEFAULT_MONITORING_CRON
    )]
    pub(crate) monitoring_cron: String,

    #[arg(
        long = "cleanup-cron",
        env = "ONAIR_CLEANUP_CRON",
        default_value = DEFAULT_CLEANUP_CRON
    )]
    pub(crate) cleanup_cron: String,

    #[arg(
        long = "pa-status-url",
        env = "ONAIR_PA_STATUS_URL",
        help = "URL returning {\"pa\":\"on\"|\"off\"}; enables the PA wait actions"
    )]
    pub(crate) pa_status_url: Option<String>,

    #[arg(
        long = "pa-poll-attempts",
        env = "ONAIR_PA_POLL_ATTEMPTS",
        default_value_t = 7_200,
        value_parser = parse_positive_u32
    )]
    pub(crate) pa_poll_attempts: u32,

    #[arg(
        long = "pa-poll-interval-ms",
        env = "ONAIR_PA_POLL_INTERVAL_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) pa_poll_interval_ms: u64,

    #[arg(
        long = "platform-poll-attempts",
        env = "ONAIR_PLATFORM_POLL_ATTEMPTS",
        default_value_t = 60,
        value_parser = parse_positive_u32
    )]
    pub(crate) platform_poll_attempts: u32,

    #[arg(
        long = "platform-poll-interval-ms",
        env = "ONAIR_PLATFORM_POLL_INTERVAL_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) platform_poll_interval_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "ONAIR_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for camera, PA and webhook HTTP requests"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "webhook-url",
        env = "ONAIR_WEBHOOK_URL",
        help = "POST alerts as {\"subject\",\"body\"} JSON here instead of only logging them"
    )]
    pub(crate) webhook_url: Option<String>,

    #[arg(
        long = "cameras-file",
        env = "ONAIR_CAMERAS_FILE",
        help = "TOML file mapping camera names to hostnames under [cameras]"
    )]
    pub(crate) cameras_file: Option<PathBuf>,
}

impl Cli {
    pub(crate) fn request_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.request_timeout_ms)
    }

    pub(crate) fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let config = OrchestratorConfig {
            create_and_validate_cron: self.create_and_validate_cron.clone(),
            imminent_events_cron: self.imminent_events_cron.clone(),
            monitoring_cron: self.monitoring_cron.clone(),
            cleanup_cron: self.cleanup_cron.clone(),
            timezone: self.timezone.clone(),
            imminence_window: millis(self.imminence_window_ms),
            runner_grace: millis(self.runner_grace_ms),
            retention: millis(self.retention_ms),
            watchdog_tolerance: self.watchdog_tolerance,
            alert_cooldown: millis(self.alert_cooldown_ms),
            runner: RunnerConfig {
                tick_interval: StdDuration::from_millis(self.tick_interval_ms),
            },
            ..OrchestratorConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn action_settings(&self) -> Result<ActionSettings> {
        let cameras = match &self.cameras_file {
            Some(path) => CameraDirectory::load(path)?,
            None => CameraDirectory::default(),
        };
        let settings = ActionSettings {
            cameras,
            pa_status_url: self
                .pa_status_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            pa_poll: PollPolicy {
                max_attempts: self.pa_poll_attempts,
                interval: StdDuration::from_millis(self.pa_poll_interval_ms),
            },
            platform_poll: PollPolicy {
                max_attempts: self.platform_poll_attempts,
                interval: StdDuration::from_millis(self.platform_poll_interval_ms),
            },
            request_timeout: self.request_timeout(),
        };
        settings.pa_poll.validate()?;
        settings.platform_poll.validate()?;
        Ok(settings)
    }
}
