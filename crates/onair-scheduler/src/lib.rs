//! Periodic orchestration for onair.
//!
//! The [`Orchestrator`] provisions broadcasts for upcoming schedule rows,
//! keeps them in sync with the schedule, starts an event runner for every
//! imminent automated event, watches for overdue jobs and overrunning events
//! and prunes old event records. [`spawn`] drives each job from its own cron
//! expression.

mod config;
mod health;
mod orchestrator;
mod registry;
mod runtime;
mod sentinel;

pub use config::{
    JobKind, JobSchedule, OrchestratorConfig, DEFAULT_CLEANUP_CRON,
    DEFAULT_CREATE_AND_VALIDATE_CRON, DEFAULT_IMMINENT_EVENTS_CRON, DEFAULT_MONITORING_CRON,
};
pub use health::{quiet_period_check, recency_check, HealthCheck, HealthReport};
pub use orchestrator::{
    CleanupReport, ImminentReport, MonitoringReport, Orchestrator, OrchestratorDeps,
    ProvisioningReport,
};
pub use registry::RunnerRegistry;
pub use runtime::{spawn, OrchestratorHandle};
pub use sentinel::FailureSentinel;

#[cfg(test)]
mod tests;
