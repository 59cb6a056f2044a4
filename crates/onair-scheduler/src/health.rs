use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Outcome of one named health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

impl HealthCheck {
    pub fn new(name: impl Into<String>, healthy: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy,
            detail: detail.into(),
        }
    }
}

/// Aggregate served by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn new(checked_at: DateTime<Utc>, checks: Vec<HealthCheck>) -> Self {
        Self {
            healthy: checks.iter().all(|check| check.healthy),
            checked_at,
            checks,
        }
    }
}

/// Healthy while `last` lies within `window` of `now`.
pub fn recency_check(
    name: &str,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> HealthCheck {
    match last {
        Some(last) if now.signed_duration_since(last) < window => {
            HealthCheck::new(name, true, format!("last success at {}", last.to_rfc3339()))
        }
        Some(last) => HealthCheck::new(name, false, format!("stale since {}", last.to_rfc3339())),
        None => HealthCheck::new(name, false, "never succeeded"),
    }
}

/// Healthy unless a failure alert went out within `window` of `now`.
pub fn quiet_period_check(
    name: &str,
    last_alert: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> HealthCheck {
    match last_alert {
        Some(last) if now.signed_duration_since(last) <= window => HealthCheck::new(
            name,
            false,
            format!("failure alerted at {}", last.to_rfc3339()),
        ),
        _ => HealthCheck::new(name, true, "no recent failures"),
    }
}
