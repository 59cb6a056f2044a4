use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ActionError;

/// Attempt budget for polling actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    /// Budget used while waiting on the PA desk, which can sit idle for hours.
    pub fn pa_default() -> Self {
        Self {
            max_attempts: 7_200,
            interval: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be greater than 0");
        }
        if self.interval.is_zero() {
            bail!("poll interval must be greater than 0");
        }
        Ok(())
    }
}

/// Calls `probe` until it yields a message, the budget runs out or `cancel`
/// fires. Probe errors count as a failed attempt.
pub async fn poll_until<F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<String, ActionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>, ActionError>>,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        match probe().await {
            Ok(Some(message)) => return Ok(message),
            Ok(None) => {}
            Err(error) => debug!(attempt, error = %error, "poll attempt failed, retrying"),
        }
        if attempt == policy.max_attempts {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ActionError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
    Err(ActionError::Timeout)
}
