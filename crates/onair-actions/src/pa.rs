use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::poll::{poll_until, PollPolicy};
use crate::{Action, ActionError};

#[derive(Debug, Deserialize)]
struct PaStatusPayload {
    pa: String,
}

/// Waits until the PA status endpoint reports the wanted state.
#[derive(Debug, Clone)]
pub struct WaitForPaAction {
    http: reqwest::Client,
    status_url: String,
    wanted: &'static str,
    policy: PollPolicy,
}

impl WaitForPaAction {
    pub fn new(
        status_url: impl Into<String>,
        wanted_on: bool,
        policy: PollPolicy,
        request_timeout: Duration,
    ) -> Result<Self> {
        policy.validate()?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .context("failed to create pa status client")?;
        Ok(Self {
            http,
            status_url: status_url.into(),
            wanted: if wanted_on { "on" } else { "off" },
            policy,
        })
    }

    async fn current_state(&self) -> Result<String, ActionError> {
        let response = self.http.get(&self.status_url).send().await?;
        if !response.status().is_success() {
            return Err(ActionError::Rejected {
                target: "pa status".to_string(),
                status: response.status().as_u16(),
            });
        }
        let payload: PaStatusPayload = response.json().await?;
        Ok(payload.pa)
    }
}

#[async_trait]
impl Action for WaitForPaAction {
    async fn run(&self, _parameter: &str, cancel: &CancellationToken) -> Result<String, ActionError> {
        poll_until(self.policy, cancel, || async move {
            let state = self.current_state().await?;
            Ok(state
                .eq_ignore_ascii_case(self.wanted)
                .then(|| format!("PA is now {}", self.wanted)))
        })
        .await
    }
}
