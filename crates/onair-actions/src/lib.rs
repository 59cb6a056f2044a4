//! Step actions for onair event automation.
//!
//! [`ActionRegistry`] maps run-sheet action names to [`Action`]s and serves as
//! the runner's command executor. Unknown action names succeed with a
//! "not implemented" message so a run sheet can carry steps this deployment
//! does not support.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use onair_runner::CommandExecutor;
use onair_store::{BroadcastPlatform, BroadcastTransition, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod broadcast;
mod camera;
mod pa;
mod poll;

pub use broadcast::{
    TransitionBroadcastAction, WaitForBroadcastTestingAction, WaitForStreamActiveAction,
};
pub use camera::{CameraAction, CameraDirectory, CameraPower};
pub use pa::WaitForPaAction;
pub use poll::{poll_until, PollPolicy};

pub const ACTION_WAIT_FOR_PA_ON: &str = "Wait for PA on";
pub const ACTION_WAIT_FOR_PA_OFF: &str = "Wait for PA off";
pub const ACTION_WAIT_FOR_LIVESTREAM_READY: &str = "Wait for LiveStream ready";
pub const ACTION_CAMERA_ON: &str = "Camera on";
pub const ACTION_CAMERA_OFF: &str = "Camera off";
pub const ACTION_START_LIVEBROADCAST: &str = "Start LiveBroadcast";
pub const ACTION_PREVIEW_LIVEBROADCAST: &str = "Preview LiveBroadcast";
pub const ACTION_WAIT_FOR_LIVEBROADCAST_READY: &str = "Wait for LiveBroadcast ready";
pub const ACTION_STOP_LIVEBROADCAST: &str = "Stop LiveBroadcast";

/// Errors raised by step actions.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Camera {0} not recognised")]
    UnknownCamera(String),
    #[error("{target} responded with status {status}")]
    Rejected { target: String, status: u16 },
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),
    #[error("Timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Platform(#[from] StoreError),
}

pub(crate) fn required_parameter<'a>(
    parameter: &'a str,
    name: &'static str,
) -> Result<&'a str, ActionError> {
    let value = parameter.trim();
    if value.is_empty() {
        return Err(ActionError::MissingParameter(name));
    }
    Ok(value)
}

/// One named step action.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, parameter: &str, cancel: &CancellationToken) -> Result<String, ActionError>;
}

/// Settings for the built-in actions.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub cameras: CameraDirectory,
    pub pa_status_url: Option<String>,
    pub pa_poll: PollPolicy,
    pub platform_poll: PollPolicy,
    pub request_timeout: Duration,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            cameras: CameraDirectory::default(),
            pa_status_url: None,
            pa_poll: PollPolicy::pa_default(),
            platform_poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Name-to-action table implementing [`CommandExecutor`].
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry with every built-in action. PA waits are only
    /// registered when a status URL is configured.
    pub fn standard(
        settings: &ActionSettings,
        platform: Arc<dyn BroadcastPlatform>,
    ) -> anyhow::Result<Self> {
        settings.platform_poll.validate()?;
        let mut registry = Self::new();
        registry.register(
            ACTION_CAMERA_ON,
            CameraAction::new(
                settings.cameras.clone(),
                CameraPower::On,
                settings.request_timeout,
            )?,
        );
        registry.register(
            ACTION_CAMERA_OFF,
            CameraAction::new(
                settings.cameras.clone(),
                CameraPower::Off,
                settings.request_timeout,
            )?,
        );
        if let Some(url) = settings.pa_status_url.as_deref() {
            registry.register(
                ACTION_WAIT_FOR_PA_ON,
                WaitForPaAction::new(url, true, settings.pa_poll, settings.request_timeout)?,
            );
            registry.register(
                ACTION_WAIT_FOR_PA_OFF,
                WaitForPaAction::new(url, false, settings.pa_poll, settings.request_timeout)?,
            );
        }
        registry.register(
            ACTION_PREVIEW_LIVEBROADCAST,
            TransitionBroadcastAction::new(platform.clone(), BroadcastTransition::Testing),
        );
        registry.register(
            ACTION_START_LIVEBROADCAST,
            TransitionBroadcastAction::new(platform.clone(), BroadcastTransition::Live),
        );
        registry.register(
            ACTION_STOP_LIVEBROADCAST,
            TransitionBroadcastAction::new(platform.clone(), BroadcastTransition::Complete),
        );
        registry.register(
            ACTION_WAIT_FOR_LIVEBROADCAST_READY,
            WaitForBroadcastTestingAction::new(platform.clone(), settings.platform_poll),
        );
        registry.register(
            ACTION_WAIT_FOR_LIVESTREAM_READY,
            WaitForStreamActiveAction::new(platform, settings.platform_poll),
        );
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(name.into(), Arc::new(action));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl CommandExecutor for ActionRegistry {
    async fn execute(
        &self,
        action: &str,
        parameter: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        let Some(handler) = self.actions.get(action) else {
            warn!(action, "action not implemented");
            return Ok(format!("Command {action} not implemented"));
        };
        info!(action, parameter, "running action");
        handler
            .run(parameter, cancel)
            .await
            .map_err(|error| anyhow::anyhow!("{action} ({parameter}) failed: {error}"))
    }
}

#[cfg(test)]
mod tests;
