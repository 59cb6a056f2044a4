use std::sync::Arc;

use async_trait::async_trait;
use onair_store::{BroadcastPlatform, BroadcastStatus, BroadcastTransition, StreamStatus};
use tokio_util::sync::CancellationToken;

use crate::poll::{poll_until, PollPolicy};
use crate::{required_parameter, Action, ActionError};

/// Moves the broadcast named by the parameter to a new lifecycle state.
pub struct TransitionBroadcastAction {
    platform: Arc<dyn BroadcastPlatform>,
    transition: BroadcastTransition,
}

impl TransitionBroadcastAction {
    pub fn new(platform: Arc<dyn BroadcastPlatform>, transition: BroadcastTransition) -> Self {
        Self {
            platform,
            transition,
        }
    }
}

#[async_trait]
impl Action for TransitionBroadcastAction {
    async fn run(&self, parameter: &str, _cancel: &CancellationToken) -> Result<String, ActionError> {
        let broadcast_id = required_parameter(parameter, "broadcast id")?;
        let broadcast = self
            .platform
            .transition_broadcast(broadcast_id, self.transition)
            .await?;
        Ok(format!(
            "Broadcast {} is now {}",
            broadcast.broadcast_id,
            self.transition.as_str()
        ))
    }
}

/// Waits until the broadcast reports the testing state.
pub struct WaitForBroadcastTestingAction {
    platform: Arc<dyn BroadcastPlatform>,
    policy: PollPolicy,
}

impl WaitForBroadcastTestingAction {
    pub fn new(platform: Arc<dyn BroadcastPlatform>, policy: PollPolicy) -> Self {
        Self { platform, policy }
    }
}

#[async_trait]
impl Action for WaitForBroadcastTestingAction {
    async fn run(&self, parameter: &str, cancel: &CancellationToken) -> Result<String, ActionError> {
        let broadcast_id = required_parameter(parameter, "broadcast id")?;
        poll_until(self.policy, cancel, || async move {
            let broadcast = self.platform.get_broadcast(broadcast_id).await?;
            Ok((broadcast.status == BroadcastStatus::Testing)
                .then(|| "Broadcast is now testing".to_string()))
        })
        .await
    }
}

/// Waits until the ingest stream named by the parameter is active.
pub struct WaitForStreamActiveAction {
    platform: Arc<dyn BroadcastPlatform>,
    policy: PollPolicy,
}

impl WaitForStreamActiveAction {
    pub fn new(platform: Arc<dyn BroadcastPlatform>, policy: PollPolicy) -> Self {
        Self { platform, policy }
    }
}

#[async_trait]
impl Action for WaitForStreamActiveAction {
    async fn run(&self, parameter: &str, cancel: &CancellationToken) -> Result<String, ActionError> {
        let stream_id = required_parameter(parameter, "stream id")?;
        poll_until(self.policy, cancel, || async move {
            let status = self.platform.stream_status(stream_id).await?;
            Ok((status == StreamStatus::Active).then(|| format!("Stream {stream_id} is now active")))
        })
        .await
    }
}
