//! Event runner for onair live-stream automation.
//!
//! An [`EventRunner`] loads one event's step list, arms a timer for every step
//! whose trigger time is known, invokes the [`CommandExecutor`] when a timer
//! fires and stops the event on the first failure or once every step
//! succeeded.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod notifications;
mod notifier;
mod runner;

pub use notifier::{
    notify_best_effort, InMemoryNotifier, Notification, Notifier, TracingNotifier,
    WebhookNotifier,
};
pub use runner::{
    EventDescriptor, EventRunner, RunnerConfig, RunnerDeps, RunnerState, StepOutcome,
};

/// Executes a named step action.
///
/// Polling actions should stop early once `cancel` fires.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &str,
        parameter: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}
