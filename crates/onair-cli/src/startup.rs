use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use onair_actions::ActionRegistry;
use onair_runner::{Notifier, TracingNotifier, WebhookNotifier};
use onair_scheduler::{Orchestrator, OrchestratorDeps};
use onair_store::{
    InMemoryBroadcastPlatform, JsonEventStore, JsonScheduleSource, JsonStatusReporter,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::cli_args::Cli;
use crate::health_server::build_health_router;

/// Wires the JSON-directory stores, action registry and notifier into an
/// orchestrator.
pub(crate) fn build_orchestrator(cli: &Cli) -> Result<Arc<Orchestrator>> {
    std::fs::create_dir_all(&cli.data_dir).with_context(|| {
        format!(
            "failed to create data directory '{}'",
            cli.data_dir.display()
        )
    })?;
    let config = cli.orchestrator_config()?;
    let settings = cli.action_settings()?;

    let platform = Arc::new(InMemoryBroadcastPlatform::new());
    let notifier: Arc<dyn Notifier> = match cli.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url, cli.request_timeout())?),
        _ => Arc::new(TracingNotifier),
    };
    let executor = ActionRegistry::standard(&settings, platform.clone())?;
    info!(actions = ?executor.names(), "registered step actions");

    let deps = OrchestratorDeps {
        events: Arc::new(JsonEventStore::new(&cli.data_dir)),
        schedules: Arc::new(JsonScheduleSource::new(&cli.data_dir)),
        status: Arc::new(JsonStatusReporter::new(&cli.data_dir)),
        platform,
        executor: Arc::new(executor),
        notifier,
    };
    Ok(Arc::new(Orchestrator::new(deps, config)?))
}

/// Runs the orchestrator and health endpoint until ctrl-c.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let bind_addr: SocketAddr = cli.health_bind.parse().with_context(|| {
        format!(
            "invalid --health-bind '{}': expected host:port",
            cli.health_bind
        )
    })?;
    let orchestrator = build_orchestrator(&cli)?;
    orchestrator.report_app_started(Utc::now()).await?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve health endpoint address")?;
    let handle = onair_scheduler::spawn(orchestrator.clone())?;
    info!(
        addr = %local_addr,
        data_dir = %cli.data_dir.display(),
        timezone = %cli.timezone,
        "onair started"
    );

    let served = axum::serve(listener, build_health_router(orchestrator))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("health endpoint exited unexpectedly");

    info!("shutting down");
    handle.shutdown().await;
    served
}
