use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use onair_core::delay_until;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{JobKind, JobSchedule};
use crate::orchestrator::Orchestrator;

/// Handle to the running job loops.
pub struct OrchestratorHandle {
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Stops the job loops, waits for in-flight cycles, then stops every
    /// tracked runner without ending its broadcast.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.loops {
            if let Err(error) = handle.await {
                warn!(error = %error, "job loop ended abnormally");
            }
        }
        let runners = self.orchestrator.registry().snapshot().await;
        for runner in &runners {
            runner.stop_event(false);
        }
        info!(runners = runners.len(), "orchestrator stopped");
    }
}

/// Spawns one cron-driven loop per job.
pub fn spawn(orchestrator: Arc<Orchestrator>) -> Result<OrchestratorHandle> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = Vec::with_capacity(JobKind::ALL.len());
    for job in JobKind::ALL {
        let schedule = orchestrator.job_schedule(job)?.clone();
        info!(job = %job, cron = schedule.expression(), "scheduling job");
        loops.push(tokio::spawn(run_job_loop(
            orchestrator.clone(),
            job,
            schedule,
            shutdown_rx.clone(),
        )));
    }
    Ok(OrchestratorHandle {
        orchestrator,
        shutdown_tx,
        loops,
    })
}

async fn run_job_loop(
    orchestrator: Arc<Orchestrator>,
    job: JobKind,
    schedule: JobSchedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(job = %job, "cron expression has no upcoming occurrence");
            break;
        };
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay_until(next, now)) => {
                orchestrator.run_job_guarded(job, Utc::now()).await;
            }
        }
    }
}
