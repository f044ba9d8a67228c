use std::sync::Arc;

use cash_ledger::{PrintQueue, SessionStore};
use chrono::Duration;
use log::*;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

/// What the maintenance worker cleans up, and how often.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceSchedule {
    pub interval: std::time::Duration,
    pub session_retention: Duration,
    pub print_job_timeout: Duration,
}

impl MaintenanceSchedule {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            interval: config.sweep_interval,
            session_retention: config.session_retention,
            print_job_timeout: config.print_job_timeout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub evicted_sessions: usize,
    pub requeued_jobs: Vec<String>,
    pub purged_jobs: usize,
}

/// Starts the maintenance worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_maintenance_worker(
    store: Arc<SessionStore>,
    queue: Arc<PrintQueue>,
    schedule: MaintenanceSchedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(schedule.interval);
        info!("🕰️ Maintenance worker started. Running every {}s", schedule.interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running maintenance pass");
            let report = run_maintenance_pass(&store, &queue, &schedule).await;
            if report.evicted_sessions > 0 || report.purged_jobs > 0 {
                info!(
                    "🕰️ {} finished sessions evicted, {} finished print jobs purged",
                    report.evicted_sessions, report.purged_jobs
                );
            }
        }
    })
}

/// Evicts finished sessions past their retention, puts unacknowledged print jobs back in the queue and drops finished
/// print jobs that are older than the session retention.
pub async fn run_maintenance_pass(
    store: &SessionStore,
    queue: &PrintQueue,
    schedule: &MaintenanceSchedule,
) -> MaintenanceReport {
    let evicted = store.evict_finished(schedule.session_retention).await;
    if !evicted.is_empty() {
        debug!("🕰️ Evicted sessions: {}", evicted.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", "));
    }
    let requeued_jobs = queue.requeue_stale(schedule.print_job_timeout).await;
    if !requeued_jobs.is_empty() {
        warn!(
            "🕰️ {} print jobs were not acknowledged within {}s: {}",
            requeued_jobs.len(),
            schedule.print_job_timeout.num_seconds(),
            requeued_jobs.join(", ")
        );
    }
    let purged_jobs = queue.purge_finished(schedule.session_retention).await;
    MaintenanceReport { evicted_sessions: evicted.len(), requeued_jobs, purged_jobs }
}
