//! FIFO of receipts waiting for the edge printer.
//!
//! The edge cannot be reached from the cloud, so receipts wait here until the edge's delivery poller asks for the next
//! one. Delivery is at-least-once: a job is handed out as `Dispatched`, and goes back to `Queued` if the poller reports
//! a failure or never reports back at all (see [`PrintQueue::requeue_stale`]).
//!
//! Finished jobs are kept as tombstones so that acknowledgements stay idempotent, until
//! [`PrintQueue::purge_finished`] removes them.
use std::collections::{HashMap, VecDeque};

use chrono::{Duration, Utc};
use kiosk_common::OrderId;
use log::*;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    errors::LedgerError,
    ledger_types::{PrintJob, PrintJobState},
};

pub const DEFAULT_MAX_PRINT_ATTEMPTS: u32 = 3;

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, PrintJob>,
    // Ids of jobs waiting for a poller, oldest first. May hold ids whose job has since changed state; those are skipped.
    pending: VecDeque<String>,
    next_seq: u64,
}

pub struct PrintQueue {
    state: Mutex<QueueState>,
    max_attempts: u32,
}

impl Default for PrintQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PRINT_ATTEMPTS)
    }
}

impl PrintQueue {
    /// `max_attempts` is the number of dispatches after which a failing job is given up on. It is at least 1.
    pub fn new(max_attempts: u32) -> Self {
        Self { state: Mutex::new(QueueState::default()), max_attempts: max_attempts.max(1) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Appends a receipt to the queue and returns its job id, e.g. `PJ-20240301123000-0007-3fa2`.
    pub async fn enqueue(&self, order_id: OrderId, receipt_payload: Value) -> String {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let now = Utc::now();
        let job_id =
            format!("PJ-{}-{:04}-{:04x}", now.format("%Y%m%d%H%M%S"), state.next_seq, rand::random::<u16>());
        let job = PrintJob {
            job_id: job_id.clone(),
            order_id,
            receipt_payload,
            state: PrintJobState::Queued,
            queued_at: now,
            dispatched_at: None,
            finished_at: None,
            attempts: 0,
            last_error: None,
        };
        info!("🖨️ Print job {job_id} queued for order {}", job.order_id);
        state.jobs.insert(job_id.clone(), job);
        state.pending.push_back(job_id.clone());
        job_id
    }

    /// Hands the oldest queued job to the caller and marks it `Dispatched`. `None` means there is nothing to print.
    pub async fn dequeue_next(&self) -> Option<PrintJob> {
        let mut state = self.state.lock().await;
        while let Some(job_id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.state != PrintJobState::Queued {
                trace!("🖨️ Skipping {job_id}, which is already {}", job.state);
                continue;
            }
            job.state = PrintJobState::Dispatched;
            job.dispatched_at = Some(Utc::now());
            job.attempts += 1;
            debug!("🖨️ Dispatching print job {job_id} (attempt {})", job.attempts);
            return Some(job.clone());
        }
        None
    }

    /// Records a successful print. Calling this again for the same job is harmless.
    pub async fn mark_completed(&self, job_id: &str) -> Result<PrintJob, LedgerError> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(job_id).ok_or_else(|| LedgerError::JobNotFound(job_id.to_string()))?;
        match job.state {
            PrintJobState::Completed => {
                debug!("🖨️ Print job {job_id} was already completed");
            },
            previous => {
                if previous == PrintJobState::Failed {
                    warn!("🖨️ Print job {job_id} had been given up on, but the printer reports it as printed");
                }
                job.state = PrintJobState::Completed;
                job.finished_at = Some(Utc::now());
                info!("🖨️ Print job {job_id} for order {} completed", job.order_id);
            },
        }
        Ok(job.clone())
    }

    /// Records a failed print. The job is queued again at the back of the line, unless it has used up its attempts, in
    /// which case it becomes `Failed`.
    ///
    /// `attempt` is the dispatch the failure belongs to. A report for an earlier dispatch than the latest one arrives
    /// after the job was swept back and handed out again, and is ignored. `None` applies the failure to the latest
    /// dispatch.
    pub async fn mark_failed(&self, job_id: &str, reason: &str, attempt: Option<u32>) -> Result<PrintJob, LedgerError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let job = state.jobs.get_mut(job_id).ok_or_else(|| LedgerError::JobNotFound(job_id.to_string()))?;
        if let Some(attempt) = attempt.filter(|a| *a != job.attempts) {
            debug!(
                "🖨️ Ignoring failure of attempt {attempt} for {job_id}, which is on attempt {} and {}: {reason}",
                job.attempts, job.state
            );
            return Ok(job.clone());
        }
        warn!("🖨️ Print job {job_id} for order {} failed: {reason}", job.order_id);
        match job.state {
            PrintJobState::Completed | PrintJobState::Failed => {
                debug!("🖨️ Ignoring failure report for {job_id}, which is already {}", job.state);
            },
            PrintJobState::Queued => {
                // Already swept back into the queue; just keep the diagnostics.
                job.last_error = Some(reason.to_string());
            },
            PrintJobState::Dispatched => {
                job.last_error = Some(reason.to_string());
                if job.attempts >= self.max_attempts {
                    job.state = PrintJobState::Failed;
                    job.finished_at = Some(Utc::now());
                    error!(
                        "🖨️ Giving up on print job {job_id} for order {} after {} attempts",
                        job.order_id, job.attempts
                    );
                } else {
                    job.state = PrintJobState::Queued;
                    state.pending.push_back(job_id.to_string());
                    info!("🖨️ Print job {job_id} requeued ({}/{} attempts used)", job.attempts, self.max_attempts);
                }
            },
        }
        Ok(job.clone())
    }

    /// Puts jobs that have been `Dispatched` for longer than `timeout` back at the front of the queue, oldest first.
    /// Jobs that have used up their attempts become `Failed` instead. Returns the ids that were requeued.
    pub async fn requeue_stale(&self, timeout: Duration) -> Vec<String> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let cutoff = Utc::now() - timeout;
        let mut stale = state
            .jobs
            .values_mut()
            .filter(|j| j.state == PrintJobState::Dispatched && j.dispatched_at.map(|t| t < cutoff).unwrap_or(true))
            .collect::<Vec<_>>();
        stale.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        let mut requeued = Vec::new();
        for job in stale {
            if job.attempts >= self.max_attempts {
                job.state = PrintJobState::Failed;
                job.finished_at = Some(Utc::now());
                job.last_error = Some("No completion report before the dispatch timeout".to_string());
                error!("🖨️ Print job {} timed out on its final attempt. Giving up.", job.job_id);
                continue;
            }
            warn!("🖨️ Print job {} was dispatched at {:?} and never reported back. Requeuing.", job.job_id, job.dispatched_at);
            job.state = PrintJobState::Queued;
            state.pending.push_front(job.job_id.clone());
            requeued.push(job.job_id.clone());
        }
        requeued.reverse();
        requeued
    }

    /// Drops `Completed` and `Failed` jobs that finished more than `older_than` ago. Returns how many were removed.
    pub async fn purge_finished(&self, older_than: Duration) -> usize {
        let mut state = self.state.lock().await;
        let cutoff = Utc::now() - older_than;
        let before = state.jobs.len();
        state.jobs.retain(|_, j| !(j.state.is_finished() && j.finished_at.map(|t| t < cutoff).unwrap_or(false)));
        before - state.jobs.len()
    }

    pub async fn job(&self, job_id: &str) -> Option<PrintJob> {
        self.state.lock().await.jobs.get(job_id).cloned()
    }

    /// All known jobs, oldest first.
    pub async fn jobs(&self) -> Vec<PrintJob> {
        let state = self.state.lock().await;
        let mut jobs = state.jobs.values().cloned().collect::<Vec<_>>();
        jobs.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.job_id.cmp(&b.job_id)));
        jobs
    }

    pub async fn jobs_for_order(&self, order_id: &OrderId) -> Vec<PrintJob> {
        self.jobs().await.into_iter().filter(|j| &j.order_id == order_id).collect()
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.jobs.values().filter(|j| j.state == PrintJobState::Queued).count()
    }
}
