//! Pulls receipts from the cloud's print queue and prints them.
use std::{sync::Arc, time::Duration};

use log::*;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{cloud_client::CloudApi, errors::CloudError, printer::ReceiptPrinter, receipt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Idle,
    Printed { job_id: String },
    Failed { job_id: String, reason: String },
}

pub struct PrintPoller<C, P> {
    cloud: Arc<C>,
    printer: P,
    interval: Duration,
}

impl<C: CloudApi, P: ReceiptPrinter> PrintPoller<C, P> {
    pub fn new(cloud: Arc<C>, printer: P, interval: Duration) -> Self {
        Self { cloud, printer, interval }
    }

    /// Fetches and prints at most one job. The outcome is reported back to the cloud.
    pub async fn poll_once(&self) -> Result<PrintOutcome, CloudError> {
        let Some(job) = self.cloud.next_print_job().await? else {
            trace!("🖨️ No receipts to print");
            return Ok(PrintOutcome::Idle);
        };
        info!("🖨️ Printing receipt for order {} ({})", job.order_id, job.job_id);
        let lines = receipt::layout(&job.receipt_payload);
        match self.printer.print(&lines).await {
            Ok(()) => {
                info!("🖨️ Printed {} on the {}", job.job_id, self.printer.describe());
                if let Err(e) = self.cloud.complete_print_job(&job.job_id).await {
                    // The cloud will hand the job out again once it times out
                    warn!("🖨️ Could not confirm print job {}. It may be printed again. {e}", job.job_id);
                }
                Ok(PrintOutcome::Printed { job_id: job.job_id })
            },
            Err(e) => {
                let reason = e.to_string();
                error!("🖨️ Could not print {} for order {}. {reason}", job.job_id, job.order_id);
                if let Err(e) = self.cloud.fail_print_job(&job.job_id, job.attempt, &reason).await {
                    warn!("🖨️ Could not report the failure of print job {}. {e}", job.job_id);
                }
                Ok(PrintOutcome::Failed { job_id: job.job_id, reason })
            },
        }
    }

    pub async fn run(&self, token: CancellationToken) {
        info!(
            "🖨️ Polling for receipts every {}s. Printing to the {}",
            self.interval.as_secs_f32(),
            self.printer.describe()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        debug!("🖨️ Could not poll for print jobs. {e}");
                    }
                },
            }
        }
        info!("🖨️ Print poller stopped");
    }
}
