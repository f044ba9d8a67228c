//! Keeps the edge's long-running tasks alive.
//!
//! Each supervised task is restarted after `restart_delay` if it returns or panics while the edge is still running.
//! Cancelling the shared token stops every task and ends [`Supervisor::wait`].
use std::{future::Future, time::Duration};

use log::*;
use tokio::{task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;

pub struct Supervisor {
    token: CancellationToken,
    restart_delay: Duration,
    tasks: JoinSet<()>,
}

impl Supervisor {
    pub fn new(token: CancellationToken, restart_delay: Duration) -> Self {
        Self { token, restart_delay, tasks: JoinSet::new() }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Supervises the task produced by `make_task`. A fresh task is made for every restart.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, make_task: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let delay = self.restart_delay;
        self.tasks.spawn(async move {
            let mut restarts = 0u32;
            loop {
                debug!("🛟️ Starting {name}");
                let result = tokio::spawn(make_task(token.clone())).await;
                if token.is_cancelled() {
                    break;
                }
                restarts += 1;
                match result {
                    Ok(()) => warn!("🛟️ {name} stopped unexpectedly. Restarting in {}s", delay.as_secs_f32()),
                    Err(e) if e.is_panic() => {
                        error!("🛟️ {name} panicked. Restarting in {}s (restart #{restarts})", delay.as_secs_f32())
                    },
                    Err(e) => error!("🛟️ {name} was aborted. {e} Restarting in {}s", delay.as_secs_f32()),
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(delay) => {},
                }
            }
            info!("🛟️ {name} has shut down");
        });
    }

    /// Waits until every supervised task has shut down.
    pub async fn wait(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("🛟️ A supervisor loop failed. {e}");
            }
        }
    }
}
