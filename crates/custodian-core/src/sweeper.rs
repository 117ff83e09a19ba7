//! Background escalation of overdue approval requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::ChangeControl;

/// Periodically calls [`ChangeControl::sweep_overdue`] on a tokio task.
///
/// Must be spawned from within a tokio runtime. Dropping the sweeper
/// without calling [`shutdown`](Self::shutdown) leaves the task running
/// until the runtime stops.
pub struct EscalationSweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EscalationSweeper {
    /// Start sweeping every `period`. The first sweep runs immediately.
    pub fn spawn(engine: Arc<ChangeControl>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "escalation sweeper started");
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match engine.sweep_overdue() {
                            Ok(changed) if !changed.is_empty() => {
                                debug!(count = changed.len(), "overdue requests escalated");
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "escalation sweep failed"),
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            info!("escalation sweeper stopped");
        });
        Self { shutdown, handle }
    }

    /// Start sweeping at the engine's configured interval.
    pub fn from_config(engine: Arc<ChangeControl>) -> Self {
        let period = Duration::from_secs(engine.config().sweep_interval_secs.max(1));
        Self::spawn(engine, period)
    }

    /// Stop the loop and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "escalation sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
