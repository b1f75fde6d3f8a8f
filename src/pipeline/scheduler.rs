use super::Pipeline;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Flush every subscribed instrument once per `period` until `shutdown` flips to true
pub fn spawn_flush_loop(
    pipeline: Arc<Pipeline>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period_ms = period.as_millis() as u64, "Flush loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pipeline.flush_all(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Flush loop stopped");
    })
}
