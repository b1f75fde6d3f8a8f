use super::CandleSink;
use crate::registry::{EventConsumer, PipelineEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Candle registry consumer that writes completed candles back to storage.
///
/// Writes are spawned onto the runtime and never awaited by the pipeline.
/// A failed write is logged and dropped. Shutdown uses [`wait_idle`] to let
/// the final candles land before the runtime goes away.
///
/// [`wait_idle`]: PersistenceConsumer::wait_idle
pub struct PersistenceConsumer<S: CandleSink> {
    sink: Arc<S>,
    runtime: Handle,
    dispatched: AtomicUsize,
    settled: Arc<watch::Sender<usize>>,
}

impl<S: CandleSink> PersistenceConsumer<S> {
    pub fn new(sink: Arc<S>, runtime: Handle) -> Self {
        Self {
            sink,
            runtime,
            dispatched: AtomicUsize::new(0),
            settled: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Writes handed to the runtime so far
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Writes that have finished, successfully or not
    pub fn settled(&self) -> usize {
        *self.settled.borrow()
    }

    /// Wait until every write dispatched so far has finished.
    ///
    /// Returns false if `limit` elapses first.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let target = self.dispatched();
        let mut settled = self.settled.subscribe();
        let idle = match tokio::time::timeout(limit, settled.wait_for(|n| *n >= target)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        };
        idle
    }
}

impl<S: CandleSink> EventConsumer for PersistenceConsumer<S> {
    fn on_event(&self, event: &PipelineEvent) {
        let PipelineEvent::CandleCompleted { candle, .. } = event else {
            return;
        };

        let sink = Arc::clone(&self.sink);
        let candle = candle.clone();
        let settled = Arc::clone(&self.settled);
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            if let Err(e) = sink.write_completed_candle(&candle).await {
                tracing::warn!(
                    instrument = %candle.instrument,
                    bucket = %candle.bucket_start,
                    "Failed to persist candle: {}",
                    e
                );
            }
            settled.send_modify(|n| *n += 1);
        });
    }
}
