use tracing::{debug, info, warn};

use crate::queue::{Delivery, TaskReceiver};
use crate::synchronizer::{SyncOutcome, Synchronizer};

/// Counters accumulated by a [`SyncWorker`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks taken off the queue.
    pub processed: usize,
    /// Tasks that added an entity to the index.
    pub added: usize,
    /// Tasks that removed an entity from the index.
    pub removed: usize,
    /// Tasks whose sync failed; they stay unacknowledged.
    pub failed: usize,
}

/// Background consumer that applies queued sync tasks.
///
/// Storage calls block, so each task runs on tokio's blocking pool. Tasks
/// are applied one at a time; a failed task is logged and left
/// unacknowledged for journal recovery to redeliver.
#[derive(Debug)]
pub struct SyncWorker {
    receiver: TaskReceiver,
    synchronizer: Synchronizer,
    stats: WorkerStats,
}

impl SyncWorker {
    pub fn new(receiver: TaskReceiver, synchronizer: Synchronizer) -> Self {
        Self {
            receiver,
            synchronizer,
            stats: WorkerStats::default(),
        }
    }

    /// Consume tasks until every producer handle is dropped.
    pub async fn run(mut self) -> WorkerStats {
        info!("sync worker started");
        while let Some(delivery) = self.receiver.recv().await {
            self.process(delivery).await;
        }
        info!(
            processed = self.stats.processed,
            failed = self.stats.failed,
            "sync worker stopped"
        );
        self.stats
    }

    /// Apply whatever is queued right now, then return the totals so far.
    pub async fn drain(&mut self) -> WorkerStats {
        while let Some(delivery) = self.receiver.try_recv() {
            self.process(delivery).await;
        }
        self.stats
    }

    /// Totals so far.
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    async fn process(&mut self, delivery: Delivery) {
        self.stats.processed += 1;

        let synchronizer = self.synchronizer.clone();
        let task = delivery.task.clone();
        let result = tokio::task::spawn_blocking(move || synchronizer.sync(&task)).await;

        match result {
            Ok(Ok(outcome)) => {
                match outcome {
                    SyncOutcome::Added => self.stats.added += 1,
                    SyncOutcome::Removed => self.stats.removed += 1,
                    SyncOutcome::AlreadyPresent | SyncOutcome::AlreadyAbsent => {}
                }
                if let Err(e) = self.receiver.ack(&delivery) {
                    warn!(task = %delivery.task, error = %e, "failed to acknowledge sync task");
                }
                debug!(task = %delivery.task, ?outcome, "sync task applied");
            }
            Ok(Err(e)) => {
                self.stats.failed += 1;
                warn!(task = %delivery.task, error = %e, "sync task failed");
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(task = %delivery.task, error = %e, "sync task panicked");
            }
        }
    }
}
