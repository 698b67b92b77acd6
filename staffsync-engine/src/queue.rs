use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use staffsync_protocol::queue::{JobType, ProcessingQueueEntry};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::store::SyncStore;
use crate::timeline::TimelineProcessor;

/// Non-blocking wake-up signal for the queue worker.
///
/// A signal sent while the worker is busy is kept and consumed on its next wait.
#[derive(Clone, Default)]
pub struct QueueTrigger {
    notify: Arc<Notify>,
}

impl QueueTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Consumes processing-queue entries created by background syncs.
pub struct QueueWorker {
    store: Arc<dyn SyncStore>,
    processor: Arc<TimelineProcessor>,
    trigger: QueueTrigger,
    shutting_down: Arc<AtomicBool>,
}

/// Handle to a spawned worker, used to stop it.
pub struct QueueWorkerHandle {
    trigger: QueueTrigger,
    shutting_down: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl QueueWorkerHandle {
    pub async fn shutdown(self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.trigger.signal();
        if let Err(err) = self.join.await {
            error!("queue worker crashed: {:?}", err);
        }
    }
}

impl QueueWorker {
    pub fn new(store: Arc<dyn SyncStore>, processor: Arc<TimelineProcessor>, trigger: QueueTrigger) -> Self {
        Self {
            store,
            processor,
            trigger,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the worker loop. Entries left pending by a previous process are
    /// drained before the first wait.
    pub fn spawn(self) -> QueueWorkerHandle {
        let trigger = self.trigger.clone();
        let shutting_down = self.shutting_down.clone();
        let join = tokio::spawn(async move { self.run().await });

        QueueWorkerHandle {
            trigger,
            shutting_down,
            join,
        }
    }

    async fn run(self) {
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                break;
            }

            match self.drain().await {
                Ok(0) => {}
                Ok(count) => info!(count, "queue entries processed"),
                Err(EngineError::ShuttingDown) => break,
                Err(err) => error!(error = %err, "queue drain failed"),
            }

            if self.shutting_down.load(Ordering::Relaxed) {
                break;
            }

            self.trigger.notified().await;
        }
        info!("queue worker stopped");
    }

    /// Processes pending entries until none are left; returns how many ran.
    pub async fn drain(&self) -> Result<usize, EngineError> {
        let mut processed = 0;
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                return Err(EngineError::ShuttingDown);
            }

            let Some(entry) = self.store.claim_next_queue_entry().await? else {
                return Ok(processed);
            };

            info!(entry_id = %entry.id, job_type = %entry.job_type, created_by = %entry.created_by, "processing queue entry");
            let outcome = self.process_entry(&entry).await;
            if let Err(message) = &outcome {
                warn!(entry_id = %entry.id, error = %message, "queue entry failed");
            }
            self.store.complete_queue_entry(entry.id, outcome).await?;
            processed += 1;
        }
    }

    async fn process_entry(&self, entry: &ProcessingQueueEntry) -> Result<Value, String> {
        match JobType::parse(&entry.job_type) {
            Some(JobType::TimelineProcessing) => {
                let entity_ids = entry.entity_ids();
                let source = format!("queue:{}", entry.created_by);
                let result = self.processor.process(&entity_ids, &source).await;
                serde_json::to_value(result).map_err(|err| err.to_string())
            }
            None => Err(EngineError::UnknownJob(entry.job_type.clone()).to_string()),
        }
    }
}
