//! Background task queue
//!
//! Anything that must not block or fail the ask path (evaluation writes,
//! source ingestion) is sent over an unbounded channel as a plain
//! serializable job. One worker task drains the channel; it owns its own
//! database handle and embedding wiring rather than borrowing the server's.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::IngestionConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingGateway;
use crate::models::EvaluationRecord;

pub mod ingestion;

/// One unit of background work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    LogEvaluation(EvaluationRecord),
    IngestSource { source_id: i64 },
    Shutdown,
}

/// Cheap cloneable handle for enqueueing jobs
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    /// Enqueue a job; a closed queue is logged and swallowed, the caller's
    /// response must not depend on it
    pub fn enqueue(&self, job: Job) {
        if self.sender.send(job).is_err() {
            error!("Task queue is closed, dropping job");
        }
    }

    pub fn log_evaluation(&self, record: EvaluationRecord) {
        self.enqueue(Job::LogEvaluation(record));
    }

    pub fn ingest_source(&self, source_id: i64) {
        self.enqueue(Job::IngestSource { source_id });
    }

    /// Ask the worker to drain and stop
    pub fn shutdown(&self) {
        self.enqueue(Job::Shutdown);
    }

    /// Queue with no worker attached; tests inspect the receiving end
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

/// Start the background worker
///
/// Returns the queue handle plus the worker's join handle so callers can
/// await a clean drain after sending `Shutdown`.
pub fn spawn_worker(
    database: Database,
    gateway: Arc<EmbeddingGateway>,
    config: IngestionConfig,
) -> (TaskQueue, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

    let handle = tokio::spawn(async move {
        info!("Task worker started");
        while let Some(job) = receiver.recv().await {
            match job {
                Job::LogEvaluation(record) => {
                    if let Err(e) = database.insert_evaluation(&record).await {
                        error!("Failed to persist evaluation record: {}", e);
                    }
                }
                Job::IngestSource { source_id } => {
                    if let Err(e) =
                        ingestion::ingest_source(&database, &gateway, &config, source_id).await
                    {
                        error!("Ingestion failed for source {}: {}", source_id, e);
                    }
                }
                Job::Shutdown => break,
            }
        }
        info!("Task worker stopped");
    });

    (TaskQueue { sender }, handle)
}

/// Start the ingestion watchdog
///
/// Re-enqueues sources that sat in a retryable state for a whole interval.
/// The first scan runs immediately so sources stranded by a restart are
/// picked up without waiting a day.
pub fn spawn_watchdog(
    database: Database,
    queue: TaskQueue,
    config: IngestionConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let hours = config.watchdog_interval_hours;
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(hours.max(1) * 3600));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match database
                .stalled_sources(hours as i64, config.max_auto_retries)
                .await
            {
                Ok(source_ids) => {
                    if !source_ids.is_empty() {
                        info!("Watchdog re-enqueueing {} stalled sources", source_ids.len());
                    }
                    for source_id in source_ids {
                        queue.ingest_source(source_id);
                    }
                }
                Err(e) => warn!("Watchdog scan failed: {}", e),
            }
        }
    })
}
