//! Checkpointed catch-up loop that keeps the read models current.

use std::sync::Arc;
use std::time::Duration;

use clinicops_core::error::DomainError;
use clinicops_core::store::EventStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::ProjectionDispatcher;

/// Tuning for one projection group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Checkpoint name.
    pub name: String,
    /// Events fetched per iteration.
    pub batch_size: i64,
    /// Pause when the log has nothing new.
    pub poll_interval: Duration,
    /// Pause between full batches.
    pub drain_interval: Duration,
    /// Pause after a loop-level failure.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "main".into(),
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            drain_interval: Duration::from_millis(10),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Feeds events after the checkpoint to the dispatcher, in sequence order.
pub struct ProjectionWorker {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<ProjectionDispatcher>,
    config: WorkerConfig,
}

impl ProjectionWorker {
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        dispatcher: Arc<ProjectionDispatcher>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Processes one batch and returns how many events it consumed.
    ///
    /// The checkpoint advances past each event once it is dispatched, even
    /// if a handler failed on it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the log or checkpoint cannot
    /// be read or written.
    pub async fn run_once(&self) -> Result<usize, DomainError> {
        let events = self
            .store
            .get_projection_catchup_events(&self.config.name, self.config.batch_size)
            .await?;
        for event in &events {
            let report = self.dispatcher.dispatch(event, None).await;
            if report.failed > 0 {
                warn!(
                    projection = %self.config.name,
                    sequence = event.sequence,
                    failed = report.failed,
                    "event advanced past failing handlers"
                );
            }
            self.store
                .mark_events_processed(&self.config.name, event.sequence)
                .await?;
        }
        Ok(events.len())
    }

    /// Loops until `shutdown` turns `true`. A batch in progress always
    /// completes; only the pauses between batches are interrupted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            projection = %self.config.name,
            batch_size = self.config.batch_size,
            "projection worker started"
        );
        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(0) => self.config.poll_interval,
                Ok(processed) => {
                    debug!(projection = %self.config.name, processed, "batch projected");
                    self.config.drain_interval
                }
                Err(e) => {
                    error!(projection = %self.config.name, error = %e, "projection batch failed");
                    self.config.error_backoff
                }
            };
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(projection = %self.config.name, "projection worker received stop signal");
                        break;
                    }
                }
            }
        }
        info!(projection = %self.config.name, "projection worker stopped");
    }

    /// Starts the worker on the runtime.
    #[must_use]
    pub fn spawn(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        WorkerHandle { stop_tx, join }
    }
}

/// Stops a spawned [`ProjectionWorker`].
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signals the worker and waits up to `timeout` for its batch to drain.
    /// Returns `false` if it had to be aborted.
    pub async fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        let mut join = self.join;
        match tokio::time::timeout(timeout, &mut join).await {
            Ok(_) => true,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "projection worker did not stop in time");
                join.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clinicops_core::event::{AggregateType, EventDraft, EventMetadata};
    use clinicops_core::read_model::ReadModelStore;
    use clinicops_event_store::{InMemoryEventStore, InMemoryReadModelStore};
    use clinicops_test_support::{FixedClock, fixed_time, test_tenant};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn draft(aggregate_id: Uuid, version: i64) -> EventDraft {
        let command_id = Uuid::new_v4();
        EventDraft {
            aggregate_type: AggregateType::Room,
            aggregate_id,
            aggregate_version: version,
            event_type: "room_opened".into(),
            schema_version: 1,
            payload: json!({}),
            metadata: EventMetadata {
                correlation_id: command_id,
                causation_id: command_id,
                actor_id: None,
                client: None,
                extensions: serde_json::Map::new(),
            },
            tenant_id: test_tenant(),
            idempotency_key: None,
        }
    }

    fn worker(store: Arc<InMemoryEventStore>, batch_size: i64) -> ProjectionWorker {
        let read_models: Arc<dyn ReadModelStore> = Arc::new(InMemoryReadModelStore::new());
        let dispatcher = ProjectionDispatcher::new(
            store.clone(),
            read_models,
            Arc::new(FixedClock(fixed_time())),
            Vec::new(),
        );
        ProjectionWorker::new(
            store,
            Arc::new(dispatcher),
            WorkerConfig {
                batch_size,
                ..WorkerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_run_once_advances_checkpoint_by_batch() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(fixed_time()))));
        let id = Uuid::new_v4();
        store
            .append_events((1..=5).map(|v| draft(id, v)).collect())
            .await
            .unwrap();
        let worker = worker(store.clone(), 2);

        // Act
        let first = worker.run_once().await.unwrap();
        let second = worker.run_once().await.unwrap();
        let third = worker.run_once().await.unwrap();
        let idle = worker.run_once().await.unwrap();

        // Assert
        assert_eq!((first, second, third, idle), (2, 2, 1, 0));
        let checkpoint = store.get_projection_checkpoint("main").await.unwrap();
        assert_eq!(checkpoint.last_sequence, 5);
    }

    #[tokio::test]
    async fn test_spawned_worker_stops_within_timeout() {
        // Arrange
        let store = Arc::new(InMemoryEventStore::new(Arc::new(FixedClock(fixed_time()))));
        let handle = worker(store, 100).spawn();

        // Act
        let stopped = handle.stop(Duration::from_secs(2)).await;

        // Assert
        assert!(stopped);
    }
}
