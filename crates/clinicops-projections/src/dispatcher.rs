//! Routes events to projection handlers and isolates their failures.

use std::collections::HashMap;
use std::sync::Arc;

use clinicops_core::clock::Clock;
use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelStore, ReadModelWrite};
use clinicops_core::store::{EventStore, ProjectionErrorRecord};
use serde_json::json;
use tracing::{debug, error};

use crate::error::ProjectionError;
use crate::handler::ProjectionHandler;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers whose writes were applied (or added to the caller's scope).
    pub applied: usize,
    /// Handlers that failed; each failure is in the projection error log.
    pub failed: usize,
}

/// Fans each event out to every handler registered for its type.
pub struct ProjectionDispatcher {
    store: Arc<dyn EventStore>,
    read_models: Arc<dyn ReadModelStore>,
    clock: Arc<dyn Clock>,
    routes: HashMap<&'static str, Vec<Arc<dyn ProjectionHandler>>>,
}

impl ProjectionDispatcher {
    /// Builds the routing table from `handlers`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        read_models: Arc<dyn ReadModelStore>,
        clock: Arc<dyn Clock>,
        handlers: Vec<Arc<dyn ProjectionHandler>>,
    ) -> Self {
        let mut routes: HashMap<&'static str, Vec<Arc<dyn ProjectionHandler>>> = HashMap::new();
        for handler in handlers {
            for event_type in handler.event_types() {
                routes.entry(*event_type).or_default().push(handler.clone());
            }
        }
        Self {
            store,
            read_models,
            clock,
            routes,
        }
    }

    /// Returns `true` if at least one handler consumes `event_type`.
    #[must_use]
    pub fn handles(&self, event_type: &str) -> bool {
        self.routes.contains_key(event_type)
    }

    /// Runs every handler for `event`.
    ///
    /// Without a `scope` each handler's writes are applied as their own
    /// atomic unit. With a scope they are appended to it and the caller
    /// applies them. A failing handler is logged and recorded; its siblings
    /// still run.
    pub async fn dispatch(
        &self,
        event: &Event,
        mut scope: Option<&mut Vec<ReadModelWrite>>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handlers) = self.routes.get(event.event_type.as_str()) else {
            debug!(event_type = %event.event_type, sequence = event.sequence, "no projection handlers");
            return report;
        };

        for handler in handlers {
            let outcome = match handler.project(event) {
                Ok(writes) => match scope.as_mut() {
                    Some(scope) => {
                        scope.extend(writes);
                        Ok(())
                    }
                    None => self
                        .read_models
                        .apply(&writes)
                        .await
                        .map_err(ProjectionError::from),
                },
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    debug!(
                        handler = handler.name(),
                        event_type = %event.event_type,
                        sequence = event.sequence,
                        "event projected"
                    );
                    report.applied += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_failure(handler.name(), event, &e).await;
                }
            }
        }
        report
    }

    async fn record_failure(&self, handler: &'static str, event: &Event, failure: &ProjectionError) {
        error!(
            handler,
            event_id = %event.event_id,
            event_type = %event.event_type,
            sequence = event.sequence,
            error = %failure,
            "projection handler failed"
        );
        let record = ProjectionErrorRecord {
            event_id: event.event_id,
            event_sequence: event.sequence,
            event_type: event.event_type.clone(),
            projection_name: handler.to_owned(),
            message: failure.to_string(),
            details: json!({
                "aggregate_id": event.aggregate_id.to_string(),
                "aggregate_type": event.aggregate_type.as_str(),
                "aggregate_version": event.aggregate_version,
            }),
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.store.record_projection_error(record).await {
            error!(handler, event_id = %event.event_id, error = %e, "failed to record projection error");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use clinicops_core::event::{AggregateType, EventMetadata};
    use clinicops_core::read_model::{ReadModelTable, RowFilter};
    use clinicops_event_store::{InMemoryEventStore, InMemoryReadModelStore};
    use clinicops_test_support::{FailingReadModelStore, FixedClock, fixed_time, test_tenant};
    use uuid::Uuid;

    use super::*;
    use crate::handler::insert;

    /// Writes a `patients` row holding the raw payload.
    struct Echo;

    impl ProjectionHandler for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn event_types(&self) -> &'static [&'static str] {
            &["room_opened"]
        }

        fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
            Ok(vec![insert(
                ReadModelTable::Patients,
                event,
                event.aggregate_id,
                &event.payload,
            )?])
        }
    }

    /// Always fails.
    struct Broken;

    impl ProjectionHandler for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn event_types(&self) -> &'static [&'static str] {
            &["room_opened"]
        }

        fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
            Err(ProjectionError::Unhandled {
                handler: self.name(),
                event_type: event.event_type.clone(),
            })
        }
    }

    fn event(event_type: &str) -> Event {
        let command_id = Uuid::new_v4();
        Event {
            event_id: Uuid::new_v4(),
            sequence: 7,
            aggregate_type: AggregateType::Room,
            aggregate_id: Uuid::new_v4(),
            aggregate_version: 1,
            event_type: event_type.into(),
            schema_version: 1,
            payload: json!({ "label": "A-1", "opened_on": NaiveDate::from_ymd_opt(2026, 1, 15) }),
            metadata: EventMetadata {
                correlation_id: command_id,
                causation_id: command_id,
                actor_id: None,
                client: None,
                extensions: serde_json::Map::new(),
            },
            tenant_id: test_tenant(),
            idempotency_key: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        }
    }

    fn dispatcher(
        read_models: Arc<dyn ReadModelStore>,
    ) -> (Arc<InMemoryEventStore>, ProjectionDispatcher) {
        let clock = Arc::new(FixedClock(fixed_time()));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        let dispatcher = ProjectionDispatcher::new(
            store.clone(),
            read_models,
            clock,
            vec![Arc::new(Broken), Arc::new(Echo)],
        );
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_failing_handler_is_recorded_and_sibling_still_applies() {
        // Arrange
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let (store, dispatcher) = dispatcher(read_models.clone());
        let event = event("room_opened");

        // Act
        let report = dispatcher.dispatch(&event, None).await;

        // Assert
        assert_eq!(report, DispatchReport { applied: 1, failed: 1 });
        let rows = read_models
            .find(ReadModelTable::Patients, &RowFilter::for_tenant(test_tenant()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let errors = store.list_projection_errors(10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].projection_name, "broken");
        assert_eq!(errors[0].event_sequence, 7);
    }

    #[tokio::test]
    async fn test_scope_collects_writes_without_applying() {
        // Arrange
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let (_, dispatcher) = dispatcher(read_models.clone());
        let event = event("room_opened");
        let mut scope = Vec::new();

        // Act
        let report = dispatcher.dispatch(&event, Some(&mut scope)).await;

        // Assert
        assert_eq!(report.applied, 1);
        assert_eq!(scope.len(), 1);
        assert!(
            read_models
                .get(ReadModelTable::Patients, event.aggregate_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_isolated_per_handler() {
        // Arrange
        let (store, dispatcher) = dispatcher(Arc::new(FailingReadModelStore));

        // Act
        let report = dispatcher.dispatch(&event("room_opened"), None).await;

        // Assert
        assert_eq!(report, DispatchReport { applied: 0, failed: 2 });
        assert_eq!(store.list_projection_errors(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unrouted_event_is_a_no_op() {
        // Arrange
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let (store, dispatcher) = dispatcher(read_models);

        // Act
        let report = dispatcher.dispatch(&event("room_closed"), None).await;

        // Assert
        assert_eq!(report, DispatchReport::default());
        assert!(!dispatcher.handles("room_closed"));
        assert!(store.list_projection_errors(10).await.unwrap().is_empty());
    }
}
