//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use clinicops_api::routes;
use clinicops_api::routes::metadata::TENANT_HEADER;
use clinicops_api::state::AppState;
use clinicops_event_store::{InMemoryEventStore, InMemoryReadModelStore};
use clinicops_projections::{ProjectionDispatcher, ProjectionWorker, WorkerConfig, default_handlers};
use clinicops_test_support::{MockClock, fixed_time, test_tenant};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

/// The full router over in-memory stores, plus a worker the test drives by
/// hand.
pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<MockClock>,
    worker: ProjectionWorker,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(MockClock::new(fixed_time()));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let state = AppState::new(store.clone(), read_models.clone(), clock.clone()).unwrap();
        let dispatcher = ProjectionDispatcher::new(
            store.clone(),
            read_models,
            clock.clone(),
            default_handlers(),
        );
        let worker = ProjectionWorker::new(store, Arc::new(dispatcher), WorkerConfig::default());
        Self {
            state,
            clock,
            worker,
        }
    }

    /// Same route structure as `main.rs`, without the middleware layers.
    pub fn router(&self) -> Router {
        routes::app(self.state.clone())
    }

    /// Projects every pending event into the read models.
    pub async fn drain(&self) {
        while self.worker.run_once().await.unwrap() > 0 {}
    }

    /// POST as the test tenant.
    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        send(self.router(), "POST", uri, Some(test_tenant()), Some(body)).await
    }

    /// GET as the test tenant.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(self.router(), "GET", uri, Some(test_tenant()), None).await
    }

    /// Submits a command and returns the new aggregate id.
    pub async fn submit(&self, command_type: &str, payload: Value) -> Uuid {
        let (status, json) = self
            .post(
                "/api/v1/commands",
                &json!({ "command_type": command_type, "payload": payload }),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{command_type} failed: {json}");
        json["aggregate_id"].as_str().unwrap().parse().unwrap()
    }

    /// An active doctor working Mondays 09:00 to 17:00 in 30 minute slots,
    /// already projected.
    pub async fn monday_doctor(&self) -> Uuid {
        let doctor_id = self
            .submit(
                "create_doctor_profile",
                json!({
                    "hospital_id": Uuid::new_v4(),
                    "full_name": "Dr. Grace Hopper",
                    "specialty": "cardiology",
                }),
            )
            .await;
        let (status, json) = self
            .post(
                "/api/v1/commands",
                &json!({
                    "command_type": "activate_doctor_profile",
                    "aggregate_id": doctor_id,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "activation failed: {json}");
        self.submit(
            "create_doctor_schedule",
            json!({
                "doctor_id": doctor_id,
                "day_of_week": "monday",
                "start_time": "09:00:00",
                "end_time": "17:00:00",
                "slot_duration_minutes": 30,
                "consultation_mode": "in_person",
                "max_capacity": 1,
                "effective_from": "2026-01-01",
            }),
        )
        .await;
        self.drain().await;
        doctor_id
    }
}

/// Sends a request with an optional tenant header and JSON body.
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    tenant: Option<Uuid>,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header(TENANT_HEADER, tenant.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}
