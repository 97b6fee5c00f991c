//! Integration tests for the read-model and projection routes.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

async fn register(app: &TestApp, mrn: &str) -> Uuid {
    app.submit(
        "register_patient",
        json!({
            "mrn": mrn,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "date_of_birth": "1985-12-10",
        }),
    )
    .await
}

#[tokio::test]
async fn test_list_rows_pages_within_tenant() {
    // Arrange
    let app = TestApp::new();
    for n in 1..=3 {
        register(&app, &format!("MRN-2026-00000{n}")).await;
    }
    app.drain().await;

    // Act
    let (status, page) = app.get("/api/v1/read-models/patients?limit=2&offset=1").await;
    let (_, foreign) = common::send(
        app.router(),
        "GET",
        "/api/v1/read-models/patients",
        Some(Uuid::new_v4()),
        None,
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["table"], "patients");
    assert_eq!(page["rows"].as_array().unwrap().len(), 2);
    assert!(foreign["rows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_row_of_another_tenant_is_not_found() {
    // Arrange
    let app = TestApp::new();
    let patient_id = register(&app, "MRN-2026-000777").await;
    app.drain().await;

    // Act
    let (status, json) = common::send(
        app.router(),
        "GET",
        &format!("/api/v1/read-models/patients/{patient_id}"),
        Some(Uuid::new_v4()),
        None,
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_unknown_table_returns_404() {
    // Arrange
    let app = TestApp::new();

    // Act
    let (status, json) = app.get("/api/v1/read-models/invoices").await;

    // Assert
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_checkpoint_follows_the_worker() {
    // Arrange
    let app = TestApp::new();
    register(&app, "MRN-2026-000001").await;
    register(&app, "MRN-2026-000002").await;

    // Act
    let (_, before) = app.get("/api/v1/projections/main/checkpoint").await;
    app.drain().await;
    let (status, after) = app.get("/api/v1/projections/main/checkpoint").await;

    // Assert
    assert_eq!(before["last_sequence"], 0);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["projection_name"], "main");
    assert_eq!(after["last_sequence"], 2);
}

#[tokio::test]
async fn test_projection_errors_start_empty() {
    // Arrange
    let app = TestApp::new();
    register(&app, "MRN-2026-000001").await;
    app.drain().await;

    // Act
    let (status, json) = app.get("/api/v1/projections/errors?limit=10").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}
