//! HTTP routes. Everything except `/health` lives under `/api/v1`.

use axum::Router;

use crate::state::AppState;

pub mod commands;
pub mod health;
pub mod metadata;
pub mod read_models;
pub mod scheduling;

/// Assembles every route onto `state`. Middleware layers are left to the
/// caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api/v1",
            Router::new()
                .merge(commands::router())
                .merge(read_models::router())
                .nest("/scheduling", scheduling::router()),
        )
        .with_state(state)
}
