//! ClinicOps API server entry point.

use std::sync::Arc;

use clinicops_api::config::AppConfig;
use clinicops_api::error::AppError;
use clinicops_api::routes;
use clinicops_api::state::AppState;
use clinicops_api::telemetry::Telemetry;
use clinicops_core::clock::{Clock, SystemClock};
use clinicops_event_store::{PgEventStore, PgReadModelStore};
use clinicops_projections::{ProjectionDispatcher, ProjectionWorker, default_handlers};
use clinicops_scheduling::application::holds::HoldSweeper;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = Telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting ClinicOps API server");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("database migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(PgEventStore::new(pool.clone()));
    let read_models = Arc::new(PgReadModelStore::new(pool));
    let state = AppState::new(store.clone(), read_models.clone(), clock.clone())?;

    let dispatcher = ProjectionDispatcher::new(store.clone(), read_models, clock, default_handlers());
    let worker = ProjectionWorker::new(store, Arc::new(dispatcher), config.worker.clone()).spawn();
    let sweeper = HoldSweeper::new(state.holds.clone(), config.hold_sweep_interval).spawn();

    // TODO: restrict CORS to the clinic portal origins once they are configurable.
    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if !worker.stop(config.shutdown_timeout).await {
        warn!("projection worker aborted during shutdown");
    }
    if !sweeper.stop(config.shutdown_timeout).await {
        warn!("hold sweeper aborted during shutdown");
    }
    info!("server stopped");
    telemetry.shutdown();

    served.map_err(AppError::from)
}

/// Resolves on Ctrl+C or SIGTERM. If a handler cannot be installed the
/// other signal still applies.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
