//! Tracing subscriber setup with optional OTLP span export.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::AppError;

/// Service name reported to the collector.
pub const SERVICE_NAME: &str = "clinicops-api";

/// Keeps the span exporter alive; flush it with [`Telemetry::shutdown`].
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Installs the global subscriber: JSON logs filtered by `RUST_LOG`
    /// (default `info`), plus OTLP export when `otlp_endpoint` is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Telemetry` if the exporter cannot be built or a
    /// global subscriber is already installed.
    pub fn init(otlp_endpoint: Option<&str>) -> Result<Self, AppError> {
        let provider = otlp_endpoint.map(tracer_provider).transpose()?;
        let otel_layer = provider
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer().json())
            .with(otel_layer)
            .try_init()
            .map_err(|e| AppError::Telemetry(e.to_string()))?;

        if let Some(endpoint) = otlp_endpoint {
            tracing::info!(endpoint, "exporting spans over OTLP");
        }
        Ok(Self { provider })
    }

    /// Flushes buffered spans.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "span exporter did not shut down cleanly");
            }
        }
    }
}

fn tracer_provider(endpoint: &str) -> Result<SdkTracerProvider, AppError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}
