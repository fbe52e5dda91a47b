//! Logging and metrics exporter setup.
//!
//! `RUST_LOG` takes precedence over the configured log level. The
//! `prometheus` feature serves metrics over HTTP and the `otel` feature
//! exports spans over OTLP.

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
#[cfg(any(feature = "prometheus", feature = "otel"))]
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

#[cfg(feature = "otel")]
use std::sync::OnceLock;
#[cfg(feature = "otel")]
static TRACER_PROVIDER: OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> = OnceLock::new();

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Install the tracing subscriber and any configured exporters.
pub fn init(config: &TelemetryConfig) -> Result<(), InitError> {
    let filter = env_filter(&config.log_level);

    #[cfg(feature = "otel")]
    if let Some(ref otel_config) = config.opentelemetry {
        init_otel(filter, otel_config)?;
        return start_exporters(config);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    start_exporters(config)
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

#[allow(unused_variables)]
fn start_exporters(config: &TelemetryConfig) -> Result<(), InitError> {
    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    Ok(())
}

#[cfg(feature = "otel")]
fn init_otel(
    filter: EnvFilter,
    otel_config: &crate::config::OpenTelemetryConfig,
) -> Result<(), InitError> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk as otlp_sdk;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel_config.endpoint)
        .build()?;

    let resource = otlp_sdk::Resource::builder()
        .with_attributes([
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                otel_config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ])
        .build();

    let provider = otlp_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer("security-group-fqdn");
    let _ = TRACER_PROVIDER.set(provider);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
    Ok(())
}

#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: SocketAddr) -> Result<(), InitError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Flush pending spans.
pub fn shutdown() {
    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!("Error shutting down tracer provider: {}", e);
        }
    }
}
