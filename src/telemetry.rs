//! OpenTelemetry wiring
//!
//! Tracing spans are exported over OTLP when an endpoint is configured;
//! otherwise the operator logs to stdout only.

use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};

/// Build a batch OTLP tracer for the operator.
pub fn init_tracer(endpoint: &str) -> Result<sdktrace::Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", "cloudflare-zero-trust-operator"),
        ])))
        .install_batch(runtime::Tokio)
}

/// Flush any buffered spans on shutdown.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
