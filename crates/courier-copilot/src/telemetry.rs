//! Tracing setup shared by the gateway and worker binaries.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the log subscriber and an OpenTelemetry tracer, so spans carry
/// trace ids that cross the broker in `traceparent` headers.
///
/// `RUST_LOG` filters both layers and defaults to `info`.
pub fn init_tracing(service_name: &'static str) -> TracerProvider {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = TracerProvider::builder()
        .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name)]))
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_trace_layer)
        .init();

    provider
}

pub fn shutdown_tracing(provider: &TracerProvider) {
    if let Err(error) = provider.shutdown() {
        tracing::warn!(%error, "failed to shut down tracer provider");
    }
}
