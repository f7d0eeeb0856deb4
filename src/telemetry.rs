use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "rebekko-attendance";

static METRICS: OnceLock<RelayMetrics> = OnceLock::new();

/// Metrics for the OAuth token relay
pub struct RelayMetrics {
    // Operation counters
    pub token_exchanges: Counter<u64>,
    pub token_refreshes: Counter<u64>,
    pub upstream_errors: Counter<u64>,
    pub transport_faults: Counter<u64>,

    // Latency histogram
    pub upstream_duration_seconds: Histogram<f64>,
}

impl RelayMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            token_exchanges: meter
                .u64_counter("rebekko_token_exchanges_total")
                .with_description("Total number of authorization-code exchanges relayed")
                .build(),
            token_refreshes: meter
                .u64_counter("rebekko_token_refreshes_total")
                .with_description("Total number of refresh-token requests relayed")
                .build(),
            upstream_errors: meter
                .u64_counter("rebekko_upstream_errors_total")
                .with_description("Total number of non-2xx responses from the token endpoint")
                .build(),
            transport_faults: meter
                .u64_counter("rebekko_transport_faults_total")
                .with_description("Total number of failed calls to the token endpoint")
                .build(),
            upstream_duration_seconds: meter
                .f64_histogram("rebekko_upstream_duration_seconds")
                .with_description("Time spent waiting on the token endpoint")
                .build(),
        }
    }
}

pub fn get_metrics() -> Option<&'static RelayMetrics> {
    METRICS.get()
}

pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_filter: "info".to_string(),
        }
    }
}

fn create_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            SERVICE_NAME,
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ])
}

fn init_tracer_provider(
    endpoint: &str,
) -> Result<TracerProvider, opentelemetry::trace::TraceError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let provider = TracerProvider::builder()
        .with_resource(create_resource())
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();

    Ok(provider)
}

fn init_meter_provider(
    endpoint: &str,
) -> Result<SdkMeterProvider, opentelemetry_sdk::metrics::MetricError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(10))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(create_resource())
        .with_reader(reader)
        .build();

    Ok(provider)
}

/// Initialize logging and, when an OTLP endpoint is configured, trace and
/// metric export. Must run inside the Tokio runtime (the batch exporters
/// spawn onto it).
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::new(&config.log_filter);

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer_provider = init_tracer_provider(endpoint)?;
            let meter_provider = init_meter_provider(endpoint)?;

            // Set global providers
            global::set_tracer_provider(tracer_provider.clone());
            global::set_meter_provider(meter_provider.clone());

            // Create tracer for tracing-opentelemetry layer
            let tracer = tracer_provider.tracer(SERVICE_NAME);

            // Initialize metrics
            let meter = meter_provider.meter(SERVICE_NAME);
            let _ = METRICS.set(RelayMetrics::new(&meter));

            // Set up tracing subscriber with OpenTelemetry layer
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(otel_layer)
                .init();

            info!(
                endpoint = %endpoint,
                "OpenTelemetry initialized with OTLP export"
            );
        }
        None => {
            // Initialize without OpenTelemetry - just tracing-subscriber for console logging
            let meter_provider = SdkMeterProvider::builder()
                .with_resource(create_resource())
                .build();

            global::set_meter_provider(meter_provider.clone());

            let meter = meter_provider.meter(SERVICE_NAME);
            let _ = METRICS.set(RelayMetrics::new(&meter));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();

            info!("Telemetry initialized without OTLP export");
        }
    }

    Ok(())
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
