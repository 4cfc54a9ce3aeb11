//! Observability: Distributed Tracing, Metrics, and Logging.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

/// Initialize the observability stack.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    // Set up OpenTelemetry tracing if endpoint is provided
    if let Some(endpoint) = config.otlp_endpoint.as_deref() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                    ])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(filter)
            .with(telemetry_layer)
            .with(fmt_layer(config.json_logging))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer(config.json_logging))
            .init();
    }

    Ok(())
}

fn fmt_layer<S>(json_logging: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if json_logging {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    }
}

/// Shutdown OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Install the global Prometheus recorder and describe our metrics.
pub fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    metrics::register_metrics();
    Ok(handle)
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::{counter, describe_counter};

    /// Register all metric descriptions.
    pub fn register_metrics() {
        describe_counter!(
            "scribe_authz_decisions_total",
            "Authorization decisions by check and outcome"
        );
        describe_counter!(
            "scribe_auth_failures_total",
            "Rejected bearer tokens by error code"
        );
        describe_counter!(
            "scribe_jwks_refresh_total",
            "JWKS refresh attempts by outcome"
        );
        describe_counter!(
            "scribe_errors_total",
            "Errors constructed, by code and kind"
        );
    }

    /// Outcome label of a decision.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DecisionOutcome {
        Granted,
        Denied,
        Error,
    }

    impl DecisionOutcome {
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Granted => "granted",
                Self::Denied => "denied",
                Self::Error => "error",
            }
        }
    }

    /// Record the outcome of a decision engine call.
    pub fn record_decision(check: &'static str, outcome: DecisionOutcome) {
        counter!(
            "scribe_authz_decisions_total",
            "check" => check,
            "outcome" => outcome.as_str(),
        )
        .increment(1);
    }

    pub fn record_auth_failure(code: &str) {
        counter!("scribe_auth_failures_total", "code" => code.to_string()).increment(1);
    }

    pub fn record_jwks_refresh(success: bool) {
        let outcome = if success { "success" } else { "failure" };
        counter!("scribe_jwks_refresh_total", "outcome" => outcome).increment(1);
    }
}
