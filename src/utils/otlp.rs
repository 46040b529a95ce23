use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use opentelemetry_semantic_conventions::{
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_NAME, SERVICE_VERSION},
    SCHEMA_URL,
};
use tracing_subscriber::{EnvFilter, Layer};
use url::Url;

const OTEL_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const OTEL_LEVEL: &str = "OTEL_LEVEL";
const OTEL_ENVIRONMENT: &str = "OTEL_ENVIRONMENT_NAME";

/// Shuts the tracer provider down when dropped, flushing pending spans. Hold
/// it for the lifetime of `main`.
#[derive(Debug)]
pub struct OtelGuard(SdkTracerProvider, EnvFilter);

impl OtelGuard {
    /// A filtered layer exporting spans through this provider.
    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let tracer = self.0.tracer(env!("CARGO_PKG_NAME"));
        tracing_opentelemetry::layer()
            .with_tracer(tracer)
            .with_filter(self.1.clone())
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.shutdown() {
            eprintln!("{err:?}");
        }
    }
}

/// OTLP export configuration.
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - the collector endpoint. If absent,
///   [`OtelConfig::load`] returns [`None`] and spans are not exported.
/// - `OTEL_LEVEL` - optional. An [`EnvFilter`] directive for exported spans.
///   Defaults to `RUST_LOG`.
/// - `OTEL_ENVIRONMENT_NAME` - optional. The `deployment.environment.name`
///   resource attribute. Defaults to `"unknown"`.
#[derive(Debug)]
#[non_exhaustive]
pub struct OtelConfig {
    /// The OTLP/HTTP collector endpoint.
    pub endpoint: Url,
    /// Filter for exported spans.
    pub level: EnvFilter,
    /// Value for `deployment.environment.name`.
    pub environment: String,
}

impl FromEnv for OtelConfig {
    type Error = url::ParseError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: OTEL_ENDPOINT,
                description: "OTLP endpoint to send traces to. If missing, disables OTLP exporting",
                optional: true,
            },
            &EnvItemInfo {
                var: OTEL_LEVEL,
                description: "Filter for exported spans, in RUST_LOG format. Defaults to RUST_LOG",
                optional: true,
            },
            &EnvItemInfo {
                var: OTEL_ENVIRONMENT,
                description: "Deployment environment name attached to exported spans",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let endpoint = Url::from_env_var(OTEL_ENDPOINT)?;

        let level = match Option::<String>::from_env_var(OTEL_LEVEL) {
            Ok(Some(_)) => EnvFilter::from_env(OTEL_LEVEL),
            _ => EnvFilter::from_default_env(),
        };

        let environment =
            String::from_env_var(OTEL_ENVIRONMENT).unwrap_or_else(|_| "unknown".to_owned());

        Ok(Self {
            endpoint,
            level,
            environment,
        })
    }
}

impl OtelConfig {
    /// Load from env vars, returning [`None`] if the endpoint is missing or
    /// unparseable.
    pub fn load() -> Option<Self> {
        Self::from_env().ok()
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, self.environment.clone()),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    /// Build the span exporter and tracer provider.
    pub fn provider(&self) -> Result<OtelGuard, ExporterBuildError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()?;

        let provider = SdkTracerProvider::builder()
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build();

        Ok(OtelGuard(provider, self.level.clone()))
    }
}
