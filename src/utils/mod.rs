/// Injectable monotonic clocks.
pub mod clock;

/// Loading configuration from environment variables.
pub mod from_env;

/// Prometheus metrics.
pub mod metrics;

/// OpenTelemetry span export.
pub mod otlp;

/// Request spans for axum.
pub mod otel_axum;

/// Tracing subscriber setup.
pub mod tracing;
