use crate::utils::{
    from_env::FromEnvVar,
    otlp::{OtelConfig, OtelGuard},
};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

const TRACING_LOG_JSON: &str = "TRACING_LOG_JSON";

/// Install the fmt layer, in JSON if `TRACING_LOG_JSON` is set, and then
/// install the registry as the global default.
macro_rules! install_fmt {
    ($registry:ident, $filter:ident) => {{
        if bool::from_env_var(TRACING_LOG_JSON).unwrap_or(false) {
            let fmt = tracing_subscriber::fmt::layer().json().with_filter($filter);
            $registry.with(fmt).init();
        } else {
            let fmt = tracing_subscriber::fmt::layer().with_filter($filter);
            $registry.with(fmt).init();
        }
    }};
}

/// Init tracing, returning a guard for the OTLP provider if one was started.
///
/// Log output is filtered by `RUST_LOG`. When [`OtelConfig`] loads from the
/// environment, spans are also exported over OTLP. A failure to build the
/// exporter is logged and export is skipped.
///
/// ## Panics
///
/// This function will panic if a global subscriber has already been set.
pub fn init_tracing() -> Option<OtelGuard> {
    let registry = tracing_subscriber::registry();
    let filter = EnvFilter::from_default_env();

    let otel = OtelConfig::load().map(|cfg| cfg.provider());

    match otel {
        Some(Ok(guard)) => {
            let registry = registry.with(guard.layer());
            install_fmt!(registry, filter);
            Some(guard)
        }
        Some(Err(err)) => {
            install_fmt!(registry, filter);
            tracing::warn!(%err, "Failed to build OTLP exporter, spans will not be exported");
            None
        }
        None => {
            install_fmt!(registry, filter);
            tracing::debug!("No OTEL config found, using default tracing");
            None
        }
    }
}
