use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, num::ParseIntError};

const METRICS_PORT: &str = "METRICS_PORT";

/// Access tokens issued by the authorization server.
pub const TOKEN_REFRESHES: &str = "portfolio.token.refreshes";
/// Failed refresh-token exchanges.
pub const TOKEN_REFRESH_ERRORS: &str = "portfolio.token.refresh_errors";
/// Currently-playing lookups sent upstream.
pub const NOW_PLAYING_REQUESTS: &str = "portfolio.now_playing.requests";
/// Currently-playing lookups that ended in an error response.
pub const NOW_PLAYING_ERRORS: &str = "portfolio.now_playing.errors";
/// Responses served from the now-playing response cache.
pub const RESPONSE_CACHE_HITS: &str = "portfolio.response_cache.hits";
/// Blog posts read from disk.
pub const POST_READS: &str = "portfolio.posts.reads";

/// Prometheus exporter configuration.
///
/// Uses the following environment variables:
/// - `METRICS_PORT` - optional. Port for the scrape endpoint. Defaults to
///   9000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// The port on which the exporter listens.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9000 }
    }
}

impl From<Option<u16>> for MetricsConfig {
    fn from(port: Option<u16>) -> Self {
        port.map(|port| Self { port }).unwrap_or_default()
    }
}

impl FromEnv for MetricsConfig {
    type Error = ParseIntError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![&EnvItemInfo {
            var: METRICS_PORT,
            description: "Port on which to serve Prometheus metrics. Defaults to 9000",
            optional: true,
        }]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        Option::<u16>::from_env_var(METRICS_PORT).map(Into::into)
    }
}

fn describe() {
    describe_counter!(TOKEN_REFRESHES, Unit::Count, "Access tokens issued");
    describe_counter!(TOKEN_REFRESH_ERRORS, Unit::Count, "Failed token refreshes");
    describe_counter!(NOW_PLAYING_REQUESTS, Unit::Count, "Currently-playing lookups");
    describe_counter!(NOW_PLAYING_ERRORS, Unit::Count, "Failed currently-playing lookups");
    describe_counter!(RESPONSE_CACHE_HITS, Unit::Count, "Now-playing cache hits");
    describe_counter!(POST_READS, Unit::Count, "Blog posts read");
}

/// Install the Prometheus exporter on `0.0.0.0:METRICS_PORT`.
///
/// ## Panics
///
/// This function must be called from within a tokio runtime, and will panic
/// if a global metrics recorder is already installed.
pub fn init_metrics() {
    let cfg = MetricsConfig::from_env().unwrap_or_default();
    init_metrics_with(cfg);
}

/// Install the Prometheus exporter with an explicit config. See
/// [`init_metrics`].
pub fn init_metrics_with(cfg: MetricsConfig) {
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    if let Err(err) = PrometheusBuilder::new().with_http_listener(addr).install() {
        panic!("failed to install prometheus exporter: {err}");
    }
    describe();
}
