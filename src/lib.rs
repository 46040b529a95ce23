//! Backend for a personal portfolio site.
//!
//! - [`spotify`] reports what the site owner is listening to. Access tokens
//!   are cached by a [`spotify::TokenCache`] and refreshed on demand.
//! - [`blog`] reads markdown posts and their front matter from disk.
//! - [`server`] exposes both as a small JSON API.
//!
//! [`init`] sets up tracing and metrics for the binary.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

// Used by the binary.
use eyre as _;

pub mod blog;

/// Short-lived memo for upstream responses.
pub mod cache;

pub mod server;

pub mod spotify;

pub mod utils;

/// Re-exports of common dependencies.
pub mod deps {
    pub use metrics;
    pub use tracing;
    pub use tracing_subscriber;
}

/// Init tracing and the Prometheus exporter, returning the OTLP guard if
/// span export is enabled. Hold the guard until the end of `main`.
///
/// ## Env Reads
///
/// - `RUST_LOG` and `TRACING_LOG_JSON`, see [`utils::tracing::init_tracing`].
/// - The OTLP variables, see [`utils::otlp::OtelConfig`].
/// - `METRICS_PORT`, see [`utils::metrics::MetricsConfig`].
///
/// ## Panics
///
/// Panics if a global subscriber or metrics recorder is already installed,
/// or if called outside a tokio runtime.
pub fn init() -> Option<utils::otlp::OtelGuard> {
    let guard = utils::tracing::init_tracing();
    utils::metrics::init_metrics();
    guard
}
