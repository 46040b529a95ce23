use axum::{
    extract::{MatchedPath, Request},
    response::Response,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A [`Layer`] that runs each request inside an `info` span. The span joins
/// the caller's trace when a W3C `traceparent` header is present, and
/// records the response status once the handler finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpanLayer;

/// The service produced by [`RequestSpanLayer`].
#[derive(Debug, Clone)]
pub struct RequestSpanService<S> {
    inner: S,
}

impl<S> Layer<S> for RequestSpanLayer {
    type Service = RequestSpanService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestSpanService { inner }
    }
}

impl<S> Service<Request> for RequestSpanService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let parent_context = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&opentelemetry_http::HeaderExtractor(req.headers()))
        });

        let method = req.method().to_string();
        let path = req.uri().path().to_owned();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|r| r.as_str().to_owned())
            .unwrap_or_else(|| path.clone());
        let name = format!("{method} {route}");

        let span = info_span!(
            "HTTP request",
            "otel.name" = name.as_str(),
            "otel.kind" = "server",
            "http.request.method" = method.as_str(),
            "url.path" = path.as_str(),
            "http.route" = route.as_str(),
            "http.response.status_code" = tracing::field::Empty,
        );
        span.set_parent(parent_context);

        // Only the polled service is ready. Leave a fresh clone in its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let resp = inner.call(req).instrument(span.clone()).await?;
            span.record("http.response.status_code", resp.status().as_u16());
            Ok(resp)
        })
    }
}
