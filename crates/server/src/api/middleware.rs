//! Request metrics middleware.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{
    HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION, IMAGE_FETCHES,
};

/// Route template of the result endpoint.
pub const IMAGE_ROUTE: &str = "/api/v1/image/{id}";

/// Label for requests that matched no route. Raw paths would give every
/// scanned URL its own series.
const UNMATCHED: &str = "unmatched";

/// Records duration, count and in-flight gauge per route template, and what
/// each poll of the result endpoint was told.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED, |matched| matched.as_str())
        .to_string();

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let status = response.status();
    let labels = [method.as_str(), route.as_str(), status.as_str()];
    HTTP_REQUEST_DURATION
        .with_label_values(&labels)
        .observe(start.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();

    if method == Method::GET && route == IMAGE_ROUTE {
        IMAGE_FETCHES
            .with_label_values(&[fetch_outcome(status)])
            .inc();
    }

    response
}

fn fetch_outcome(status: StatusCode) -> &'static str {
    match status {
        StatusCode::OK => "ready",
        StatusCode::ACCEPTED => "pending",
        StatusCode::GONE => "gone",
        StatusCode::UNPROCESSABLE_ENTITY => "failed",
        StatusCode::NOT_FOUND => "unknown",
        _ => "error",
    }
}
