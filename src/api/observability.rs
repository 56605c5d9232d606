//! Request telemetry: per-request tracing spans, RED metrics, and the
//! response headers every auth endpoint must carry.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::api::AppState;

/// Headers attached to every response. Auth responses carry tokens, so
/// caches must never hold them.
const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("cache-control", "no-store"),
];

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Wraps every request in a span carrying a fresh request id. The auth
/// middleware records `user_id` into it once the session is resolved, so
/// log lines from deeper layers correlate without re-plumbing identity.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let matched_path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|mp| mp.as_str().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        route = matched_path.clone(),
        user_id = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;

        let latency = start.elapsed();
        let status = response.status().as_u16();

        // 401/403 get their own bucket: on an auth service they are signal,
        // not noise, and alerting keys on them separately.
        let outcome = match status {
            401 | 403 => "denied",
            500.. => "error",
            400.. => "client_error",
            _ => "success",
        };

        // Label with the matched route, not the raw path, so tokens and
        // usernames in URLs never become metric labels.
        let route = matched_path.as_deref().unwrap_or(&uri);
        let labels = [
            ("method", method.clone()),
            ("path", route.to_string()),
            ("status", status.to_string()),
        ];

        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(latency.as_secs_f64());

        info!(
            event = "http_request_finished",
            duration_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            status_code = status,
            outcome = %outcome,
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    for (name, value) in RESPONSE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    response
}
