//! Tracing setup and per-request logging
//!
//! Every HTTP request runs inside an `http_request` span carrying a
//! process-unique `request_id`, so dispatcher audit events and upstream
//! failures logged while handling a batch can be tied back to one POST.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Upstream HTTP plumbing is noisy at
/// `info`.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("http_request", request_id, method = %method, path = %path);
    let started_at = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status();

    span.in_scope(|| {
        info!(
            status = status.as_u16(),
            duration_ms = started_at.elapsed().as_millis(),
            "request summary"
        );

        if status == StatusCode::UNAUTHORIZED {
            warn!("authentication failure");
        } else if status.is_server_error() {
            warn!(status = status.as_u16(), "request failed");
        }
    });

    response
}
