//! # Web API Middleware
//!
//! Request ids, request tracing and a request timeout.

pub mod request_id;

use axum::middleware;
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Outermost layer last: request id, then timeout, then tracing
pub fn apply_middleware_stack(router: Router<AppState>, request_timeout: Duration) -> Router<AppState> {
    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(request_id::add_request_id))
}
