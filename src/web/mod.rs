//! # Web API
//!
//! Axum HTTP surface for clients (job submission and queries), workers (batch
//! callbacks) and operators (health and worker snapshots).
//!
//! | Method | Path                                 | Handler                          |
//! |--------|--------------------------------------|----------------------------------|
//! | POST   | `/api/jobs`                          | [`handlers::jobs::submit_job`]   |
//! | GET    | `/api/jobs/:session_id`              | [`handlers::jobs::get_job_status`] |
//! | GET    | `/api/jobs/:session_id/results`      | [`handlers::jobs::get_job_results`] |
//! | POST   | `/callback/:session_id/:batch_index` | [`handlers::callbacks::batch_callback`] |
//! | POST   | `/callback/:batch_key`               | [`handlers::callbacks::keyed_batch_callback`] |
//! | GET    | `/api/workers`                       | [`handlers::health::list_workers`] |
//! | GET    | `/health`                            | [`handlers::health::basic_health`] |

pub mod handlers;
pub mod middleware;
pub mod response_types;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use response_types::{ApiError, ApiResult};
pub use state::AppState;

/// Build the application router with its middleware stack
pub fn create_app(state: AppState) -> Router {
    let request_timeout = state.orchestrator.config().web.request_timeout();

    let router = Router::new()
        .route("/api/jobs", post(handlers::jobs::submit_job))
        .route("/api/jobs/:session_id", get(handlers::jobs::get_job_status))
        .route(
            "/api/jobs/:session_id/results",
            get(handlers::jobs::get_job_results),
        )
        .route("/api/workers", get(handlers::health::list_workers))
        .route(
            "/callback/:session_id/:batch_index",
            post(handlers::callbacks::batch_callback),
        )
        .route(
            "/callback/:batch_key",
            post(handlers::callbacks::keyed_batch_callback),
        )
        .route("/health", get(handlers::health::basic_health));

    middleware::apply_middleware_stack(router, request_timeout).with_state(state)
}
