//! # Structured Logging
//!
//! Environment-aware `tracing` setup for the orchestrator. Console output is
//! human readable by default and switches to JSON lines when
//! `ORCHESTRATOR_LOG_FORMAT=json`. `RUST_LOG` overrides the level chosen from the
//! deployment environment (`ORCHESTRATOR_ENV`, falling back to `APP_ENV`).

use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static SUBSCRIBER: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once; later calls are no-ops
pub fn init_structured_logging() {
    SUBSCRIBER.get_or_init(|| {
        let environment = deployment_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(&environment)));
        let json = json_requested();

        let console = fmt::layer().with_target(true).with_thread_ids(true);
        let console = if json {
            console.with_ansi(false).json().with_filter(filter).boxed()
        } else {
            console.with_ansi(true).with_filter(filter).boxed()
        };

        // Test harnesses may have installed a subscriber already
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Tracing subscriber already installed, keeping it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json,
            "🔧 LOGGING: Structured logging ready"
        );
    });
}

fn deployment_environment() -> String {
    std::env::var("ORCHESTRATOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_level(environment: &str) -> &'static str {
    if environment == "production" {
        "info"
    } else {
        "debug"
    }
}

fn json_requested() -> bool {
    std::env::var("ORCHESTRATOR_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"))
}

/// Uniform record for job lifecycle steps (accept, finalize, expire)
pub fn log_job_operation(operation: &str, session_id: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation,
        session_id,
        status,
        details,
        "📋 JOB"
    );
}

/// Uniform record for batch lifecycle steps (dispatch, complete, fail, exhaust)
pub fn log_batch_operation(
    operation: &str,
    session_id: &str,
    batch_index: u32,
    worker_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation,
        session_id,
        batch_index,
        worker_id,
        status,
        details,
        "📦 BATCH"
    );
}

/// Errors from background work that has no caller to return them to
pub fn log_error(component: &str, operation: &str, error: &str, session_id: Option<&str>) {
    tracing::error!(
        component,
        operation,
        error,
        session_id,
        "❌ BACKGROUND_ERROR"
    );
}
