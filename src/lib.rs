#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Translation Orchestrator
//!
//! Distributed job orchestrator for subtitle translation. A job's lines are split
//! into contiguous batches, each batch is dispatched to one of several remote
//! translation workers under per-worker RPM limits and a shared credential pool
//! with cooldown, and the per-batch results that workers deliver by callback are
//! reassembled into one ordered job result.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - planner, worker selector, credential allocator, dispatcher,
//!   retry coordinator, result aggregator, finalizer and sweeper
//! - [`state_machine`] - job and batch task transition tables
//! - [`models`] - jobs, batch tasks, workers, credentials, retry entries
//! - [`messaging`] - wire messages and the composite batch key
//! - [`store`] - job/credential storage (in-memory and PostgreSQL)
//! - [`services`] - worker client, client notifier, quota collaborator
//! - [`web`] - axum HTTP surface
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use translation_orchestrator::clock::SystemClock;
//! use translation_orchestrator::config::OrchestratorConfig;
//! use translation_orchestrator::orchestration::{Orchestrator, OrchestratorComponents};
//! use translation_orchestrator::services::{HttpClientNotifier, HttpWorkerClient, UnlimitedQuota};
//! use translation_orchestrator::store::InMemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::default();
//! let store = Arc::new(InMemoryStore::with_credentials(["secret-key-0001"]));
//! let timeout = config.dispatch.request_timeout();
//!
//! let orchestrator = Orchestrator::new(
//!     config,
//!     OrchestratorComponents {
//!         jobs: store.clone(),
//!         credentials: store,
//!         worker_client: Arc::new(HttpWorkerClient::new(timeout, "instance-1")?),
//!         notifier: Arc::new(HttpClientNotifier::new(timeout)?),
//!         quota: Arc::new(UnlimitedQuota),
//!         clock: Arc::new(SystemClock),
//!         instance_id: "instance-1".to_string(),
//!     },
//! );
//! # let _ = orchestrator;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod utils;
pub mod web;

pub use config::OrchestratorConfig;
pub use error::{AdmissionError, OrchestratorError, OrchestratorResult};
pub use orchestration::{Orchestrator, OrchestratorComponents};
pub use state_machine::{BatchTaskState, JobState};
