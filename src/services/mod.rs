//! # Services
//!
//! Outbound collaborators: the worker dispatch client, the client completion
//! notifier and the line-quota service.

pub mod client_notifier;
pub mod quota;
pub mod worker_client;

pub use client_notifier::{ClientNotifier, HttpClientNotifier};
pub use quota::{InMemoryQuota, QuotaError, QuotaService, UnlimitedQuota};
pub use worker_client::{HttpWorkerClient, WorkerClient};
