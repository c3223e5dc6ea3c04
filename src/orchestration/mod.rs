//! # Orchestration Engine
//!
//! Scheduling core that turns one translation request into batches, spreads them
//! over rate-limited workers and a cooling-down credential pool, and reassembles
//! the asynchronously delivered results.
//!
//! ## Core Components
//!
//! - **batch_planner**: splits `[0, totalLines)` into contiguous batches
//! - **rate_limiter** / **worker_selector**: sliding RPM windows and load-aware worker choice
//! - **credential_allocator**: cooldown-aware credential partitioning and usage accounting
//! - **dispatcher**: persists `sent` before each outbound call, bounded by worker count
//! - **retry_coordinator**: drains the durable per-job retry queue
//! - **result_aggregator**: idempotent callback handling and progress
//! - **job_finalizer**: merge, final status, quota refund and client notification
//! - **sweeper**: periodic resume, drain, expiry and finalization
//! - **orchestrator**: the [`Orchestrator`] facade wiring everything together
//!
//! ## Flow
//!
//! ```text
//! submit → plan → {select worker, allocate credentials} → dispatch → worker
//!        → callback → aggregate → (failure) retry queue → dispatch → ...
//! ```

pub mod batch_planner;
pub mod context;
pub mod credential_allocator;
pub mod dispatcher;
pub mod error_classifier;
pub mod job_finalizer;
pub mod job_locks;
pub mod orchestrator;
pub mod rate_limiter;
pub mod result_aggregator;
pub mod retry_coordinator;
pub mod sweeper;
pub mod worker_selector;

pub use batch_planner::{plan_batches, BatchPlan};
pub use context::OrchestratorContext;
pub use credential_allocator::{partition, Allocation, CredentialAllocator};
pub use dispatcher::{DispatchOutcome, Dispatcher, DistributionReport};
pub use error_classifier::{classify_callback_failure, FailureCategory};
pub use job_finalizer::{merge_completed, FinalizationResult, JobFinalizer};
pub use job_locks::JobLocks;
pub use orchestrator::{task_stats, Orchestrator, OrchestratorComponents};
pub use rate_limiter::SlidingWindow;
pub use result_aggregator::{CallbackOutcome, CallbackReceipt, ResultAggregator};
pub use retry_coordinator::{DrainReport, RetryCoordinator, RetryOutcome};
pub use sweeper::{JobSweeper, SweepReport};
pub use worker_selector::{WorkerLease, WorkerSelectionError, WorkerSelector};
