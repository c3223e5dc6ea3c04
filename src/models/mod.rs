//! # Domain Models
//!
//! Plain data types for jobs, batch tasks, workers, credentials and retry entries.
//! Status fields only change through the transition helpers, which route every
//! move through [`crate::state_machine`].

pub mod batch_task;
pub mod credential;
pub mod job;
pub mod lines;
pub mod retry_entry;
pub mod worker;

pub use batch_task::BatchTask;
pub use credential::{mask_secret, Credential};
pub use job::{progress_percent, Job};
pub use lines::{SubtitleLine, TranslatedLine};
pub use retry_entry::RetryEntry;
pub use worker::Worker;
