// State machines for jobs and batch tasks
//
// States and events are plain enums; the allowed transitions live in one table per
// entity so illegal moves (e.g. completed -> sent) fail by construction.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::{BatchEvent, JobEvent};
pub use states::{BatchTaskState, JobState};
pub use transitions::{batch_transition, job_transition};
