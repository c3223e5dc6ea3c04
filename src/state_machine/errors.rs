use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid {entity} transition from {from} to {to} on {event}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
        event: &'static str,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
