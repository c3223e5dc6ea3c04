//! # Web API Request Handlers
//!
//! Organized by caller: clients use `jobs`, workers use `callbacks`, operators and
//! load balancers use `health`.

pub mod callbacks;
pub mod health;
pub mod jobs;
