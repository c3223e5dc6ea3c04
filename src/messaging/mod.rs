//! # Messaging Module
//!
//! JSON messages exchanged with clients and workers, and the composite batch key
//! that correlates worker callbacks with batch tasks.

pub mod batch_key;
pub mod message;

pub use batch_key::{BatchKey, BatchKeyError};
pub use message::*;
