pub mod sanitize;

pub use sanitize::{sanitize_lines, sanitize_translation};
