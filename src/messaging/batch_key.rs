use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SEPARATOR: &str = "_batch";

/// Composite `{sessionId}_batch{batchIndex}` id used on the worker protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub session_id: String,
    pub batch_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed batch key: {0}")]
pub struct BatchKeyError(pub String);

impl BatchKey {
    pub fn new(session_id: &str, batch_index: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            batch_index,
        }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.session_id, SEPARATOR, self.batch_index)
    }
}

impl FromStr for BatchKey {
    type Err = BatchKeyError;

    // Session ids may themselves contain "_batch", so split at the last one
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (session_id, index) = s
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| BatchKeyError(s.to_string()))?;
        if session_id.is_empty() {
            return Err(BatchKeyError(s.to_string()));
        }
        let batch_index = index
            .parse::<u32>()
            .map_err(|_| BatchKeyError(s.to_string()))?;
        Ok(Self::new(session_id, batch_index))
    }
}
