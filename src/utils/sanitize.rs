//! Cleanup of translated text before it is returned to clients.
//!
//! Models sometimes prefix a line with an error marker or echo the `"<index>: "`
//! numbering they were given. Both are stripped; an echo is only removed when the
//! number matches the line's own index so legitimate text like `"10: 30 PM"`
//! survives on other lines.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::TranslatedLine;

static ERROR_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\[error\]|error:)\s*").expect("error marker pattern is valid")
});

static INDEX_ECHO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*(\d+)\s*:\s*(.*)$").expect("index echo pattern is valid")
});

/// Strip error markers and a matching index echo from one translated line
pub fn sanitize_translation(index: u32, text: &str) -> String {
    let mut current = text.trim();

    if let Some(found) = ERROR_MARKER.find(current) {
        current = &current[found.end()..];
    }

    if let Some(captures) = INDEX_ECHO.captures(current) {
        let echoed = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        if echoed == Some(index) {
            if let Some(rest) = captures.get(2) {
                current = rest.as_str();
            }
        }
    }

    current.trim().to_string()
}

pub fn sanitize_lines(lines: Vec<TranslatedLine>) -> Vec<TranslatedLine> {
    lines
        .into_iter()
        .map(|mut line| {
            line.translated = sanitize_translation(line.index, &line.translated);
            line
        })
        .collect()
}
