//! # Batch Planner
//!
//! Splits `[0, total_lines)` into contiguous batches. Every batch except the
//! last has exactly `batch_size` lines; once the remainder at the cursor fits in
//! `batch_size + merge_threshold` it becomes the final batch, so no undersized
//! tail batch is ever emitted.

use serde::{Deserialize, Serialize};

/// Line range assigned to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan {
    pub batch_index: u32,
    pub start_line_index: u32,
    pub line_count: u32,
}

impl BatchPlan {
    pub fn end_line_index(&self) -> u32 {
        self.start_line_index + self.line_count
    }
}

/// Plan batches for `total_lines` lines; a zero `batch_size` is treated as 1
pub fn plan_batches(total_lines: u32, batch_size: u32, merge_threshold: u32) -> Vec<BatchPlan> {
    let size = batch_size.max(1);
    let fold_limit = size.saturating_add(merge_threshold);

    let mut plans = Vec::new();
    let mut cursor = 0u32;
    while cursor < total_lines {
        let remaining = total_lines - cursor;
        let line_count = if remaining <= fold_limit { remaining } else { size };
        plans.push(BatchPlan {
            batch_index: plans.len() as u32,
            start_line_index: cursor,
            line_count,
        });
        cursor += line_count;
    }
    plans
}
