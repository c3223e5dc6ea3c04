use proptest::prelude::*;

/// (total_lines, batch_size, merge_threshold)
pub fn batching_strategy() -> impl Strategy<Value = (u32, u32, u32)> {
    (0u32..2_000, 1u32..120, 0u32..40)
}

/// Worker RPM limits, one entry per worker
pub fn rpm_limits_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..8, 1..5)
}

/// Seconds to advance the clock before each selection attempt
pub fn tick_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(
        prop_oneof![
            3 => Just(0i64),
            2 => 1i64..20,
            1 => 20i64..90,
        ],
        1..120,
    )
}

/// Cooling flag per credential in the pool
pub fn cooling_pool_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..10)
}

pub fn batch_count_strategy() -> impl Strategy<Value = usize> {
    1usize..12
}

/// Progress reports as worker callbacks might produce them, possibly past the total
pub fn progress_reports_strategy() -> impl Strategy<Value = (u32, Vec<u32>)> {
    (1u32..500).prop_flat_map(|total| (Just(total), prop::collection::vec(0..total * 2, 0..40)))
}

pub fn secret_for(position: usize) -> String {
    format!("AIzaSy-pool-secret-{position:04}")
}
