// src/models/stats_models.rs
use std::time::Duration;

/// Per-query timing and volume counters, logged by the engine after every
/// recommendation.
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    pub candidates_retrieved: usize,
    pub candidates_returned: usize,
    pub embed_time: Duration,
    pub search_time: Duration,
    pub rank_time: Duration,
    pub total_time: Duration,
}

/// Counters for one feedback-replay training cycle.
#[derive(Debug, Clone, Default)]
pub struct TrainingCycleStats {
    pub processed_count: usize,
    pub error_count: usize,
    pub skipped_no_embedding: usize,
}
