//! The observable snapshot of one tenant's pool.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    /// Tasks currently executing (on a worker thread or the caller-runs path).
    pub active_count: usize,
    /// Live worker threads, between `coreWorkers` and `maxWorkers`.
    pub pool_size: usize,
    /// Jobs waiting in the bounded queue.
    pub queue_depth: usize,
    /// Monotonic count of tasks that have finished (success or failure).
    pub completed_count: u64,
    pub shutting_down: bool,
}
