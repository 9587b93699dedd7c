//! The observable snapshot of one tenant's breaker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerPhase {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF_OPEN")]
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowTotals {
    pub samples: usize,
    pub failures: usize,
    pub successes: usize,
    /// Telemetry only: calls rejected while `OPEN`/exhausted `HALF_OPEN`.
    /// Never enters the sliding window, so it cannot itself trip or
    /// entrench the breaker.
    pub not_permitted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    pub state: BreakerPhase,
    /// Millis since `openedAt`, `None` outside `OPEN`/`HALF_OPEN`.
    pub opened_at_millis_ago: Option<u64>,
    pub half_open_permits_left: usize,
    pub totals: WindowTotals,
}
