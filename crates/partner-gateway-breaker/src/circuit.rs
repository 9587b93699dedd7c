//! The per-tenant circuit state machine.
//!
//! `try_acquire`/`record_success`/`record_failure`/`transition_to` around a
//! count-based sliding window of the last N outcomes, one instance per
//! tenant. See DESIGN.md for why the window is count-based rather than
//! time-based.

use crate::state::{BreakerPhase, BreakerState, WindowTotals};
use partner_gateway_config::BreakerParams;
use std::collections::VecDeque;
use std::time::Instant;

/// A ring buffer of the last `slidingWindowSize` terminal outcomes
/// (`true` = success), plus the `HALF_OPEN` probe bookkeeping and the
/// `not-permitted` telemetry counter that never enters the window.
pub(crate) struct Circuit {
    state: BreakerPhase,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_permits_left: usize,
    half_open_successes: usize,
    not_permitted: u64,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: BreakerPhase::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_permits_left: 0,
            half_open_successes: 0,
            not_permitted: 0,
        }
    }

    pub(crate) fn state(&self) -> BreakerPhase {
        self.state
    }

    /// Call-gating check. May itself drive the `OPEN` → `HALF_OPEN`
    /// transition when `openStateDuration` has elapsed.
    pub(crate) fn try_acquire(&mut self, cfg: &BreakerParams) -> bool {
        match self.state {
            BreakerPhase::Closed => true,
            BreakerPhase::Open => {
                let opened_at = self.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= cfg.open_state_duration {
                    self.transition_to(BreakerPhase::HalfOpen, cfg);
                    self.half_open_permits_left =
                        self.half_open_permits_left.saturating_sub(1);
                    true
                } else {
                    self.not_permitted += 1;
                    false
                }
            }
            BreakerPhase::HalfOpen => {
                if self.half_open_permits_left > 0 {
                    self.half_open_permits_left -= 1;
                    true
                } else {
                    self.not_permitted += 1;
                    false
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, cfg: &BreakerParams) {
        match self.state {
            BreakerPhase::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= cfg.half_open_probe_count {
                    self.transition_to(BreakerPhase::Closed, cfg);
                }
            }
            BreakerPhase::Closed => {
                self.push_outcome(true, cfg.sliding_window_size);
                self.evaluate_window(cfg);
            }
            BreakerPhase::Open => {}
        }
    }

    pub(crate) fn record_failure(&mut self, cfg: &BreakerParams) {
        match self.state {
            BreakerPhase::HalfOpen => {
                self.transition_to(BreakerPhase::Open, cfg);
            }
            BreakerPhase::Closed => {
                self.push_outcome(false, cfg.sliding_window_size);
                self.evaluate_window(cfg);
            }
            BreakerPhase::Open => {}
        }
    }

    pub(crate) fn force_open(&mut self, cfg: &BreakerParams) {
        self.transition_to(BreakerPhase::Open, cfg);
    }

    pub(crate) fn force_closed(&mut self, cfg: &BreakerParams) {
        self.transition_to(BreakerPhase::Closed, cfg);
    }

    pub(crate) fn force_half_open(&mut self, cfg: &BreakerParams) {
        self.transition_to(BreakerPhase::HalfOpen, cfg);
    }

    fn push_outcome(&mut self, success: bool, cap: usize) {
        self.window.push_back(success);
        while self.window.len() > cap {
            self.window.pop_front();
        }
    }

    fn evaluate_window(&mut self, cfg: &BreakerParams) {
        if self.window.len() < cfg.min_calls_before_eval {
            return;
        }
        let failures = self.window.iter().filter(|success| !**success).count();
        let failure_rate = failures as f64 / self.window.len() as f64;
        if failure_rate >= cfg.failure_rate_threshold_pct / 100.0 {
            self.transition_to(BreakerPhase::Open, cfg);
        }
    }

    fn transition_to(&mut self, to: BreakerPhase, cfg: &BreakerParams) {
        if self.state == to {
            return;
        }
        match to {
            BreakerPhase::Closed => {
                self.window.clear();
            }
            BreakerPhase::Open => {
                self.opened_at = Some(Instant::now());
            }
            BreakerPhase::HalfOpen => {
                self.half_open_permits_left = cfg.half_open_probe_count;
                self.half_open_successes = 0;
            }
        }
        self.state = to;
    }

    pub(crate) fn snapshot(&self) -> BreakerState {
        let failures = self.window.iter().filter(|success| !**success).count();
        BreakerState {
            state: self.state,
            opened_at_millis_ago: self
                .opened_at
                .filter(|_| matches!(self.state, BreakerPhase::Open | BreakerPhase::HalfOpen))
                .map(|t| t.elapsed().as_millis() as u64),
            half_open_permits_left: self.half_open_permits_left,
            totals: WindowTotals {
                samples: self.window.len(),
                failures,
                successes: self.window.len() - failures,
                not_permitted: self.not_permitted,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params() -> BreakerParams {
        BreakerParams {
            failure_rate_threshold_pct: 50.0,
            min_calls_before_eval: 4,
            open_state_duration: Duration::from_millis(30),
            sliding_window_size: 4,
            half_open_probe_count: 2,
        }
    }

    #[test]
    fn trips_open_once_failure_rate_meets_threshold() {
        let cfg = params();
        let mut circuit = Circuit::new();
        assert!(circuit.try_acquire(&cfg));
        circuit.record_failure(&cfg);
        assert!(circuit.try_acquire(&cfg));
        circuit.record_failure(&cfg);
        assert_eq!(circuit.state(), BreakerPhase::Closed); // below minCallsBeforeEval
        circuit.record_success(&cfg);
        circuit.record_failure(&cfg);
        assert_eq!(circuit.state(), BreakerPhase::Open);
    }

    #[test]
    fn below_min_calls_never_trips_regardless_of_rate() {
        let cfg = BreakerParams {
            min_calls_before_eval: 100,
            ..params()
        };
        let mut circuit = Circuit::new();
        for _ in 0..10 {
            circuit.record_failure(&cfg);
        }
        assert_eq!(circuit.state(), BreakerPhase::Closed);
    }

    #[test]
    fn open_rejects_until_wait_duration_elapses() {
        let cfg = params();
        let mut circuit = Circuit::new();
        circuit.force_open(&cfg);
        assert!(!circuit.try_acquire(&cfg));
        std::thread::sleep(Duration::from_millis(40));
        assert!(circuit.try_acquire(&cfg));
        assert_eq!(circuit.state(), BreakerPhase::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_all_probes_succeed() {
        let cfg = params();
        let mut circuit = Circuit::new();
        circuit.force_half_open(&cfg);
        assert!(circuit.try_acquire(&cfg));
        circuit.record_success(&cfg);
        assert_eq!(circuit.state(), BreakerPhase::HalfOpen);
        assert!(circuit.try_acquire(&cfg));
        circuit.record_success(&cfg);
        assert_eq!(circuit.state(), BreakerPhase::Closed);
    }

    #[test]
    fn half_open_reopens_on_any_probe_failure() {
        let cfg = params();
        let mut circuit = Circuit::new();
        circuit.force_half_open(&cfg);
        assert!(circuit.try_acquire(&cfg));
        circuit.record_failure(&cfg);
        assert_eq!(circuit.state(), BreakerPhase::Open);
    }

    #[test]
    fn half_open_rejects_beyond_probe_count() {
        let cfg = params();
        let mut circuit = Circuit::new();
        circuit.force_half_open(&cfg);
        assert!(circuit.try_acquire(&cfg));
        assert!(circuit.try_acquire(&cfg));
        assert!(!circuit.try_acquire(&cfg));
    }

    #[test]
    fn not_permitted_calls_do_not_enter_the_window() {
        let cfg = params();
        let mut circuit = Circuit::new();
        circuit.force_open(&cfg);
        for _ in 0..5 {
            circuit.try_acquire(&cfg);
        }
        assert_eq!(circuit.snapshot().totals.samples, 0);
        assert_eq!(circuit.snapshot().totals.not_permitted, 5);
    }
}
