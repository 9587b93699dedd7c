//! Property tests for the per-tenant circuit breaker's sliding-window trip.
//!
//! Run with: cargo test --test property_tests

use partner_gateway_breaker::BreakerRegistry;
use partner_gateway_config::{BreakerParams, PoolParams};
use partner_gateway_core::{GatewayError, TenantId};
use partner_gateway_pool::PoolRegistry;
use proptest::prelude::*;
use std::time::Duration;
use tokio::runtime::Runtime;

fn pool_cfg() -> PoolParams {
    PoolParams {
        core_workers: 1,
        max_workers: 2,
        queue_capacity: 16,
        idle_keep_alive: Duration::from_millis(50),
    }
}

/// Mirrors the breaker's own closed-state bookkeeping: a capped window of
/// the last `slidingWindowSize` outcomes, evaluated after every call once
/// `minCallsBeforeEval` have landed. `openStateDuration` is set far beyond
/// any test's wall-clock time, so once tripped the breaker never recovers
/// mid-sequence and recording simply stops.
fn predicts_open(cfg: &BreakerParams, outcomes: &[bool]) -> bool {
    let mut window: Vec<bool> = Vec::new();
    for &success in outcomes {
        window.push(success);
        if window.len() > cfg.sliding_window_size {
            window.remove(0);
        }
        if window.len() >= cfg.min_calls_before_eval {
            let failures = window.iter().filter(|s| !**s).count();
            let failure_rate = failures as f64 / window.len() as f64;
            if failure_rate * 100.0 >= cfg.failure_rate_threshold_pct {
                return true;
            }
        }
    }
    false
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: feeding a sequence of successes/failures through the real
    /// registry ends with the breaker open exactly when the sliding-window
    /// model above says it should.
    #[test]
    fn breaker_trips_exactly_when_model_predicts(
        window_size in 2usize..=10,
        min_calls in 1usize..=10,
        threshold_pct in 10.0f64..=90.0,
        outcomes in proptest::collection::vec(any::<bool>(), 1..=15),
    ) {
        let cfg = BreakerParams {
            failure_rate_threshold_pct: threshold_pct,
            min_calls_before_eval: min_calls.min(window_size),
            open_state_duration: Duration::from_secs(3600),
            sliding_window_size: window_size,
            half_open_probe_count: 1,
        };

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breakers = BreakerRegistry::new();
            let pool = PoolRegistry::new();
            let tenant = TenantId::new("acme").unwrap();

            for &succeeds in &outcomes {
                let _ = breakers
                    .execute(&tenant, &cfg, &pool, &pool_cfg(), move || {
                        if succeeds {
                            Ok::<_, GatewayError>(())
                        } else {
                            Err(GatewayError::Transient {
                                tenant: TenantId::new("acme").unwrap(),
                                message: "boom".into(),
                            })
                        }
                    })
                    .await;
            }

            let expected_open = predicts_open(&cfg, &outcomes);
            let actually_open = !breakers.is_healthy(&tenant);
            prop_assert_eq!(
                actually_open,
                expected_open,
                "outcomes={:?} window={} min_calls={} threshold={}",
                outcomes,
                window_size,
                min_calls,
                threshold_pct
            );
            Ok(())
        })?;
    }

    /// Property: a breaker that never sees a failure never trips, regardless
    /// of window size or threshold.
    #[test]
    fn all_successes_never_trips(
        window_size in 1usize..=10,
        min_calls in 1usize..=10,
        call_count in 1usize..=20,
    ) {
        let cfg = BreakerParams {
            failure_rate_threshold_pct: 1.0,
            min_calls_before_eval: min_calls.min(window_size),
            open_state_duration: Duration::from_secs(3600),
            sliding_window_size: window_size,
            half_open_probe_count: 1,
        };

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breakers = BreakerRegistry::new();
            let pool = PoolRegistry::new();
            let tenant = TenantId::new("acme").unwrap();

            for _ in 0..call_count {
                let _ = breakers
                    .execute(&tenant, &cfg, &pool, &pool_cfg(), || Ok::<_, GatewayError>(()))
                    .await;
            }

            prop_assert!(breakers.is_healthy(&tenant));
            Ok(())
        })?;
    }
}
