//! Forward-stage retry delay: exponential backoff with uniform jitter,
//! `initialDelay * backoffMultiplier^(attempt-1)` randomized by
//! ± `jitterFraction`.

use partner_gateway_config::RetryParams;
use rand::Rng;
use std::time::Duration;

/// Delay before retry attempt `attempt` (1-indexed: the delay before the
/// *second* call is `delay_for(params, 1)`).
pub fn delay_for(params: &RetryParams, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let base = params.initial_delay.mul_f64(params.backoff_multiplier.powi(exponent));

    if params.jitter_fraction <= 0.0 {
        return base;
    }
    let mut rng = rand::thread_rng();
    let delta = base.as_secs_f64() * params.jitter_fraction;
    let jittered = rng.gen_range((base.as_secs_f64() - delta).max(0.0)..=(base.as_secs_f64() + delta));
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RetryParams {
        RetryParams {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.0,
        }
    }

    #[test]
    fn grows_exponentially_without_jitter() {
        let p = params();
        assert_eq!(delay_for(&p, 1), Duration::from_millis(100));
        assert_eq!(delay_for(&p, 2), Duration::from_millis(200));
        assert_eq!(delay_for(&p, 3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_the_configured_fraction() {
        let p = RetryParams {
            jitter_fraction: 0.2,
            ..params()
        };
        for _ in 0..50 {
            let delay = delay_for(&p, 2);
            assert!(delay >= Duration::from_millis(160) && delay <= Duration::from_millis(240));
        }
    }
}
