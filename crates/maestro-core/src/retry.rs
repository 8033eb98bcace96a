//! Retry backoff for transient failures
//!
//! Exponential backoff: base 500ms, factor 2, jitter plus or minus 20%,
//! capped at 30s.

use std::time::Duration;

/// Base delay before the first retry
const BASE_DELAY_MS: u64 = 500;

/// Backoff multiplier per attempt
const BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound on any single delay
const MAX_DELAY_MS: u64 = 30_000;

/// Jitter fraction applied symmetrically
const JITTER_FRACTION: f64 = 0.2;

/// Delay before retry number `attempt` (1-based)
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = (BASE_DELAY_MS as f64 * BACKOFF_FACTOR.powi(exponent as i32))
        .min(MAX_DELAY_MS as f64);

    // Scale into [1 - jitter, 1 + jitter]
    let jitter = 1.0 - JITTER_FRACTION + 2.0 * JITTER_FRACTION * unit_random();
    let delay = (base * jitter).min(MAX_DELAY_MS as f64) as u64;
    Duration::from_millis(delay)
}

/// Pseudo-random value in [0, 1) from the clock nanos; good enough for
/// jitter without a rand dependency
fn unit_random() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1_000_000) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_within_jitter_bounds() {
        for attempt in 1..=6 {
            let expected = (BASE_DELAY_MS as f64
                * BACKOFF_FACTOR.powi(attempt as i32 - 1))
            .min(MAX_DELAY_MS as f64);
            let low = (expected * (1.0 - JITTER_FRACTION)) as u128;
            let high = (expected * (1.0 + JITTER_FRACTION)).min(MAX_DELAY_MS as f64) as u128;

            let delay = backoff_delay(attempt).as_millis();
            assert!(
                delay >= low && delay <= high,
                "attempt {attempt}: {delay}ms outside [{low}, {high}]"
            );
        }
    }

    #[test]
    fn test_backoff_caps_at_30s() {
        assert!(backoff_delay(30).as_millis() <= u128::from(MAX_DELAY_MS));
    }
}
