use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `min(base * 2^(attempt-1), max)`.
///
/// Attempt 0 is treated like attempt 1. Overflow saturates at `max`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}
