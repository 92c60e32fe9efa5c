use std::time::Duration;

use rand::Rng;

/// Delay before the next fetch after `attempt` consecutive broker errors.
///
/// Doubles from `base` per attempt up to `max`, then picks uniformly from the
/// upper half of that window so a fleet of workers does not retry in lockstep.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let window = base.saturating_mul(factor).min(max);

    let millis = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    if millis < 2 {
        return window;
    }
    Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
}
