//! Delay schedule between attempts.

use std::time::Duration;

/// Delay before `attempt` (1-based):
///
/// - attempt 1: immediate
/// - attempt 2: `base`
/// - attempt 3+: `4 * base`
pub fn delay_before(attempt: u32, base: Duration) -> Duration {
    match attempt {
        0 | 1 => Duration::ZERO,
        2 => base,
        _ => base.saturating_mul(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule() {
        let base = Duration::from_millis(250);
        assert_eq!(delay_before(1, base), Duration::ZERO);
        assert_eq!(delay_before(2, base), Duration::from_millis(250));
        assert_eq!(delay_before(3, base), Duration::from_secs(1));
        assert_eq!(delay_before(9, base), Duration::from_secs(1));
    }
}
