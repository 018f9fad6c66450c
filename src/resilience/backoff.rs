//! Readiness polling schedule.

use rand::Rng;
use std::time::Duration;

/// Doubling delay between readiness polls, clamped to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessBackoff {
    first: Duration,
    ceiling: Duration,
}

impl ReadinessBackoff {
    pub fn new(first_ms: u64, ceiling_ms: u64) -> Self {
        Self {
            first: Duration::from_millis(first_ms),
            ceiling: Duration::from_millis(ceiling_ms.max(first_ms)),
        }
    }

    /// Wait before the `poll`-th retry; poll 0 goes out immediately.
    ///
    /// A random extra of up to one eighth of the step is added so that
    /// generators started together spread their polls.
    pub fn delay(&self, poll: u32) -> Duration {
        let Some(shift) = poll.checked_sub(1) else {
            return Duration::ZERO;
        };
        let step = 1u32
            .checked_shl(shift)
            .and_then(|multiplier| self.first.checked_mul(multiplier))
            .map_or(self.ceiling, |d| d.min(self.ceiling));

        let spread = step / 8;
        if spread.is_zero() {
            return step;
        }
        step + spread.mul_f64(rand::thread_rng().gen::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_is_immediate() {
        assert_eq!(ReadinessBackoff::new(250, 5000).delay(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_grows_then_levels_off() {
        let schedule = ReadinessBackoff::new(200, 3000);
        let ms = |poll| schedule.delay(poll).as_millis();

        assert!((200..=225).contains(&ms(1)));
        assert!((800..=900).contains(&ms(3)));
        assert!((3000..=3375).contains(&ms(5)));
        assert!((3000..=3375).contains(&ms(33)));
        assert!((3000..=3375).contains(&ms(u32::MAX)));
    }

    #[test]
    fn test_ceiling_never_below_first_step() {
        let schedule = ReadinessBackoff::new(500, 100);
        assert!(schedule.delay(4).as_millis() >= 500);
    }
}
