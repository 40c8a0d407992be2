//! Production randomness backed by `fastrand`.

use std::time::Duration;

use crate::kernel::BaseRandomizer;

/// Thread-local PRNG randomizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastRandomizer;

impl BaseRandomizer for FastRandomizer {
    fn pick_index(&self, len: usize) -> usize {
        fastrand::usize(..len)
    }

    fn duration_between(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let millis = fastrand::u64(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_stays_in_range() {
        let rng = FastRandomizer;
        let min = Duration::from_secs(30);
        let max = Duration::from_secs(90);
        for _ in 0..1_000 {
            let d = rng.duration_between(min, max);
            assert!(d >= min && d <= max, "{:?} outside range", d);
        }
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let rng = FastRandomizer;
        let d = Duration::from_secs(120);
        assert_eq!(rng.duration_between(d, d), d);
    }

    #[test]
    fn test_pick_index_in_bounds() {
        let rng = FastRandomizer;
        for _ in 0..1_000 {
            assert!(rng.pick_index(7) < 7);
        }
    }
}
