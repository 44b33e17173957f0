//! Retry-delay policy for recipe searches.
//!
//! After a failed search the controller waits longer before the next one.
//! The delay function is a tunable policy injected through controller
//! configuration; every variant is monotonically non-decreasing in the retry
//! count and never returns zero, so repeated failures throttle search
//! frequency without ever starving retries.

use crate::fixed::Ticks;
use serde::{Deserialize, Serialize};

/// Search retry-delay policy. Dispatches via enum match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// The same delay regardless of failures.
    Constant { delay: Ticks },
    /// `base + step * retries`, capped.
    Linear { base: Ticks, step: Ticks, cap: Ticks },
    /// `base * 2^retries`, capped.
    Exponential { base: Ticks, cap: Ticks },
}

impl Backoff {
    /// Ticks between searches after `retries` consecutive failures.
    /// Always at least 1.
    pub fn delay(&self, retries: u32) -> Ticks {
        let delay = match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base, step, cap } => base
                .saturating_add(step.saturating_mul(retries as Ticks))
                .min(*cap),
            Backoff::Exponential { base, cap } => {
                let factor = 1u64.checked_shl(retries).unwrap_or(u64::MAX);
                base.saturating_mul(factor).min(*cap)
            }
        };
        delay.max(1)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base: 5,
            step: 5,
            cap: 100,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constant_ignores_retries() {
        let b = Backoff::Constant { delay: 7 };
        assert_eq!(b.delay(0), 7);
        assert_eq!(b.delay(100), 7);
    }

    #[test]
    fn linear_grows_and_caps() {
        let b = Backoff::Linear {
            base: 5,
            step: 5,
            cap: 100,
        };
        assert_eq!(b.delay(0), 5);
        assert_eq!(b.delay(1), 10);
        assert_eq!(b.delay(19), 100);
        assert_eq!(b.delay(500), 100);
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let b = Backoff::Exponential { base: 4, cap: 64 };
        assert_eq!(b.delay(0), 4);
        assert_eq!(b.delay(1), 8);
        assert_eq!(b.delay(4), 64);
        assert_eq!(b.delay(63), 64);
        // Shift overflow saturates at the cap rather than wrapping.
        assert_eq!(b.delay(200), 64);
    }

    #[test]
    fn delay_is_never_zero() {
        assert_eq!(Backoff::Constant { delay: 0 }.delay(3), 1);
        let b = Backoff::Linear {
            base: 0,
            step: 0,
            cap: 0,
        };
        assert_eq!(b.delay(0), 1);
    }

    proptest! {
        #[test]
        fn delay_is_monotonically_non_decreasing(
            base in 0u64..1000,
            step in 0u64..100,
            cap in 1u64..10_000,
            retries in 0u32..64,
        ) {
            for b in [
                Backoff::Constant { delay: base },
                Backoff::Linear { base, step, cap },
                Backoff::Exponential { base, cap },
            ] {
                prop_assert!(b.delay(retries + 1) >= b.delay(retries));
                prop_assert!(b.delay(retries) >= 1);
            }
        }
    }
}
