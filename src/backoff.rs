//! Retry backoff policies for producers blocked on a full ring.
//!
//! The retry semantics are fixed (keep trying until the push lands; only
//! source exhaustion ends a producer) but the delay between attempts is an
//! injectable, independently testable policy. The default is a uniformly
//! random 25-75 us pause.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay schedule applied between push retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// The same pause on every attempt.
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },

    /// Uniformly random pause in `[min, max]`, decorrelating producers
    /// that hit a full ring at the same instant.
    Randomized {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },

    /// Doubling pause starting at `base`, saturating at `cap`.
    Exponential {
        #[serde(with = "humantime_serde")]
        base: Duration,
        #[serde(with = "humantime_serde")]
        cap: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Randomized {
            min: Duration::from_micros(25),
            max: Duration::from_micros(75),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Randomized { min, max } => {
                if min >= max {
                    min
                } else {
                    rand::thread_rng().gen_range(min..=max)
                }
            }
            Self::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}
