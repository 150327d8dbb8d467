//! Wait schedule between unsuccessful rounds.
//!
//! A normal round ends with a uniformly jittered wait in `[min, max]` so
//! restarts of several bots do not fall into lock-step. A round that hit
//! anti-bot protection waits a fixed, longer cooldown instead.

use std::time::Duration;

use rand::Rng;

/// Why the orchestrator is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Backoff,
    AntiBotCooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    min: Duration,
    max: Duration,
    antibot_cooldown: Duration,
}

impl RetrySchedule {
    /// Bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(min: Duration, max: Duration, antibot_cooldown: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            antibot_cooldown,
        }
    }

    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Jittered wait in `[min, max]`, millisecond resolution.
    #[must_use]
    pub fn sample(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let (lo, hi) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        if lo == hi {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    #[must_use]
    pub fn wait_for(&self, reason: WaitReason) -> Duration {
        match reason {
            WaitReason::Backoff => self.sample(),
            WaitReason::AntiBotCooldown => self.antibot_cooldown,
        }
    }
}
