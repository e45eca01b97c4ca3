//! Periodic tick source.
//!
//! Ticks are issued on a fixed schedule measured from the start of the run,
//! so a slow tick is absorbed by the following sleep instead of shifting
//! every later tick. A rate of 0 runs unthrottled.

use std::time::{Duration, Instant};

/// Default rate of the command line emulator, in ticks per second.
pub const DEFAULT_CLOCK_RATE: u32 = 128;

/// A fixed-rate tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    period: Option<Duration>,
}

impl Clock {
    /// A clock issuing `rate` ticks per second; 0 means as fast as possible.
    pub fn new(rate: u32) -> Self {
        let period = (rate > 0).then(|| Duration::from_secs(1) / rate);
        Self { period }
    }

    /// A clock that never sleeps.
    pub fn unthrottled() -> Self {
        Self { period: None }
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Call `tick` on schedule until it returns `Ok(false)`, fails, or
    /// `limit` ticks have been issued. Returns the number of ticks issued.
    pub fn run<F, E>(&self, limit: Option<u64>, mut tick: F) -> Result<u64, E>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let start = Instant::now();
        let mut issued: u64 = 0;

        while limit.map_or(true, |l| issued < l) {
            if let Some(period) = self.period {
                let deadline = start + period.saturating_mul(issued.min(u32::MAX as u64) as u32);
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }

            issued += 1;
            if !tick()? {
                break;
            }
        }

        Ok(issued)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_RATE)
    }
}
