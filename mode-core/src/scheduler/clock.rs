//! Tick gating and elapsed-time bookkeeping.

use core::ops::Sub;
use core::time::Duration;

/// Monotonic timestamp accepted by [`Scheduler::tick`](crate::Scheduler::tick).
///
/// Any copyable, ordered instant whose difference is a [`Duration`] qualifies:
/// `std::time::Instant` on hosts, or a plain `Duration` measured from boot
/// when a child scheduler is driven by its parent's uptime.
pub trait TickInstant: Copy + Ord + Sub<Output = Duration> {}

impl<T> TickInstant for T where T: Copy + Ord + Sub<Output = Duration> {}

/// Tracks when the scheduler last ran and how long it has been running.
#[derive(Clone, Debug)]
pub(crate) struct TickClock<I> {
    min_interval: Duration,
    first: Option<I>,
    last: Option<I>,
    ticks: u64,
}

impl<I: TickInstant> TickClock<I> {
    pub(crate) const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            first: None,
            last: None,
            ticks: 0,
        }
    }

    /// Returns the time since the previous tick when `now` may run a tick.
    ///
    /// The first tick always runs with a zero delta. Timestamps earlier than
    /// the previous tick, or closer to it than the minimum interval, are
    /// skipped without updating the clock.
    pub(crate) fn advance(&mut self, now: I) -> Option<Duration> {
        let delta = match self.last {
            None => {
                self.first = Some(now);
                Duration::ZERO
            }
            Some(last) if now < last => return None,
            Some(last) => {
                let delta = now - last;
                if delta < self.min_interval {
                    return None;
                }
                delta
            }
        };
        self.last = Some(now);
        self.ticks += 1;
        Some(delta)
    }

    pub(crate) fn uptime(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last - first,
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub(crate) fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }
}
