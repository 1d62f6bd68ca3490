//! Backoff scheduling between capacity checks.
//!
//! `BackoffScheduler` walks a finite schedule of delays on consecutive
//! exhaustion cycles and starts over whenever an item gets through. Once the
//! schedule has been walked past its end the run is out of retries.
//!
//! Waiting is delegated to a `Sleeper` so the loop can be driven by a fake
//! clock in tests and woken early by cancellation in production.

use crate::context::CancellationToken;
use std::time::{Duration, Instant};

/// Granularity at which `ThreadSleeper` re-checks the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Finite, ordered retry schedule.
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    schedule: Vec<Duration>,
    consecutive_exhaustions: usize,
}

impl BackoffScheduler {
    /// Create a scheduler. An empty schedule is treated as a single zero delay.
    pub fn new(schedule: Vec<Duration>) -> Self {
        let schedule = if schedule.is_empty() {
            vec![Duration::ZERO]
        } else {
            schedule
        };
        Self {
            schedule,
            consecutive_exhaustions: 0,
        }
    }

    /// Record an exhaustion cycle.
    pub fn advance(&mut self) {
        self.consecutive_exhaustions = self.consecutive_exhaustions.saturating_add(1);
    }

    /// Record a cycle in which at least one item got through.
    pub fn reset(&mut self) {
        self.consecutive_exhaustions = 0;
    }

    /// Delay before the next cycle.
    ///
    /// The first entry after a reset or after the first exhaustion, then one
    /// entry further per additional exhaustion, holding at the last entry.
    pub fn next_delay(&self) -> Duration {
        self.schedule[self.schedule_index()]
    }

    /// Position in the schedule that `next_delay` reads.
    pub fn schedule_index(&self) -> usize {
        self.consecutive_exhaustions
            .saturating_sub(1)
            .min(self.schedule.len() - 1)
    }

    pub fn consecutive_exhaustions(&self) -> usize {
        self.consecutive_exhaustions
    }

    /// True once more exhaustion cycles have occurred in a row than the schedule has entries.
    pub fn exhausted(&self) -> bool {
        self.consecutive_exhaustions > self.schedule.len()
    }
}

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    /// Wait for `duration` or until `cancel` fires.
    ///
    /// Returns false if the wait was cut short by cancellation.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool;
}

/// Sleeps on the current thread in short slices, checking the token between slices.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_delays_follow_schedule_then_hold_last() {
        let mut backoff = BackoffScheduler::new(secs(&[1, 5, 10]));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));

        backoff.advance();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        backoff.advance();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        backoff.advance();
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert!(!backoff.exhausted());

        backoff.advance();
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert!(backoff.exhausted());
    }

    #[test]
    fn test_reset_returns_to_first_entry() {
        let mut backoff = BackoffScheduler::new(secs(&[1, 5, 10]));
        backoff.advance();
        backoff.advance();
        backoff.advance();
        backoff.reset();

        assert_eq!(backoff.consecutive_exhaustions(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert!(!backoff.exhausted());
    }

    #[test]
    fn test_nine_entry_schedule_exhausts_on_tenth_cycle() {
        let mut backoff = BackoffScheduler::new(secs(&[1, 1, 1, 1, 1, 5, 10, 30, 600]));
        for _ in 0..9 {
            backoff.advance();
            assert!(!backoff.exhausted());
        }
        backoff.advance();
        assert!(backoff.exhausted());
    }

    #[test]
    fn test_empty_schedule_still_usable() {
        let mut backoff = BackoffScheduler::new(Vec::new());
        assert_eq!(backoff.next_delay(), Duration::ZERO);
        backoff.advance();
        backoff.advance();
        assert!(backoff.exhausted());
    }

    #[test]
    fn test_thread_sleeper_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!ThreadSleeper.sleep(Duration::from_secs(30), &token));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_thread_sleeper_completes_short_sleep() {
        let token = CancellationToken::new();
        assert!(ThreadSleeper.sleep(Duration::from_millis(5), &token));
    }

    proptest! {
        #[test]
        fn consecutive_exhaustions_never_shorten_delay(
            schedule in proptest::collection::vec(0u64..1000, 1..12)
                .prop_map(|mut v| { v.sort_unstable(); v }),
            cycles in 1usize..30,
        ) {
            let mut backoff = BackoffScheduler::new(secs(&schedule));
            let mut previous = Duration::ZERO;
            for _ in 0..cycles {
                backoff.advance();
                let delay = backoff.next_delay();
                prop_assert!(delay >= previous);
                previous = delay;
            }
        }
    }
}
