//! Conflict retry with stepped exponential backoff.
//!
//! Writes against a versioned object can fail with a conflict when another
//! actor changed the object since it was read. The writer re-reads the object
//! and tries again, a bounded number of times, sleeping between attempts.
//!
//! The control flow is an explicit state machine so the policy can be
//! exercised without any store behind it:
//!
//! ```text
//! Attempting(n) --ok--------------------------> Success
//! Attempting(n) --conflict, n == steps--------> Exhausted
//! Attempting(n) --conflict, n <  steps--------> ConflictLookup(n)
//! ConflictLookup(n) --next_attempt (sleep)----> Attempting(n + 1)
//! ```

use std::time::Duration;

use rand::Rng;

/// Stepped exponential backoff
///
/// `steps` bounds the total number of attempts. Between attempt `n` and
/// `n + 1` the caller sleeps `duration * factor^(n - 1)`, stretched by up to
/// `jitter` of itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt
    pub duration: Duration,
    /// Multiplier applied to the delay after every attempt
    pub factor: f64,
    /// Maximum extra fraction of the delay added at random
    pub jitter: f64,
    /// Maximum number of attempts
    pub steps: u32,
}

impl Backoff {
    /// Budget used for status writes that may conflict
    ///
    /// Five attempts, 10ms apart. There is no point in waiting longer since
    /// the conflicting writer is usually done by then.
    pub const DEFAULT_RETRY: Backoff = Backoff {
        duration: Duration::from_millis(10),
        factor: 1.0,
        jitter: 0.1,
        steps: 5,
    };

    /// Delay to wait after `completed` attempts, before jitter
    pub fn base_delay(&self, completed: u32) -> Duration {
        let exp = completed.saturating_sub(1) as i32;
        Duration::from_secs_f64(self.duration.as_secs_f64() * self.factor.powi(exp))
    }

    /// Delay to wait after `completed` attempts, with jitter applied
    pub fn delay(&self, completed: u32) -> Duration {
        let base = self.base_delay(completed);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.jitter);
        Duration::from_secs_f64(base.as_secs_f64() * (1.0 + extra))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::DEFAULT_RETRY
    }
}

/// Where a conflict retry loop currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `attempt` (1-based) is about to be made or is in flight
    Attempting {
        /// Current attempt number
        attempt: u32,
    },
    /// Attempt `attempt` conflicted; the caller refreshes its working copy
    ConflictLookup {
        /// Attempt that conflicted
        attempt: u32,
    },
    /// The write landed
    Success {
        /// Total attempts made
        attempts: u32,
    },
    /// The budget ran out while still conflicting
    Exhausted {
        /// Total attempts made
        attempts: u32,
    },
}

/// State machine driving a write-retry-on-conflict loop
#[derive(Clone, Debug)]
pub struct ConflictRetry {
    backoff: Backoff,
    state: RetryState,
}

impl ConflictRetry {
    /// Start a new loop at the first attempt
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    /// Current state
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::ConflictLookup { attempt } => attempt,
            RetryState::Success { attempts } | RetryState::Exhausted { attempts } => attempts,
        }
    }

    /// Whether the loop has reached a final state
    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            RetryState::Success { .. } | RetryState::Exhausted { .. }
        )
    }

    /// Record the outcome of the in-flight attempt
    ///
    /// Only meaningful in `Attempting`; in any other state it is a no-op.
    pub fn record_write(&mut self, conflicted: bool) -> RetryState {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = if !conflicted {
                RetryState::Success { attempts: attempt }
            } else if attempt >= self.backoff.steps {
                RetryState::Exhausted { attempts: attempt }
            } else {
                RetryState::ConflictLookup { attempt }
            };
        }
        self.state
    }

    /// Leave `ConflictLookup` for the next attempt
    ///
    /// Returns how long to wait before making it, or `None` when there is no
    /// pending lookup.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        match self.state {
            RetryState::ConflictLookup { attempt } => {
                self.state = RetryState::Attempting {
                    attempt: attempt + 1,
                };
                Some(self.backoff.delay(attempt))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(steps: u32) -> Backoff {
        Backoff {
            duration: Duration::from_millis(10),
            factor: 2.0,
            jitter: 0.0,
            steps,
        }
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut retry = ConflictRetry::new(Backoff::DEFAULT_RETRY);
        assert_eq!(retry.state(), RetryState::Attempting { attempt: 1 });
        assert_eq!(
            retry.record_write(false),
            RetryState::Success { attempts: 1 }
        );
        assert!(retry.is_done());
        assert_eq!(retry.next_attempt(), None);
    }

    #[test]
    fn test_conflicts_then_success_counts_attempts() {
        let mut retry = ConflictRetry::new(Backoff::DEFAULT_RETRY);
        for n in 1..=3 {
            assert_eq!(
                retry.record_write(true),
                RetryState::ConflictLookup { attempt: n }
            );
            assert!(retry.next_attempt().is_some());
        }
        assert_eq!(
            retry.record_write(false),
            RetryState::Success { attempts: 4 }
        );
    }

    #[test]
    fn test_budget_exhaustion_stops_at_steps() {
        let mut retry = ConflictRetry::new(no_jitter(3));
        retry.record_write(true);
        retry.next_attempt();
        retry.record_write(true);
        retry.next_attempt();
        assert_eq!(
            retry.record_write(true),
            RetryState::Exhausted { attempts: 3 }
        );
        assert_eq!(retry.next_attempt(), None);
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn test_record_write_is_noop_outside_attempting() {
        let mut retry = ConflictRetry::new(no_jitter(3));
        retry.record_write(true);
        assert_eq!(
            retry.record_write(false),
            RetryState::ConflictLookup { attempt: 1 }
        );
    }

    #[test]
    fn test_exponential_delays() {
        let backoff = no_jitter(5);
        assert_eq!(backoff.base_delay(1), Duration::from_millis(10));
        assert_eq!(backoff.base_delay(2), Duration::from_millis(20));
        assert_eq!(backoff.base_delay(3), Duration::from_millis(40));
        assert_eq!(backoff.delay(3), Duration::from_millis(40));
    }

    #[test]
    fn test_default_retry_delays_stay_within_jitter() {
        let backoff = Backoff::DEFAULT_RETRY;
        for completed in 1..backoff.steps {
            let d = backoff.delay(completed);
            assert!(d >= Duration::from_millis(10));
            assert!(d <= Duration::from_millis(11));
        }
    }

    #[test]
    fn test_default_is_conflict_budget() {
        assert_eq!(Backoff::default(), Backoff::DEFAULT_RETRY);
        assert_eq!(Backoff::DEFAULT_RETRY.steps, 5);
    }
}
