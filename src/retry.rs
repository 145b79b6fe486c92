//! Per-endpoint retry state machine.
//!
//! Transitions are pure so they can be exercised without timers:
//!
//! ```text
//! Idle{n} --retryable failure, n+1 <= max--> Retrying{n+1}
//! Idle{n} --retryable failure, n+1 >  max--> Exhausted
//! Retrying{n} --retryable failure--> Retrying{n}   (dropped, timer pending)
//! Retrying{n} --timer fired--> Idle{n}
//! any --success / reset--> Idle{0}
//! ```

use std::time::Duration;

use crate::CoordinatorOptions;

/// Backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&CoordinatorOptions::default())
    }
}

impl From<&CoordinatorOptions> for RetryPolicy {
    fn from(options: &CoordinatorOptions) -> Self {
        Self {
            max_attempts: options.max_attempts,
            base_delay: Duration::from_millis(options.retry_base_delay_ms),
            max_delay: Duration::from_millis(options.retry_max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(1u64 << exp).min(max_ms))
    }
}

/// Retry progress of one endpoint key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    /// No timer pending; `attempts` retries already consumed.
    Idle { attempts: u32 },
    /// Timer pending for retry number `attempt`.
    Retrying { attempt: u32 },
    /// All retries consumed without a success.
    Exhausted,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::Idle { attempts: 0 }
    }
}

/// What to do with a retryable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Arm a timer for retry number `attempt`.
    Schedule { attempt: u32, delay: Duration },
    /// A timer is already pending for this key; drop the failure.
    AlreadyRetrying,
    /// Give up and report the failure.
    Exhausted,
}

impl RetryState {
    pub fn attempts(&self, policy: &RetryPolicy) -> u32 {
        match *self {
            Self::Idle { attempts } => attempts,
            Self::Retrying { attempt } => attempt,
            Self::Exhausted => policy.max_attempts.saturating_add(1),
        }
    }

    pub fn is_retrying(&self) -> bool {
        matches!(self, Self::Retrying { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn on_retryable_failure(&mut self, policy: &RetryPolicy) -> RetryDecision {
        match *self {
            Self::Retrying { .. } => RetryDecision::AlreadyRetrying,
            Self::Exhausted => RetryDecision::Exhausted,
            Self::Idle { attempts } => {
                let attempt = attempts.saturating_add(1);
                if attempt > policy.max_attempts {
                    *self = Self::Exhausted;
                    RetryDecision::Exhausted
                } else {
                    *self = Self::Retrying { attempt };
                    RetryDecision::Schedule {
                        attempt,
                        delay: policy.delay_for_attempt(attempt),
                    }
                }
            }
        }
    }

    /// Leaves `Retrying` when the timer for `attempt` fires. Returns false
    /// when the state moved on meanwhile and the timer is stale.
    pub fn on_timer_fired(&mut self, attempt: u32) -> bool {
        match *self {
            Self::Retrying { attempt: pending } if pending == attempt => {
                *self = Self::Idle { attempts: attempt };
                true
            }
            _ => false,
        }
    }

    /// Rolls back a `Retrying` state whose timer could not be armed.
    pub fn abandon_retry(&mut self) {
        if let Self::Retrying { attempt } = *self {
            *self = Self::Idle {
                attempts: attempt.saturating_sub(1),
            };
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
