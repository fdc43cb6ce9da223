//! Retry with exponential backoff as an explicit state machine
//!
//! ```text
//! Attempting(1) --retryable--> Backoff(1, d1) --> Attempting(2) --> ...
//!      |                                                |
//!   success                                      retryable, n == max
//!      v                                                v
//! Succeeded(n)                                ExhaustedFailed(n, last_error)
//! ```
//!
//! The machine performs no I/O. The caller drives it by reporting each
//! attempt's result and sleeping through `Backoff` delays.

use crate::backend::BackendError;
use crate::config::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Randomize each delay within [d/2, d]
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            base_delay: Duration::from_millis(settings.retry_delay_ms),
            max_delay: Duration::from_millis(settings.max_retry_delay_ms),
            jitter: settings.jitter,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let low = millis / 2;
        Duration::from_millis(rand::thread_rng().gen_range(low..=millis))
    }
}

/// Where a retry sequence stands
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to make attempt `attempt` (1-based)
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed; wait `delay` before the next one
    Backoff { attempt: u32, delay: Duration },
    /// Attempt `attempts` succeeded
    Succeeded { attempts: u32 },
    /// Every allowed attempt failed
    ExhaustedFailed { attempts: u32, last_error: BackendError },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::ExhaustedFailed { .. })
    }
}

/// Drives a [`RetryState`] through one retry sequence
#[derive(Debug)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        match &self.state {
            RetryState::Attempting { attempt } => *attempt,
            RetryState::Backoff { attempt, .. } => *attempt,
            RetryState::Succeeded { attempts } => *attempts,
            RetryState::ExhaustedFailed { attempts, .. } => *attempts,
        }
    }

    /// Report that the current attempt succeeded
    pub fn succeed(&mut self) -> &RetryState {
        self.state = RetryState::Succeeded {
            attempts: self.attempts(),
        };
        &self.state
    }

    /// Report a retryable failure of the current attempt.
    ///
    /// Moves to `Backoff` if attempts remain, else to `ExhaustedFailed`.
    /// A server-provided `Retry-After` raises the delay but never lowers it.
    pub fn fail(&mut self, error: BackendError) -> &RetryState {
        let attempt = self.attempts();
        self.state = if attempt >= self.policy.max_attempts {
            RetryState::ExhaustedFailed {
                attempts: attempt,
                last_error: error,
            }
        } else {
            let backoff = self.policy.jittered(self.policy.delay_for(attempt));
            let delay = error.retry_after().map_or(backoff, |after| backoff.max(after));
            RetryState::Backoff { attempt, delay }
        };
        &self.state
    }

    /// Leave `Backoff` after the delay has elapsed
    pub fn resume(&mut self) -> &RetryState {
        if let RetryState::Backoff { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
        &self.state
    }
}
