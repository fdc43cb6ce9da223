//! Rolling-window request and token rate governor
//!
//! Every admitted call is recorded with its timestamp and estimated token
//! count. A call is admitted only if, counting it, the calls and tokens whose
//! timestamps fall inside the last `window` stay at or under the configured
//! ceilings. Otherwise the caller sleeps until enough of the oldest entries
//! have aged out, then re-checks.
//!
//! The check-and-record step runs under one short lock; the wait happens
//! outside it, so waiting callers never block each other's bookkeeping.

use crate::config::RateLimitSettings;
use newslabel_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Paces calls under per-window request and token ceilings
#[derive(Debug)]
pub struct RateGovernor {
    max_requests: u32,
    max_tokens: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

#[derive(Debug, Default)]
struct RateWindow {
    entries: VecDeque<(Instant, u32)>,
    tokens_in_window: u64,
}

/// Current window usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub requests: u32,
    pub tokens: u64,
}

impl RateGovernor {
    /// Create a governor from rate limit settings
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self::with_window(settings.max_rpm, settings.max_tpm, settings.window())
    }

    /// Create a governor with explicit ceilings and window length
    pub fn with_window(max_requests: u32, max_tokens: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            max_tokens: max_tokens.max(1),
            window,
            state: Mutex::new(RateWindow::default()),
        }
    }

    /// Wait until a call of `estimated_tokens` fits in the window, then record it.
    ///
    /// Returns how long the caller waited. A request larger than the token
    /// ceiling can never be admitted and is a configuration error.
    pub async fn reserve(&self, estimated_tokens: u32) -> Result<Duration> {
        if estimated_tokens > self.max_tokens {
            return Err(Error::config(format!(
                "request of ~{} tokens exceeds the per-window token ceiling of {}",
                estimated_tokens, self.max_tokens
            )));
        }

        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                state.prune(now, self.window);
                match state.required_wait(
                    now,
                    estimated_tokens,
                    self.max_requests,
                    self.max_tokens,
                    self.window,
                ) {
                    None => {
                        state.record(now, estimated_tokens);
                        return Ok(waited);
                    }
                    Some(wait) => wait,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                tokens = estimated_tokens,
                "Rate limit reached, waiting for window to roll"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Requests and tokens currently counted in the window
    pub fn usage(&self) -> WindowUsage {
        let mut state = self.state.lock();
        state.prune(Instant::now(), self.window);
        WindowUsage {
            requests: state.entries.len() as u32,
            tokens: state.tokens_in_window,
        }
    }
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&(at, tokens)) = self.entries.front() {
            if at + window <= now {
                self.entries.pop_front();
                self.tokens_in_window -= tokens as u64;
            } else {
                break;
            }
        }
    }

    /// `None` if the call fits now, else the time until it would
    fn required_wait(
        &self,
        now: Instant,
        tokens: u32,
        max_requests: u32,
        max_tokens: u32,
        window: Duration,
    ) -> Option<Duration> {
        let mut expires_at: Option<Instant> = None;

        // Oldest entry that must age out to free one request slot
        let requests = self.entries.len();
        if requests >= max_requests as usize {
            let (at, _) = self.entries[requests - max_requests as usize];
            expires_at = Some(at + window);
        }

        // Oldest prefix that must age out to free enough tokens
        let overflow = (self.tokens_in_window + tokens as u64).saturating_sub(max_tokens as u64);
        if overflow > 0 {
            let mut freed = 0u64;
            for &(at, entry_tokens) in &self.entries {
                freed += entry_tokens as u64;
                if freed >= overflow {
                    let candidate = at + window;
                    expires_at = Some(expires_at.map_or(candidate, |e| e.max(candidate)));
                    break;
                }
            }
        }

        expires_at.map(|at| at.saturating_duration_since(now))
    }

    fn record(&mut self, now: Instant, tokens: u32) {
        self.entries.push_back((now, tokens));
        self.tokens_in_window += tokens as u64;
    }
}
