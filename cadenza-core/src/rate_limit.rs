//! Sliding-window request budget for search calls.

use crate::error::Result;
use crate::state::{StateStore, SEARCH_REQUESTS_KEY};
use crate::time::{elapsed_between, from_millis, DurationExt};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "cadenza::rate_limit";

/// Default trailing window (5 minutes)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);
/// Default number of searches allowed per window
pub const DEFAULT_BUDGET: usize = 60;

/// Outcome of an acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// How long until the oldest request leaves the window (only when rejected)
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    const fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    const fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// Pure sliding-window counter over request timestamps.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    budget: usize,
    requests: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    #[must_use]
    pub fn new(window: Duration, budget: usize) -> Self {
        Self {
            window,
            budget,
            requests: VecDeque::new(),
        }
    }

    /// Restore previously recorded timestamps. Out-of-order input is sorted.
    #[must_use]
    pub fn with_history(mut self, mut history: Vec<DateTime<Utc>>) -> Self {
        history.sort_unstable();
        self.requests = history.into();
        self
    }

    /// Try to take one slot at `now`.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> RateDecision {
        self.evict(now);

        if self.requests.len() >= self.budget {
            let retry_after = self.requests.front().map_or(self.window, |&oldest| {
                self.window.saturating_sub(elapsed_between(oldest, now))
            });
            return RateDecision::reject(retry_after);
        }

        self.requests.push_back(now);
        RateDecision::allow()
    }

    /// Drop requests older than the window
    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window.to_time_delta();
        while self.requests.front().is_some_and(|&t| t <= cutoff) {
            self.requests.pop_front();
        }
    }

    #[must_use]
    pub fn in_window(&self) -> usize {
        self.requests.len()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.requests.iter()
    }
}

/// Search rate limiter whose history survives restarts.
pub struct RateLimiter {
    window: SlidingWindow,
    store: StateStore,
}

impl RateLimiter {
    /// Load the limiter and its persisted request history
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub async fn load(store: StateStore, window: Duration, budget: usize) -> Result<Self> {
        let millis: Vec<i64> = store.get(SEARCH_REQUESTS_KEY).await?.unwrap_or_default();
        let history: Vec<_> = millis.into_iter().filter_map(from_millis).collect();
        debug!(target: LOG_TARGET, "Restored {} search timestamps", history.len());

        Ok(Self {
            window: SlidingWindow::new(window, budget).with_history(history),
            store,
        })
    }

    /// Try to take one search slot at `now`, persisting the history when allowed
    ///
    /// # Errors
    ///
    /// Returns an error if the updated history cannot be persisted.
    pub async fn try_acquire(&mut self, now: DateTime<Utc>) -> Result<RateDecision> {
        let decision = self.window.try_acquire(now);
        if decision.allowed {
            let millis: Vec<i64> = self
                .window
                .timestamps()
                .map(DateTime::timestamp_millis)
                .collect();
            self.store.put(SEARCH_REQUESTS_KEY, &millis).await?;
        } else {
            warn!(
                target: LOG_TARGET,
                "Search budget exhausted ({} in window), retry after {:?}",
                self.window.in_window(),
                decision.retry_after
            );
        }
        Ok(decision)
    }
}
