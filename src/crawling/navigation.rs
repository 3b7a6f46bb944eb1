//! Navigation retry state machine
//!
//! One unit of work navigates once per attempt, bounded by a per-attempt
//! timeout, with a fixed backoff between attempts. Only transient failures
//! (timeouts, transport errors) are retried; anything else ends the machine
//! immediately. Exhaustion is a value, not an error: the worker turns it into
//! a `NAVIGATION_ERROR` report and moves on.

use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::services::{BrowserError, BrowserSession, LoadedPage};
use crate::infrastructure::config::ScraperConfig;

/// Bounds of the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl NavigationPolicy {
    #[must_use]
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            attempts: config.navigation_attempts.max(1),
            backoff: config.retry_backoff(),
            timeout: config.navigation_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    Loaded { page: LoadedPage, attempts: u32 },
    Exhausted { attempts: u32, last_error: BrowserError },
}

impl NavigationOutcome {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Loaded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

enum State {
    Attempt(u32),
    Backoff { attempt: u32, error: BrowserError },
    Done(NavigationOutcome),
}

/// Drive `session` to `url`, retrying transient failures per `policy`
pub async fn navigate_with_retry(
    session: &mut dyn BrowserSession,
    url: &str,
    policy: NavigationPolicy,
) -> NavigationOutcome {
    let attempts = policy.attempts.max(1);
    let mut state = State::Attempt(1);

    loop {
        state = match state {
            State::Attempt(attempt) => {
                debug!(url, attempt, "Navigating");
                match attempt_once(session, url, policy.timeout).await {
                    Ok(page) => State::Done(NavigationOutcome::Loaded { page, attempts: attempt }),
                    Err(error) if error.is_transient() && attempt < attempts => {
                        warn!(url, attempt, error = %error, "Navigation attempt failed, retrying");
                        State::Backoff { attempt, error }
                    }
                    Err(error) => {
                        warn!(url, attempt, error = %error, "Navigation failed");
                        State::Done(NavigationOutcome::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        })
                    }
                }
            }
            State::Backoff { attempt, error } => {
                debug!(url, attempt, last_error = %error, backoff = ?policy.backoff, "Backing off");
                tokio::time::sleep(policy.backoff).await;
                State::Attempt(attempt + 1)
            }
            State::Done(outcome) => return outcome,
        };
    }
}

async fn attempt_once(
    session: &mut dyn BrowserSession,
    url: &str,
    timeout: Duration,
) -> Result<LoadedPage, BrowserError> {
    match tokio::time::timeout(timeout, session.navigate(url)).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout {
            url: url.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
