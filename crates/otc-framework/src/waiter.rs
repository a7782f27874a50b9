//! # Async Waiter
//!
//! A reusable poll-until-settled coordinator. Every long-running operation (create, update,
//! delete, accept) describes what "still working" and "done" look like and hands the waiter a
//! refresh function; the polling loop itself is never written inline in a resource.
//!
//! ## Parameters
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `pending` | states that mean "keep polling" |
//! | `target` | states that mean "done" |
//! | `timeout` | total time allowed, measured from the call |
//! | `delay` | sleep before the first refresh |
//! | `min_timeout` | lower bound for every back-off sleep |
//! | `poll_interval` | fixed sleep that replaces the exponential back-off |
//!
//! ## Algorithm
//!
//! ```text
//! sleep(delay)
//! loop:
//!     refresh()
//!       not-found && "DELETED" in target  -> Ok(None)
//!       5xx / network                      -> retried up to 3 times in a row
//!       409 while delete polling           -> treated as pending, bounded
//!       other error                        -> Err(Refresh)
//!       state in target                    -> Ok(value)
//!       state in pending                   -> keep going
//!       anything else                      -> Err(UnexpectedState)
//!     if deadline passed -> Err(Timeout)
//!     sleep(min(next back-off, time left))
//! ```
//!
//! Sleeps are clamped to the time left, so a refresh stuck in a pending state fails no earlier
//! than `timeout` and no later than `timeout + min_timeout`. Cancelling the token aborts the
//! current sleep and returns [`WaitError::Cancelled`] without another refresh.

use crate::error::{classify, CloudError, ErrorClass, Phase};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const BUILD_PENDING: &[&str] = &["BUILD", "CREATING", "PENDING_CREATE", "creating"];
pub const BUILD_TARGET: &[&str] = &["ACTIVE", "available", "COMPLETED", "RUNNING"];
pub const DELETE_PENDING: &[&str] = &["ACTIVE", "DELETING", "available", "released", "fault"];
pub const DELETE_TARGET: &[&str] = &["DELETED", "deleted"];
pub const UPDATE_PENDING: &[&str] = &["PENDING_UPDATE", "BACKING UP"];
pub const UPDATE_TARGET: &[&str] = &["ACTIVE"];

/// The state name the waiter treats as success when a refresh reports not-found.
pub const DELETED: &str = "DELETED";

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_TRANSIENT_RETRIES: usize = 3;
const DEFAULT_CONFLICT_RETRIES: usize = 10;

/// What a refresh function returns: the current object, if any, and its state name.
pub type RefreshResult<T> = Result<(Option<T>, String), CloudError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WaitError {
    #[error("timeout while waiting for state to become {} (last state: {last_state:?}, timeout: {timeout:?})", fmt_states(.target))]
    Timeout {
        target: Vec<String>,
        last_state: String,
        timeout: Duration,
    },

    #[error("unexpected state {state:?}, wanted target {}", fmt_states(.target))]
    UnexpectedState { state: String, target: Vec<String> },

    #[error(transparent)]
    Refresh(CloudError),

    #[error("wait cancelled")]
    Cancelled,
}

fn fmt_states(states: &[String]) -> String {
    states
        .iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Polling configuration. Build one per wait; it is consumed by [`StateChangeConf::wait_for_state`].
#[derive(Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    pub delay: Duration,
    pub min_timeout: Duration,
    pub poll_interval: Option<Duration>,
    pub conflict_retries: usize,
    phase: Phase,
    cancel: CancellationToken,
}

impl fmt::Debug for StateChangeConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChangeConf")
            .field("pending", &self.pending)
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .field("min_timeout", &self.min_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| (*s).to_owned()).collect(),
            target: target.iter().map(|s| (*s).to_owned()).collect(),
            timeout: Duration::from_secs(600),
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            phase: Phase::Normal,
            cancel: CancellationToken::new(),
        }
    }

    pub fn build() -> Self {
        Self::new(BUILD_PENDING, BUILD_TARGET)
    }

    /// Delete polling: 409 counts as pending for a bounded number of polls.
    pub fn delete() -> Self {
        let mut conf = Self::new(DELETE_PENDING, DELETE_TARGET);
        conf.phase = Phase::DeletePolling;
        conf
    }

    pub fn update() -> Self {
        Self::new(UPDATE_PENDING, UPDATE_TARGET)
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn min_timeout(mut self, d: Duration) -> Self {
        self.min_timeout = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = Some(d);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_pending(mut self, states: &[&str]) -> Self {
        self.pending = states.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_target(mut self, states: &[&str]) -> Self {
        self.target = states.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    async fn sleep(&self, d: Duration) -> Result<(), WaitError> {
        if d.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep(d) => Ok(()),
        }
    }

    /// Polls `refresh` until a target state, an error, cancellation or the deadline.
    ///
    /// Returns the refreshed object on success; `None` when the object vanished and
    /// `"DELETED"` was a target.
    pub async fn wait_for_state<T, F, Fut>(self, mut refresh: F) -> Result<Option<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RefreshResult<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = INITIAL_BACKOFF;
        let mut transient = 0usize;
        let mut conflicts = 0usize;
        let mut last_state = String::new();

        self.sleep(self.delay.min(self.timeout)).await?;

        loop {
            if self.cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(WaitError::Cancelled),
                outcome = refresh() => outcome,
            };

            match outcome {
                Err(e) if e.is_not_found() && self.target.iter().any(|t| t == DELETED) => {
                    debug!("Resource gone, treating as {DELETED}");
                    return Ok(None);
                }
                Err(CloudError::Cancelled) => return Err(WaitError::Cancelled),
                Err(e) => match classify(&e, self.phase) {
                    ErrorClass::Retryable if e.status() == Some(409) => {
                        conflicts += 1;
                        if conflicts > self.conflict_retries {
                            return Err(WaitError::Refresh(e));
                        }
                        debug!(conflicts, "Conflict while deleting, still pending");
                    }
                    ErrorClass::Retryable => {
                        transient += 1;
                        if transient > MAX_TRANSIENT_RETRIES {
                            return Err(WaitError::Refresh(e));
                        }
                        warn!(error = %e, attempt = transient, "Refresh failed, retrying");
                    }
                    _ => return Err(WaitError::Refresh(e)),
                },
                Ok((value, state)) => {
                    transient = 0;
                    debug!(state = %state, "Refreshed");
                    if self.target.iter().any(|t| *t == state) {
                        return Ok(value);
                    }
                    if !self.pending.iter().any(|p| *p == state) {
                        return Err(WaitError::UnexpectedState {
                            state,
                            target: self.target.clone(),
                        });
                    }
                    last_state = state;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    target: self.target.clone(),
                    last_state,
                    timeout: self.timeout,
                });
            }

            let next = match self.poll_interval {
                Some(interval) => interval,
                None => {
                    let next = backoff.max(self.min_timeout);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    next
                }
            };
            self.sleep(next.min(deadline - now)).await?;
        }
    }
}
