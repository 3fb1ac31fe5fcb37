//! Bounded sleep-and-retry polling.
//!
//! Every convergence wait in the pipeline goes through [`until`]: it sleeps
//! between attempts, gives up with [`TimedOut`] at the deadline, and returns
//! [`MigrateError::Aborted`] as soon as the cancellation token fires.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng as _;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::domain::{MigrateError, TimedOut};

/// Exponential delay sequence, optionally jittered.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
    attempt: i32,
}

impl Backoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            min,
            max: max.max(min),
            factor: factor.max(1.0),
            jitter: false,
            attempt: 0,
        }
    }

    /// Constant interval, as for a ticker.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval, 1.0)
    }

    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// The delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let grown = self.min.as_secs_f64() * self.factor.powi(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        let capped = grown.min(self.max.as_secs_f64());
        let secs = if self.jitter && capped > self.min.as_secs_f64() {
            rand::rng().random_range(self.min.as_secs_f64()..=capped)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

/// Backoff used for legacy scale-down and replica health: 2s up to 5min.
#[must_use]
pub fn convergence_backoff() -> Backoff {
    Backoff::new(Duration::from_secs(2), Duration::from_secs(300), 1.2).with_jitter()
}

/// Fail fast when the operator has interrupted the run.
///
/// # Errors
///
/// Returns [`MigrateError::Aborted`] once `cancel` has fired.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MigrateError::Aborted.into());
    }
    Ok(())
}

/// Sleep, check, repeat until `check` yields a value.
///
/// `Ok(None)` from the check means "not yet"; an `Err` ends the wait
/// immediately. Probes that should tolerate transient failures must map
/// them to `Ok(None)` themselves.
///
/// # Errors
///
/// Returns [`TimedOut`] naming `what` once `limit` elapses,
/// [`MigrateError::Aborted`] on cancellation, or the check's own error.
pub async fn until<T, F, Fut>(
    what: &str,
    limit: Duration,
    mut delays: Backoff,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + limit;
    let timed_out = || TimedOut {
        what: what.to_string(),
        after: limit,
    };
    loop {
        let wake = Instant::now() + delays.next_delay();
        if wake > deadline {
            tokio::select! {
                () = cancel.cancelled() => return Err(MigrateError::Aborted.into()),
                () = sleep_until(deadline) => return Err(timed_out().into()),
            }
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(MigrateError::Aborted.into()),
            () = sleep_until(wake) => {}
        }
        if let Some(value) = check().await? {
            return Ok(value);
        }
        tracing::debug!(what, "still waiting");
    }
}
