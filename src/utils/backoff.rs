use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Run `task` until it succeeds, each attempt bounded by `policy.timeout_ms`.
///
/// The delay between attempts starts at `base_delay_ms` and doubles up to
/// `max_delay_ms`. `max_retries = 0` retries forever. Cancelling `ct` ends
/// the backoff sleep and no further attempt is made.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    mut task: F,
    policy: BackoffPolicy,
    ct: &CancellationToken,
) -> Result<P>
where
    F: FnMut() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts = 0;
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);

    loop {
        attempts += 1;
        debug!("Attempt {} of {}", attempts, policy.max_retries);
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => {
                warn!("Attempt {} failed: {:?}", attempts, e);
            }
            Err(_) => {
                warn!("Task timed out after {:?}", timeout_duration);
            }
        }

        if !policy.is_unlimited() && attempts >= policy.max_retries {
            warn!("Task failed after {} retries", attempts);
            return Err(NetworkError::RetryExhausted { attempts }.into());
        }

        debug!("Retrying in {:?}...", current_delay);
        if !sleep_or_cancelled(current_delay, ct).await {
            debug!("Retries cancelled after {} attempts", attempts);
            return Err(NetworkError::RetryCancelled { attempts }.into());
        }
        current_delay = (current_delay * 2).min(max_delay);
    }
}

/// Jittered exponential delay sequence for loops that own their retries
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
    attempts: u64,
}

impl ExponentialBackoff {
    pub(crate) fn new(policy: &BackoffPolicy) -> Self {
        let base = Duration::from_millis(policy.base_delay_ms);
        Self {
            base,
            max: Duration::from_millis(policy.max_delay_ms),
            current: base,
            attempts: 0,
        }
    }

    /// Next delay, never above the ceiling
    pub(crate) fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter_ms = (delay.as_millis() / 4) as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (delay + jitter).min(self.max)
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u64 {
        self.attempts
    }
}

/// Returns false if cancelled before the delay elapsed
pub(crate) async fn sleep_or_cancelled(
    delay: Duration,
    ct: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = ct.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
