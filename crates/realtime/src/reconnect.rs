//! Fixed-delay reconnection.
//!
//! A dropped or refused broker connection is retried every
//! [`RECONNECT_DELAY`] for as long as the manager stays active. There is
//! no backoff and no attempt cap; only the [`CancellationToken`] stops
//! the loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Sleep for `delay` unless cancelled first.
///
/// Returns `false` when the token fired.
pub async fn wait_before_retry(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Call `attempt` until it succeeds, sleeping `delay` between failures.
///
/// Returns `Some(value)` on the first success, or `None` if `cancel` is
/// triggered before that.
pub async fn retry_fixed<T, E, F, Fut>(
    mut attempt: F,
    delay: Duration,
    cancel: &CancellationToken,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(attempts, "Reconnect cancelled");
                return None;
            }
            result = attempt() => {
                match result {
                    Ok(value) => {
                        if attempts > 1 {
                            tracing::info!(attempts, "Reconnected to broker");
                        }
                        return Some(value);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Broker connect attempt {attempts} failed",
                        );
                    }
                }
            }
        }

        if !wait_before_retry(delay, cancel).await {
            return None;
        }
    }
}
