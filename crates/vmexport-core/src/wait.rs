//! Polling for long-running cloud operations (blob copies, export tasks)

use crate::cancel::CancelToken;
use crate::error::{ExportError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// State reported by one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    /// Still running; carries the backend's status text for logging
    Pending(String),
}

/// Interval and upper bound for a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Call `check` every `config.interval` until it reports `Ready`
///
/// Errors from `check` end the loop immediately. Exceeding the timeout yields
/// [`ExportError::Timeout`]; cancellation yields [`ExportError::Cancelled`].
pub async fn poll_until<T, F, Fut>(
    what: &str,
    config: PollConfig,
    cancel: &CancelToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match cancel.run(check()).await? {
            Poll::Ready(value) => {
                tracing::debug!(what = %what, attempt, "Operation completed");
                return Ok(value);
            }
            Poll::Pending(status) => {
                tracing::debug!(what = %what, attempt, status = %status, "Waiting");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ExportError::Timeout(format!(
                "{} did not complete within {:?}",
                what, config.timeout
            )));
        }
        cancel.sleep(config.interval.min(deadline - now)).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const CONFIG: PollConfig = PollConfig::new(Duration::from_secs(5), Duration::from_secs(60));

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = Instant::now();

        let value = poll_until("copy", CONFIG, &CancelToken::new(), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(Poll::Pending("pending".into()))
                } else {
                    Ok(Poll::Ready("success"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "success");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let out: Result<()> = poll_until("export task", CONFIG, &CancelToken::new(), || async {
            Ok(Poll::Pending("active".into()))
        })
        .await;
        assert!(matches!(out, Err(ExportError::Timeout(msg)) if msg.contains("export task")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let out: Result<()> = poll_until("copy", CONFIG, &CancelToken::new(), || async {
            Err(ExportError::lifecycle("copy", "blob", "aborted"))
        })
        .await;
        assert!(matches!(out, Err(ExportError::Lifecycle { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let out: Result<()> = poll_until("copy", CONFIG, &cancel, || async {
            Ok(Poll::Pending("pending".into()))
        })
        .await;
        assert!(matches!(out, Err(ExportError::Cancelled)));
    }
}
