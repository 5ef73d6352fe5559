//! Cooperative cancellation shared by every blocking export step

use crate::error::ExportError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal threaded through lifecycle calls, polls and transfers
///
/// Clones observe the same signal. Once cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Runs `fut` unless the token fires first
    ///
    /// The future is dropped on cancellation, which kills child processes
    /// spawned with `kill_on_drop` and aborts in-flight HTTP requests.
    pub async fn run<F, T, E>(&self, fut: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<ExportError>,
    {
        if self.is_cancelled() {
            return Err(ExportError::Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ExportError::Cancelled.into()),
            res = fut => res,
        }
    }

    /// Runs one named lifecycle step against `resource`
    ///
    /// Fatal errors (authentication, missing tooling) pass through unchanged;
    /// everything else is wrapped as [`ExportError::Lifecycle`] so logs show
    /// which step failed.
    pub async fn step<T, E, F>(
        &self,
        step: &'static str,
        resource: &str,
        fut: F,
    ) -> crate::Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<ExportError>,
    {
        self.run(async {
            fut.await.map_err(|e| {
                let err: ExportError = e.into();
                if err.is_fatal() {
                    err
                } else {
                    ExportError::lifecycle(step, resource, err)
                }
            })
        })
        .await
    }

    /// Sleeps for `duration`, returning early with `Cancelled`
    pub async fn sleep(&self, duration: std::time::Duration) -> crate::Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok::<_, ExportError>(())
        })
        .await
    }
}
