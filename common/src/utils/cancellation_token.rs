use crate::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Process-wide shutdown signal that also counts critical errors.
#[derive(Clone)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    metrics: Arc<Metrics>,
}

impl CancellationToken {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            inner: tokio_util::sync::CancellationToken::new(),
            metrics,
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn cancel_on_critical_error(&self) {
        error!("Critical error occurred, cancelling token");
        self.metrics.inc_critical_errors();
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.inner.cancelled()
    }

    /// Sleeps for `duration`. Returns `false` if cancellation interrupted the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.inner.cancelled() => false,
        }
    }
}
