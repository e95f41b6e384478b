use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts transactions submitted and not yet settled, remembering the highest count seen.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    current: Arc<AtomicU64>,
    max_observed: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn begin(&self) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            current: self.current.clone(),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max_observed(&self) -> u64 {
        self.max_observed.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard {
    current: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
