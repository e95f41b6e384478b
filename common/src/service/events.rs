use super::ServiceState;
use crate::chain_client::{ServiceError, TxHandle};
use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    /// State of the service once the event happened.
    pub state: ServiceState,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Transition {
        from: ServiceState,
    },
    /// Outcome of a decision step with the values it compared.
    Decision {
        subject: String,
        before: U256,
        after: U256,
        act: bool,
        detail: String,
    },
    Submitted {
        handle: TxHandle,
    },
    Settled {
        handle: Option<TxHandle>,
        detail: String,
    },
    /// A fatal error. `subject` names the account it was confined to, if any; without one the
    /// whole service faulted.
    Failure {
        subject: Option<String>,
        error: ServiceError,
    },
}

/// Receiver of state transitions, decisions and terminal failures.
pub trait EventSink: Send + Sync {
    fn record(&self, event: ServiceEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: ServiceEvent) {
        let timestamp = event.timestamp.to_rfc3339();
        let service = event.service.as_str();
        let state = event.state.as_ref();
        match event.kind {
            EventKind::Transition { from } => debug!(
                %timestamp, service, state, from = from.as_ref(),
                "state transition"
            ),
            EventKind::Decision {
                subject,
                before,
                after,
                act,
                detail,
            } => info!(
                %timestamp, service, state, %subject, %before, %after, act,
                "decision: {detail}"
            ),
            EventKind::Submitted { handle } => {
                info!(%timestamp, service, state, %handle, "transaction submitted")
            }
            EventKind::Settled { handle, detail } => match handle {
                Some(handle) => info!(%timestamp, service, state, %handle, "settled: {detail}"),
                None => info!(%timestamp, service, state, "settled: {detail}"),
            },
            EventKind::Failure {
                subject: Some(subject),
                error,
            } => error!(%timestamp, service, state, %subject, %error, "account failure"),
            EventKind::Failure {
                subject: None,
                error,
            } => error!(%timestamp, service, state, %error, "service failure"),
        }
    }
}

/// Keeps events in memory so tests can assert on them.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<ServiceEvent>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingSink {
    pub fn events(&self) -> Vec<ServiceEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }

    pub fn failures(&self) -> Vec<ServiceError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Failure { error, .. } => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn decisions(&self) -> Vec<(U256, U256, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Decision {
                    before, after, act, ..
                } => Some((before, after, act)),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<ServiceState> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::Transition { .. }))
            .map(|e| e.state)
            .collect()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl EventSink for RecordingSink {
    fn record(&self, event: ServiceEvent) {
        warn_if_faulted(&event);
        self.events.lock().expect("sink poisoned").push(event);
    }
}

#[cfg(any(test, feature = "test-utils"))]
fn warn_if_faulted(event: &ServiceEvent) {
    if let EventKind::Failure { error, .. } = &event.kind {
        warn!("recorded failure for {}: {}", event.service, error);
    }
}
