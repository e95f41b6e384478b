mod events;
mod in_flight;
mod retry;

#[cfg(any(test, feature = "test-utils"))]
pub use events::RecordingSink;
pub use events::{EventKind, EventSink, ServiceEvent, TracingSink};
pub use in_flight::{InFlightGuard, InFlightTracker};
pub use retry::RetryPolicy;

use crate::{
    chain_client::{ChainClient, ChainClientPair, ServiceError, TxHandle, TxStatus},
    metrics::Metrics,
    utils::cancellation_token::CancellationToken,
};
use alloy::primitives::U256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum ServiceState {
    Idle,
    Polling,
    Checking,
    Deciding,
    Submitting,
    Depositing,
    AwaitingConfirmation,
    Faulted,
}

impl ServiceState {
    /// Value exported on the `service_state` gauge.
    pub fn ordinal(self) -> i64 {
        match self {
            ServiceState::Idle => 0,
            ServiceState::Polling => 1,
            ServiceState::Checking => 2,
            ServiceState::Deciding => 3,
            ServiceState::Submitting => 4,
            ServiceState::Depositing => 5,
            ServiceState::AwaitingConfirmation => 6,
            ServiceState::Faulted => 7,
        }
    }
}

/// Result of looking at chain state after a submission could not be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recheck {
    Landed,
    /// The last submission is still known to the node. Waiting on it again is the only safe
    /// move, a second transaction could land as well.
    Pending,
    /// Nothing on chain reflects the submission and the node no longer knows it.
    NotLanded,
}

/// One-shot lookup of a submitted transaction for use inside a recheck.
///
/// `None` when the lookup is inconclusive and the caller has to decide from chain state.
pub async fn check_submission<C: ChainClient>(
    client: &C,
    handle: Option<TxHandle>,
    confirmations: u64,
) -> Result<Option<Recheck>, ServiceError> {
    let Some(handle) = handle else {
        return Ok(None);
    };
    match client.check_confirmation(&handle, confirmations).await? {
        Some(TxStatus::Confirmed { .. }) => Ok(Some(Recheck::Landed)),
        Some(TxStatus::Pending) => Ok(Some(Recheck::Pending)),
        Some(TxStatus::Reverted {
            block_number,
            reason,
        }) => Err(ServiceError::reverted(&handle, block_number, &reason)),
        Some(TxStatus::TimedOut) | None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed {
        handle: TxHandle,
        block_number: u64,
    },
    /// The chain already reflects the submission although its confirmation was not observed.
    Landed { handle: Option<TxHandle> },
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub retry: RetryPolicy,
    pub confirmations: u64,
}

/// A spawned service loop and the name it reports under.
pub struct ServiceTask {
    pub name: String,
    pub handle: JoinHandle<ServiceState>,
}

impl ServiceTask {
    pub fn new(name: impl Into<String>, handle: JoinHandle<ServiceState>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

/// Services started by one node run, plus the client answering `/balance` queries.
pub struct RunningServices {
    pub tasks: Vec<ServiceTask>,
    pub balance_client: Arc<ChainClientPair>,
}

/// Waits until `grace` has elapsed for every task to stop. Tasks still running afterwards are
/// aborted and reported as `None`.
pub async fn join_services(
    tasks: Vec<ServiceTask>,
    grace: Duration,
) -> Vec<(String, Option<ServiceState>)> {
    let deadline = Instant::now() + grace;
    let mut finished = Vec::with_capacity(tasks.len());
    for ServiceTask { name, mut handle } in tasks {
        let state = match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(state)) => {
                info!("{} stopped in state {}", name, state);
                Some(state)
            }
            Ok(Err(e)) => {
                error!("{} task failed: {}", name, e);
                None
            }
            Err(_) => {
                warn!("{} did not stop within {}s, aborting", name, grace.as_secs());
                handle.abort();
                None
            }
        };
        finished.push((name, state));
    }
    finished
}

/// Interval ticking immediately, then every `period`. Missed ticks are dropped.
pub fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// State, reporting and submission discipline shared by the relayer and the funder.
pub struct ServiceCore {
    name: String,
    state: ServiceState,
    settings: ServiceSettings,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    cancel_token: CancellationToken,
    in_flight: InFlightTracker,
}

impl ServiceCore {
    pub fn new(
        name: impl Into<String>,
        settings: ServiceSettings,
        sink: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        let name = name.into();
        metrics.set_service_state(&name, ServiceState::Idle.ordinal());
        Self {
            name,
            state: ServiceState::Idle,
            settings,
            sink,
            metrics,
            cancel_token,
            in_flight: InFlightTracker::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn confirmations(&self) -> u64 {
        self.settings.confirmations
    }

    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    pub fn is_faulted(&self) -> bool {
        self.state == ServiceState::Faulted
    }

    /// Waits for the next tick. Returns `false` once shutdown was requested.
    pub async fn next_tick(&self, interval: &mut Interval) -> bool {
        tokio::select! {
            _ = interval.tick() => !self.cancel_token.is_cancelled(),
            _ = self.cancel_token.cancelled() => {
                info!("Shutdown signal received, stopping {}...", self.name);
                false
            }
        }
    }

    fn emit(&self, kind: EventKind) {
        self.sink.record(ServiceEvent {
            timestamp: chrono::Utc::now(),
            service: self.name.clone(),
            state: self.state,
            kind,
        });
    }

    pub fn transition(&mut self, to: ServiceState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.metrics.set_service_state(&self.name, to.ordinal());
        self.emit(EventKind::Transition { from });
    }

    pub fn record_decision(
        &self,
        subject: impl Into<String>,
        before: U256,
        after: U256,
        act: bool,
        detail: impl Into<String>,
    ) {
        self.emit(EventKind::Decision {
            subject: subject.into(),
            before,
            after,
            act,
            detail: detail.into(),
        });
    }

    /// Moves to `Faulted` and reports the error. Emits at most one failure per service.
    pub fn fault(&mut self, error: ServiceError) {
        if self.is_faulted() {
            warn!("{} already faulted, dropping error: {}", self.name, error);
            return;
        }
        self.transition(ServiceState::Faulted);
        self.metrics.inc_service_faults(&self.name);
        self.emit(EventKind::Failure {
            subject: None,
            error,
        });
    }

    /// Reports a fatal error confined to `subject`. The service itself keeps running.
    pub fn fault_subject(&self, subject: impl Into<String>, error: ServiceError) {
        let subject = subject.into();
        error!("{}: giving up on {}: {}", self.name, subject, error);
        self.metrics.inc_service_faults(&self.name);
        self.emit(EventKind::Failure {
            subject: Some(subject),
            error,
        });
    }

    /// Sleeps for the backoff delay after `attempt` failures, aborting on shutdown.
    pub async fn backoff(&self, attempt: u32) -> Result<(), ServiceError> {
        if self.cancel_token.sleep(self.settings.retry.delay(attempt)).await {
            Ok(())
        } else {
            Err(ServiceError::Shutdown)
        }
    }

    /// Runs `op` until it succeeds, fails with a fatal error, or the attempts run out.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.settings.retry.max_attempts => {
                    warn!(
                        "{}: {} failed (attempt {}/{}): {}",
                        self.name, what, attempt, self.settings.retry.max_attempts, e
                    );
                    self.backoff(attempt).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn publish_in_flight(&self) {
        let current = i64::try_from(self.in_flight.current()).unwrap_or(i64::MAX);
        self.metrics.set_in_flight_submissions(&self.name, current);
    }

    fn settled_by_recheck(&self, handle: Option<TxHandle>) -> Settlement {
        self.emit(EventKind::Settled {
            handle,
            detail: "found on chain after recheck".to_string(),
        });
        Settlement::Landed { handle }
    }

    /// Submits a transaction and follows it until it settles.
    ///
    /// Only one submission is in flight at a time. Every attempt after the first, whether it
    /// follows a retryable error or a confirmation timeout, is preceded by `recheck`, which
    /// looks at chain state to decide whether an earlier attempt already landed. A submission
    /// still pending is waited on again rather than resubmitted, and one the node dropped is
    /// replaced under the same nonce: `submit` receives the transaction it replaces.
    ///
    /// `on_submitted` runs as soon as the node accepted a transaction, before any waiting.
    pub async fn submit_until_settled<C, S, SFut, O, R, RFut>(
        &mut self,
        client: &C,
        submit_state: ServiceState,
        mut submit: S,
        mut on_submitted: O,
        mut recheck: R,
    ) -> Result<Settlement, ServiceError>
    where
        C: ChainClient,
        S: FnMut(Option<TxHandle>) -> SFut,
        SFut: Future<Output = Result<TxHandle, ServiceError>>,
        O: FnMut(&TxHandle),
        R: FnMut(Option<TxHandle>) -> RFut,
        RFut: Future<Output = Result<Recheck, ServiceError>>,
    {
        let max_attempts = self.settings.retry.max_attempts;
        let mut last_handle: Option<TxHandle> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut still_pending = None;
            if attempt > 1 {
                match self.retry("recheck", || recheck(last_handle)).await? {
                    Recheck::Landed => return Ok(self.settled_by_recheck(last_handle)),
                    Recheck::Pending => still_pending = last_handle,
                    Recheck::NotLanded => {}
                }
            }

            let guard = self.in_flight.begin();
            self.publish_in_flight();

            let handle = match still_pending {
                Some(handle) => {
                    info!(
                        "{}: {} is still pending, waiting again (attempt {}/{})",
                        self.name, handle, attempt, max_attempts
                    );
                    self.transition(ServiceState::AwaitingConfirmation);
                    handle
                }
                None => {
                    self.transition(submit_state);
                    let handle = match submit(last_handle).await {
                        Ok(handle) => handle,
                        Err(e) => {
                            drop(guard);
                            self.publish_in_flight();
                            self.metrics.inc_submission_errors(&self.name);
                            if e.is_retryable() && attempt < max_attempts {
                                warn!(
                                    "{}: submission failed (attempt {}/{}): {}",
                                    self.name, attempt, max_attempts, e
                                );
                                self.backoff(attempt).await?;
                                continue;
                            }
                            return Err(e);
                        }
                    };
                    self.metrics.inc_submissions(&self.name);
                    last_handle = Some(handle);
                    on_submitted(&handle);
                    self.transition(ServiceState::AwaitingConfirmation);
                    self.emit(EventKind::Submitted { handle });
                    handle
                }
            };

            let status = client
                .wait_for_confirmation(&handle, self.settings.confirmations)
                .await;
            drop(guard);
            self.publish_in_flight();

            match status {
                TxStatus::Confirmed { block_number } => {
                    self.emit(EventKind::Settled {
                        handle: Some(handle),
                        detail: format!("confirmed in block {block_number}"),
                    });
                    return Ok(Settlement::Confirmed {
                        handle,
                        block_number,
                    });
                }
                TxStatus::Reverted {
                    block_number,
                    reason,
                } => {
                    self.metrics.inc_submission_errors(&self.name);
                    return Err(ServiceError::reverted(&handle, block_number, &reason));
                }
                TxStatus::TimedOut | TxStatus::Pending => {
                    warn!(
                        "{}: confirmation of {} timed out (attempt {}/{})",
                        self.name, handle, attempt, max_attempts
                    );
                    if attempt >= max_attempts {
                        let outcome = self.retry("recheck", || recheck(last_handle)).await?;
                        if outcome == Recheck::Landed {
                            return Ok(self.settled_by_recheck(last_handle));
                        }
                        return Err(ServiceError::ConfirmationTimeout(handle.hash));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
