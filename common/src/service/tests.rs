use super::*;
use crate::chain_client::mock::{MockCall, MockChainClient};
use crate::chain_client::{Layer, ValueKey};
use alloy::primitives::{Bytes, address};

const SIGNER: alloy::primitives::Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const ORACLE: alloy::primitives::Address = address!("0x00000000000000000000000000000000000010aa");

fn new_core(max_attempts: u32) -> (ServiceCore, Arc<RecordingSink>, CancellationToken) {
    let metrics = Arc::new(Metrics::new());
    let sink = Arc::new(RecordingSink::default());
    let cancel_token = CancellationToken::new(metrics.clone());
    let core = ServiceCore::new(
        "test-service",
        ServiceSettings {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            confirmations: 1,
        },
        sink.clone(),
        metrics,
        cancel_token.clone(),
    );
    (core, sink, cancel_token)
}

fn value_key() -> ValueKey {
    ValueKey::call(ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45]))
}

async fn submit_and_recheck(
    core: &mut ServiceCore,
    client: &MockChainClient,
    target: U256,
) -> Result<Settlement, ServiceError> {
    let key = value_key();
    let key = &key;
    core.submit_until_settled(
        client,
        ServiceState::Submitting,
        move |replaces| client.submit_l2_transaction(ORACLE, Bytes::from_static(b"update"), replaces),
        |_| {},
        move |handle| async move {
            let observed = client.read_l2_value(key).await?;
            if observed.value == target {
                return Ok(Recheck::Landed);
            }
            Ok(check_submission(client, handle, 1)
                .await?
                .unwrap_or(Recheck::NotLanded))
        },
    )
    .await
}

fn submissions(calls: &[MockCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, MockCall::SubmitL2 { .. }))
        .count()
}

#[tokio::test]
async fn test_confirmed_submission_settles_once() {
    let (mut core, sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);

    let settlement = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect("settles");

    assert!(matches!(settlement, Settlement::Confirmed { handle, .. } if handle.layer == Layer::L2));
    assert_eq!(submissions(&client.calls()), 1);
    assert_eq!(core.in_flight().max_observed(), 1);
    assert_eq!(core.in_flight().current(), 0);
    assert_eq!(
        sink.states(),
        vec![ServiceState::Submitting, ServiceState::AwaitingConfirmation]
    );
}

#[tokio::test]
async fn test_timeout_rechecks_before_resubmitting() {
    let (mut core, _sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(100),
        );
    });

    let settlement = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect("settles on second attempt");
    assert!(matches!(settlement, Settlement::Confirmed { .. }));

    let calls = client.calls();
    let kinds: Vec<&str> = calls
        .iter()
        .map(|c| match c {
            MockCall::SubmitL2 { .. } => "submit",
            MockCall::WaitForConfirmation(_) => "wait",
            MockCall::ReadL2(_) => "read",
            MockCall::CheckConfirmation(_) => "check",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["submit", "wait", "read", "check", "submit", "wait"]
    );
    assert_eq!(core.in_flight().max_observed(), 1);

    let submitted = client.submitted();
    assert_ne!(submitted[0].handle.hash, submitted[1].handle.hash);
    assert_eq!(submitted[0].handle.nonce, submitted[1].handle.nonce);
}

#[tokio::test]
async fn test_pending_submission_is_waited_on_instead_of_resubmitted() {
    let (mut core, _sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.check_results.push_back(Some(TxStatus::Pending));
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(100),
        );
    });

    let settlement = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect("confirmed on the second wait");

    let submitted = client.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(
        matches!(settlement, Settlement::Confirmed { handle, .. } if handle == submitted[0].handle)
    );
    let waits: Vec<TxHandle> = client
        .calls()
        .iter()
        .filter_map(|c| match c {
            MockCall::WaitForConfirmation(handle) => Some(*handle),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![submitted[0].handle, submitted[0].handle]);
}

#[tokio::test]
async fn test_submission_pending_past_last_attempt_times_out_without_resubmitting() {
    let (mut core, _sink, _cancel) = new_core(2);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.check_results.push_back(Some(TxStatus::Pending));
        s.check_results.push_back(Some(TxStatus::Pending));
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(100),
        );
    });

    let err = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect_err("still pending");

    let submitted = client.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(err, ServiceError::ConfirmationTimeout(submitted[0].handle.hash));
}

#[tokio::test]
async fn test_on_submitted_runs_before_waiting() {
    let (mut core, _sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    let client = &client;
    let mut seen = Vec::new();

    core.submit_until_settled(
        client,
        ServiceState::Submitting,
        move |replaces| client.submit_l2_transaction(ORACLE, Bytes::from_static(b"update"), replaces),
        |handle: &TxHandle| {
            let waited = client
                .calls()
                .iter()
                .any(|c| matches!(c, MockCall::WaitForConfirmation(h) if h == handle));
            seen.push((*handle, waited));
        },
        |_| async { Ok(Recheck::NotLanded) },
    )
    .await
    .expect("settles");

    assert_eq!(seen, vec![(client.submitted()[0].handle, false)]);
}

#[tokio::test]
async fn test_timeout_with_landed_update_does_not_resubmit() {
    let (mut core, sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(106),
        );
    });

    let settlement = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect("landed");

    assert!(matches!(settlement, Settlement::Landed { handle: Some(_) }));
    assert_eq!(submissions(&client.calls()), 1);
    assert!(sink.failures().is_empty());
}

#[tokio::test]
async fn test_timeouts_exhaust_attempts() {
    let (mut core, _sink, _cancel) = new_core(2);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.confirmation_results.push_back(TxStatus::TimedOut);
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(100),
        );
    });

    let err = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect_err("never confirmed");

    assert!(matches!(err, ServiceError::ConfirmationTimeout(_)));
    assert_eq!(submissions(&client.calls()), 2);
}

#[tokio::test]
async fn test_revert_is_not_retried() {
    let (mut core, _sink, _cancel) = new_core(5);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.confirmation_results.push_back(TxStatus::Reverted {
            block_number: 101,
            reason: "execution reverted: not owner".to_string(),
        })
    });

    let err = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect_err("revert is fatal");

    assert!(!err.is_retryable());
    assert!(
        matches!(err, ServiceError::Reverted { hash, .. } if hash == client.submitted()[0].handle.hash)
    );
    assert_eq!(submissions(&client.calls()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_submission_errors_back_off_then_give_up() {
    let (mut core, _sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        for _ in 0..3 {
            s.submit_errors
                .push_back(ServiceError::from_submission_failure("nonce too low"));
        }
        s.l2_calls.insert(
            (ORACLE, Bytes::from_static(&[0x3f, 0xa4, 0xf2, 0x45])),
            U256::from(100),
        );
    });

    let err = submit_and_recheck(&mut core, &client, U256::from(106))
        .await
        .expect_err("attempts exhausted");

    assert!(err.is_retryable());
    assert_eq!(submissions(&client.calls()), 3);
    assert!(client.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_read_errors() {
    let (core, _sink, _cancel) = new_core(3);
    let client = MockChainClient::new(SIGNER);
    client.with_state(|s| {
        s.balance_errors.push_back(ServiceError::Rpc("timeout".to_string()));
        s.balance_errors.push_back(ServiceError::Rpc("timeout".to_string()));
        s.l2_balances.insert(SIGNER, U256::from(7));
    });

    let balance = core
        .retry("balance", || client.read_l2_balance(SIGNER))
        .await
        .expect("third read succeeds");
    assert_eq!(balance, U256::from(7));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_observes_shutdown() {
    let (core, _sink, cancel) = new_core(3);
    cancel.cancel();
    assert_eq!(core.backoff(1).await, Err(ServiceError::Shutdown));
}

#[test]
fn test_fault_reports_once() {
    let (mut core, sink, _cancel) = new_core(3);
    core.fault(ServiceError::submission("execution reverted", false));
    core.fault(ServiceError::Rpc("late".to_string()));

    assert_eq!(core.state(), ServiceState::Faulted);
    assert_eq!(sink.failures().len(), 1);
}

#[test]
fn test_subject_fault_leaves_service_running() {
    let (mut core, sink, _cancel) = new_core(3);
    core.transition(ServiceState::Checking);
    core.fault_subject("0x00000000000000000000000000000000000000aa", ServiceError::Rpc("down".into()));

    assert_eq!(core.state(), ServiceState::Checking);
    assert!(!core.is_faulted());
    let failures: Vec<ServiceEvent> = sink
        .events()
        .into_iter()
        .filter(|e| matches!(e.kind, EventKind::Failure { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0].kind,
        EventKind::Failure { subject: Some(subject), .. } if subject.ends_with("aa")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_join_services_aborts_tasks_past_grace() {
    let stopped = ServiceTask::new("stopped", tokio::spawn(async { ServiceState::Idle }));
    let stuck = ServiceTask::new(
        "stuck",
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ServiceState::AwaitingConfirmation
        }),
    );

    let finished = join_services(vec![stopped, stuck], Duration::from_secs(10)).await;

    assert_eq!(
        finished,
        vec![
            ("stopped".to_string(), Some(ServiceState::Idle)),
            ("stuck".to_string(), None),
        ]
    );
}
