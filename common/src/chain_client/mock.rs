//! Scriptable in-memory [`ChainClient`] for driving the service state machines in tests.

use super::{ChainClient, Layer, OracleObservation, ServiceError, TxHandle, TxStatus, ValueKey};
use alloy::primitives::{Address, B256, Bytes, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ReadL1(ValueKey),
    ReadL2(ValueKey),
    ReadBalance(Address),
    SubmitL1 { to: Address, data: Bytes, value: U256 },
    SubmitL2 { to: Address, data: Bytes },
    WaitForConfirmation(TxHandle),
    CheckConfirmation(TxHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub handle: TxHandle,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

type SubmitHook = Box<dyn FnMut(&SubmittedTx, &mut MockState) + Send>;

#[derive(Default)]
pub struct MockState {
    pub block_number: u64,
    pub timestamp: u64,
    pub gas_price: U256,
    /// Answers to L1 view calls keyed by `(to, calldata)`.
    pub l1_calls: HashMap<(Address, Bytes), U256>,
    /// Answers to L2 view calls keyed by `(to, calldata)`.
    pub l2_calls: HashMap<(Address, Bytes), U256>,
    pub l2_balances: HashMap<Address, U256>,
    pub l1_read_errors: VecDeque<ServiceError>,
    pub l2_read_errors: VecDeque<ServiceError>,
    pub balance_errors: VecDeque<ServiceError>,
    /// Errors returned by the next submissions, before any submission succeeds.
    pub submit_errors: VecDeque<ServiceError>,
    /// Outcomes of successive confirmation waits. Empty means confirmed.
    pub confirmation_results: VecDeque<TxStatus>,
    /// Outcomes of successive one-shot receipt checks. Empty or `None` means the node does not
    /// know the transaction.
    pub check_results: VecDeque<Option<TxStatus>>,
    pub submitted: Vec<SubmittedTx>,
    pub calls: Vec<MockCall>,
    next_nonce: HashMap<Layer, u64>,
    in_flight: u64,
    pub max_in_flight: u64,
}

pub struct MockChainClient {
    signer: Address,
    l2_chain_id: u64,
    state: Mutex<MockState>,
    on_submit: Mutex<Option<SubmitHook>>,
}

impl MockChainClient {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            l2_chain_id: 167,
            state: Mutex::new(MockState {
                block_number: 100,
                timestamp: 1_700_000_000,
                ..Default::default()
            }),
            on_submit: Mutex::new(None),
        }
    }

    /// Runs `f` on the mutable chain state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().expect("mock state poisoned");
        f(&mut state)
    }

    /// Installs a hook applied to the chain state whenever a submission is accepted, e.g. to
    /// make an oracle update or deposit visible.
    pub fn on_submit(&self, hook: impl FnMut(&SubmittedTx, &mut MockState) + Send + 'static) {
        *self.on_submit.lock().expect("mock hook poisoned") = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.with_state(|s| s.submitted.clone())
    }

    fn observation(state: &MockState, value: U256) -> OracleObservation {
        OracleObservation {
            value,
            block_number: state.block_number,
            timestamp: state.timestamp,
        }
    }

    fn read(&self, layer: Layer, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        self.with_state(|s| {
            let (errors, calls) = match layer {
                Layer::L1 => {
                    s.calls.push(MockCall::ReadL1(key.clone()));
                    (&mut s.l1_read_errors, &s.l1_calls)
                }
                Layer::L2 => {
                    s.calls.push(MockCall::ReadL2(key.clone()));
                    (&mut s.l2_read_errors, &s.l2_calls)
                }
            };
            if let Some(err) = errors.pop_front() {
                return Err(err);
            }
            let value = match key {
                ValueKey::GasPrice => s.gas_price,
                ValueKey::Call { to, calldata } => calls
                    .get(&(*to, calldata.clone()))
                    .copied()
                    .ok_or_else(|| ServiceError::Decode(format!("no answer for call to {to}")))?,
            };
            Ok(Self::observation(s, value))
        })
    }

    fn submit(
        &self,
        layer: Layer,
        to: Address,
        data: Bytes,
        value: U256,
        replaces: Option<TxHandle>,
    ) -> Result<TxHandle, ServiceError> {
        let tx = self.with_state(|s| {
            s.calls.push(match layer {
                Layer::L1 => MockCall::SubmitL1 {
                    to,
                    data: data.clone(),
                    value,
                },
                Layer::L2 => MockCall::SubmitL2 {
                    to,
                    data: data.clone(),
                },
            });
            if let Some(err) = s.submit_errors.pop_front() {
                return Err(err);
            }
            let sequence = u64::try_from(s.submitted.len()).unwrap_or(u64::MAX);
            let nonce = match replaces {
                Some(original) => original.nonce,
                None => {
                    let next = s.next_nonce.entry(layer).or_default();
                    *next += 1;
                    *next - 1
                }
            };
            let tx = SubmittedTx {
                handle: TxHandle {
                    layer,
                    hash: B256::left_padding_from(&(sequence + 1).to_be_bytes()),
                    nonce,
                },
                to,
                data,
                value,
            };
            s.submitted.push(tx.clone());
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            Ok(tx)
        })?;

        if let Some(hook) = self.on_submit.lock().expect("mock hook poisoned").as_mut() {
            self.with_state(|s| hook(&tx, s));
        }
        Ok(tx.handle)
    }
}

impl ChainClient for MockChainClient {
    fn signer_address(&self) -> Address {
        self.signer
    }

    fn l2_chain_id(&self) -> u64 {
        self.l2_chain_id
    }

    async fn read_l1_value(&self, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        self.read(Layer::L1, key)
    }

    async fn read_l2_value(&self, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        self.read(Layer::L2, key)
    }

    async fn read_l2_balance(&self, address: Address) -> Result<U256, ServiceError> {
        self.with_state(|s| {
            s.calls.push(MockCall::ReadBalance(address));
            if let Some(err) = s.balance_errors.pop_front() {
                return Err(err);
            }
            Ok(s.l2_balances.get(&address).copied().unwrap_or_default())
        })
    }

    async fn submit_l2_transaction(
        &self,
        to: Address,
        data: Bytes,
        replaces: Option<TxHandle>,
    ) -> Result<TxHandle, ServiceError> {
        self.submit(Layer::L2, to, data, U256::ZERO, replaces)
    }

    async fn submit_l1_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        replaces: Option<TxHandle>,
    ) -> Result<TxHandle, ServiceError> {
        self.submit(Layer::L1, to, data, value, replaces)
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle, _confirmations: u64) -> TxStatus {
        self.with_state(|s| {
            s.calls.push(MockCall::WaitForConfirmation(*handle));
            s.in_flight = s.in_flight.saturating_sub(1);
            s.confirmation_results
                .pop_front()
                .unwrap_or(TxStatus::Confirmed {
                    block_number: s.block_number,
                })
        })
    }

    async fn check_confirmation(
        &self,
        handle: &TxHandle,
        _confirmations: u64,
    ) -> Result<Option<TxStatus>, ServiceError> {
        self.with_state(|s| {
            s.calls.push(MockCall::CheckConfirmation(*handle));
            Ok(s.check_results.pop_front().flatten())
        })
    }
}
