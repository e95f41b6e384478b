mod config;
mod decision;
mod pending;

pub use config::FundsControllerConfig;
pub use decision::{FundingCheck, evaluate_funding};
pub use pending::{PendingDeposit, PendingDeposits, PendingStatus};

use crate::{
    chain_client::{ChainClient, ServiceError, TxHandle},
    l1::bindings::L1Portal,
    service::{Recheck, ServiceCore, ServiceState, Settlement, check_submission, ticker},
    utils::clock::Clock,
};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Keeps a set of L2 accounts funded by depositing through the L1 portal.
pub struct OnboardingFunder<C: ChainClient + 'static> {
    config: FundsControllerConfig,
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    pending: PendingDeposits,
    /// Accounts given up on after a fatal error. They are no longer checked.
    faulted: HashSet<Address>,
    core: ServiceCore,
}

impl<C: ChainClient + 'static> OnboardingFunder<C> {
    pub fn new(
        config: FundsControllerConfig,
        client: Arc<C>,
        clock: Arc<dyn Clock>,
        pending: PendingDeposits,
        core: ServiceCore,
    ) -> Self {
        Self {
            config,
            client,
            clock,
            pending,
            faulted: HashSet::new(),
            core,
        }
    }

    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    pub fn pending(&self) -> &PendingDeposits {
        &self.pending
    }

    pub fn is_account_faulted(&self, address: Address) -> bool {
        self.faulted.contains(&address)
    }

    /// Spawns the monitoring loop. The task ends on shutdown or once every watched account
    /// faulted and yields the final state.
    pub fn run(self) -> JoinHandle<ServiceState> {
        tokio::spawn(async move {
            info!(
                "Starting {} for {} account(s)...",
                self.core.name(),
                self.config.watched_addresses.len()
            );
            self.monitor_funds_level().await
        })
    }

    async fn monitor_funds_level(mut self) -> ServiceState {
        let mut interval = ticker(self.config.monitor_interval);
        while self.core.next_tick(&mut interval).await {
            match self.tick().await {
                Ok(()) => {}
                Err(ServiceError::Shutdown) => {
                    self.core.transition(ServiceState::Idle);
                    break;
                }
                Err(e) => {
                    self.core.fault(e);
                    break;
                }
            }
        }
        self.core.state()
    }

    /// One pass over every watched account.
    ///
    /// A fatal error only takes its own account out of the rotation. The error is returned once
    /// no healthy account is left.
    pub async fn tick(&mut self) -> Result<(), ServiceError> {
        for address in self.config.watched_addresses.clone() {
            if self.faulted.contains(&address) {
                continue;
            }
            match self.check_account(address).await {
                Ok(()) => {}
                Err(ServiceError::Shutdown) => return Err(ServiceError::Shutdown),
                Err(e) => {
                    self.faulted.insert(address);
                    if self.all_accounts_faulted() {
                        return Err(e);
                    }
                    self.core.fault_subject(address.to_string(), e);
                }
            }
        }
        self.core.transition(ServiceState::Idle);
        Ok(())
    }

    fn all_accounts_faulted(&self) -> bool {
        self.config
            .watched_addresses
            .iter()
            .all(|address| self.faulted.contains(address))
    }

    async fn check_account(&mut self, address: Address) -> Result<(), ServiceError> {
        self.core.transition(ServiceState::Checking);
        let client = self.client.as_ref();
        let balance = self
            .core
            .retry("L2 balance read", || client.read_l2_balance(address))
            .await?;
        self.core.metrics().set_l2_balance(address, balance);

        self.core.transition(ServiceState::Deciding);
        if self.pending_deposit_outstanding(address, balance) {
            return Ok(());
        }

        let check = evaluate_funding(
            address,
            balance,
            self.config.threshold,
            self.config.top_up,
        );
        self.core.record_decision(
            address.to_string(),
            balance,
            balance.saturating_add(check.amount),
            check.should_fund,
            if check.should_fund {
                format!(
                    "balance below threshold {}, depositing {}",
                    check.threshold, check.amount
                )
            } else {
                format!("balance at or above threshold {}", check.threshold)
            },
        );
        if !check.should_fund {
            return Ok(());
        }

        self.deposit(check).await
    }

    /// Clears a pending marker once the balance reflects it. Returns `true` while the
    /// account still waits for an earlier deposit.
    fn pending_deposit_outstanding(&mut self, address: Address, balance: U256) -> bool {
        let chain_id = self.client.l2_chain_id();
        let Some(pending) = self.pending.get(chain_id, address).cloned() else {
            return false;
        };

        match pending.status(
            balance,
            self.config.threshold,
            self.clock.now_secs(),
            self.config.pending_deposit_timeout,
        ) {
            PendingStatus::Credited => {
                info!(
                    "Deposit {} to {} credited on L2 (balance {})",
                    pending.l1_tx_hash, address, balance
                );
                self.pending.remove(chain_id, address);
                false
            }
            PendingStatus::Expired => {
                warn!(
                    "Deposit {} to {} not credited after {}s, funding again if needed",
                    pending.l1_tx_hash,
                    address,
                    self.config.pending_deposit_timeout.as_secs()
                );
                self.pending.remove(chain_id, address);
                false
            }
            PendingStatus::Waiting => {
                self.core.record_decision(
                    address.to_string(),
                    balance,
                    balance,
                    false,
                    format!("deposit {} still pending", pending.l1_tx_hash),
                );
                true
            }
        }
    }

    async fn deposit(&mut self, check: FundingCheck) -> Result<(), ServiceError> {
        let calldata = Bytes::from(
            L1Portal::depositTransactionCall {
                _to: check.address,
                _value: check.amount,
                _gasLimit: self.config.deposit_gas_limit,
                _isCreation: false,
                _data: Bytes::new(),
            }
            .abi_encode(),
        );

        let client = self.client.as_ref();
        let calldata = &calldata;
        let chain_id = client.l2_chain_id();
        let portal = self.config.l1_portal_address;
        let threshold = self.config.threshold;
        let address = check.address;
        let amount = check.amount;
        let balance_before = check.balance;
        let confirmations = self.core.confirmations();
        let pending = &mut self.pending;
        let clock = self.clock.as_ref();

        let result = self
            .core
            .submit_until_settled(
                client,
                ServiceState::Depositing,
                move |replaces| {
                    client.submit_l1_transaction(portal, calldata.clone(), amount, replaces)
                },
                |handle: &TxHandle| {
                    pending.insert(
                        chain_id,
                        address,
                        PendingDeposit {
                            l1_tx_hash: handle.hash,
                            amount,
                            balance_before,
                            submitted_at: clock.now_secs(),
                        },
                    )
                },
                move |handle| deposit_landed(client, handle, confirmations, address, threshold),
            )
            .await;

        let settlement = match result {
            Ok(settlement) => settlement,
            Err(e) => {
                if let ServiceError::Reverted { hash, .. } = &e
                    && self
                        .pending
                        .get(chain_id, address)
                        .is_some_and(|p| p.l1_tx_hash == *hash)
                {
                    self.pending.remove(chain_id, address);
                }
                return Err(e);
            }
        };

        let handle = match settlement {
            Settlement::Confirmed { handle, .. } => Some(handle),
            Settlement::Landed { handle } => handle,
        };
        if let Some(handle) = handle {
            info!("Deposit of {} wei to {} settled: {}", amount, address, handle);
            self.core.metrics().inc_deposits(address);
        }
        Ok(())
    }
}

/// A deposit landed if its receipt is on L1 or the account already holds the threshold. A
/// deposit the L1 node still knows is left alone.
async fn deposit_landed<C: ChainClient>(
    client: &C,
    handle: Option<TxHandle>,
    confirmations: u64,
    address: Address,
    threshold: U256,
) -> Result<Recheck, ServiceError> {
    if let Some(outcome) = check_submission(client, handle, confirmations).await? {
        return Ok(outcome);
    }
    let balance = client.read_l2_balance(address).await?;
    Ok(if balance >= threshold {
        Recheck::Landed
    } else {
        Recheck::NotLanded
    })
}
