mod decision;

pub use decision::{RelayDecision, RelayReason, decide, drift_bps};

use crate::{
    bindings::{L1Oracle, L2Oracle},
    utils::config::{OracleSource, RelayerConfig},
};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use common::{
    chain_client::{ChainClient, ServiceError, ValueKey},
    service::{Recheck, ServiceCore, ServiceState, Settlement, check_submission, ticker},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRelayerConfig {
    pub l1_oracle_address: Address,
    pub l2_oracle_address: Address,
    pub source: OracleSource,
    pub update_interval: Duration,
    pub drift_threshold_bps: u64,
}

impl From<&RelayerConfig> for OracleRelayerConfig {
    fn from(config: &RelayerConfig) -> Self {
        Self {
            l1_oracle_address: config.l1_oracle_address,
            l2_oracle_address: config.l2_oracle_address,
            source: config.oracle_source,
            update_interval: config.l1_oracle_update_interval,
            drift_threshold_bps: config.drift_threshold_bps,
        }
    }
}

/// Value and `lastUpdated` stored in the L2 oracle, with the L2 block time they were read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainOracleState {
    pub value: U256,
    pub last_updated: u64,
    pub observed_at: u64,
}

/// Mirrors an L1 value into the L2 oracle contract.
pub struct OracleRelayer<C: ChainClient + 'static> {
    config: OracleRelayerConfig,
    client: Arc<C>,
    core: ServiceCore,
}

impl<C: ChainClient + 'static> OracleRelayer<C> {
    pub fn new(config: OracleRelayerConfig, client: Arc<C>, core: ServiceCore) -> Self {
        Self {
            config,
            client,
            core,
        }
    }

    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    /// Spawns the relay loop. The task yields the final state on shutdown or fault.
    pub fn run(self) -> JoinHandle<ServiceState> {
        tokio::spawn(async move {
            info!(
                "Starting {}: {} ({}) -> {} every {}s",
                self.core.name(),
                self.config.l1_oracle_address,
                self.config.source,
                self.config.l2_oracle_address,
                self.config.update_interval.as_secs()
            );
            self.relay_loop().await
        })
    }

    async fn relay_loop(mut self) -> ServiceState {
        let mut interval = ticker(self.config.update_interval);
        while self.core.next_tick(&mut interval).await {
            match self.tick().await {
                Ok(_) => {}
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

    fn source_key(&self) -> ValueKey {
        match self.config.source {
            OracleSource::Contract => ValueKey::call(
                self.config.l1_oracle_address,
                L1Oracle::latestValueCall {}.abi_encode(),
            ),
            OracleSource::GasPrice => ValueKey::GasPrice,
        }
    }

    fn l2_value_key(&self) -> ValueKey {
        ValueKey::call(self.config.l2_oracle_address, L2Oracle::valueCall {}.abi_encode())
    }

    fn l2_last_updated_key(&self) -> ValueKey {
        ValueKey::call(
            self.config.l2_oracle_address,
            L2Oracle::lastUpdatedCall {}.abi_encode(),
        )
    }

    async fn read_on_chain_state(&self) -> Result<OnChainOracleState, ServiceError> {
        let client = self.client.as_ref();
        let value_key = self.l2_value_key();
        let last_updated_key = self.l2_last_updated_key();

        let value = self
            .core
            .retry("L2 oracle value read", || client.read_l2_value(&value_key))
            .await?;
        let last_updated = self
            .core
            .retry("L2 oracle lastUpdated read", || {
                client.read_l2_value(&last_updated_key)
            })
            .await?;

        Ok(OnChainOracleState {
            value: value.value,
            last_updated: u64::try_from(last_updated.value).map_err(|_| {
                ServiceError::Decode(format!(
                    "lastUpdated {} does not fit a unix timestamp",
                    last_updated.value
                ))
            })?,
            observed_at: value.timestamp,
        })
    }

    /// One poll, decide and, when needed, submit cycle. Returns the decision taken.
    pub async fn tick(&mut self) -> Result<RelayDecision, ServiceError> {
        self.core.transition(ServiceState::Polling);
        let client = self.client.as_ref();
        let source_key = self.source_key();
        let observation = self
            .core
            .retry("L1 value read", || client.read_l1_value(&source_key))
            .await?;
        let on_chain = self.read_on_chain_state().await?;
        self.core
            .metrics()
            .set_oracle_values(observation.value, on_chain.value);

        self.core.transition(ServiceState::Deciding);
        let decision = decide(
            observation.value,
            on_chain.value,
            on_chain.last_updated,
            on_chain.observed_at,
            self.config.update_interval,
            self.config.drift_threshold_bps,
        );
        self.core.record_decision(
            "oracle",
            on_chain.value,
            decision.value,
            decision.should_submit,
            decision.reason.to_string(),
        );

        if decision.should_submit {
            self.submit_update(decision.value, observation.block_number)
                .await?;
        } else {
            debug!(
                "L2 oracle up to date (L1 {}, L2 {})",
                observation.value, on_chain.value
            );
        }

        self.core.transition(ServiceState::Idle);
        Ok(decision)
    }

    async fn submit_update(&mut self, value: U256, l1_block_number: u64) -> Result<(), ServiceError> {
        let calldata = Bytes::from(
            L2Oracle::setValueCall {
                _value: value,
                _l1BlockNumber: l1_block_number,
            }
            .abi_encode(),
        );

        let client = self.client.as_ref();
        let calldata = &calldata;
        let oracle = self.config.l2_oracle_address;
        let value_key = self.l2_value_key();
        let value_key = &value_key;
        let confirmations = self.core.confirmations();

        let settlement = self
            .core
            .submit_until_settled(
                client,
                ServiceState::Submitting,
                move |replaces| client.submit_l2_transaction(oracle, calldata.clone(), replaces),
                |_| {},
                move |handle| async move {
                    let stored = client.read_l2_value(value_key).await?;
                    if stored.value == value {
                        return Ok(Recheck::Landed);
                    }
                    Ok(check_submission(client, handle, confirmations)
                        .await?
                        .unwrap_or(Recheck::NotLanded))
                },
            )
            .await?;

        match settlement {
            Settlement::Confirmed {
                handle,
                block_number,
            } => info!(
                "L2 oracle set to {} (L1 block {}) by {} in block {}",
                value, l1_block_number, handle, block_number
            ),
            Settlement::Landed { .. } => info!(
                "L2 oracle already holds {} (L1 block {})",
                value, l1_block_number
            ),
        }
        Ok(())
    }
}
