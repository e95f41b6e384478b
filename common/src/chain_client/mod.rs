mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod types;

pub use error::ServiceError;
pub use types::{Layer, OracleObservation, TxHandle, TxStatus, ValueKey};

use crate::{
    shared::{alloy_tools, execution_layer::ExecutionLayer},
    signer::Signer,
};
use alloy::primitives::{Address, Bytes, U256};
use anyhow::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Read/write access to an L1 and an L2 chain under one signing key.
///
/// Services are generic over this trait so the state machines can be driven by in-memory
/// chains in tests.
pub trait ChainClient: Send + Sync {
    /// Address of the key transactions are signed with.
    fn signer_address(&self) -> Address;

    fn l2_chain_id(&self) -> u64;

    fn read_l1_value(
        &self,
        key: &ValueKey,
    ) -> impl Future<Output = Result<OracleObservation, ServiceError>> + Send;

    fn read_l2_value(
        &self,
        key: &ValueKey,
    ) -> impl Future<Output = Result<OracleObservation, ServiceError>> + Send;

    fn read_l2_balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, ServiceError>> + Send;

    /// Sends a transaction. With `replaces` set it reuses that transaction's nonce, so the
    /// chain accepts at most one of the two.
    fn submit_l2_transaction(
        &self,
        to: Address,
        data: Bytes,
        replaces: Option<TxHandle>,
    ) -> impl Future<Output = Result<TxHandle, ServiceError>> + Send;

    fn submit_l1_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        replaces: Option<TxHandle>,
    ) -> impl Future<Output = Result<TxHandle, ServiceError>> + Send;

    /// Waits until the transaction is buried under `confirmations` blocks, reverted, or the
    /// configured confirmation timeout elapses.
    fn wait_for_confirmation(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> impl Future<Output = TxStatus> + Send;

    /// Non-blocking variant of [`ChainClient::wait_for_confirmation`].
    ///
    /// Returns [`TxStatus::Pending`] while the node still knows the transaction and `None` once
    /// it knows nothing about it, i.e. the transaction was dropped or never propagated.
    fn check_confirmation(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> impl Future<Output = Result<Option<TxStatus>, ServiceError>> + Send;

    /// Balance of `address` on L2, or `None` when it cannot be read.
    fn try_read_l2_balance(&self, address: Address) -> impl Future<Output = Option<U256>> + Send {
        async move {
            match self.read_l2_balance(address).await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    debug!("L2 balance of {} unavailable: {}", address, e);
                    None
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct ChainClientConfig {
    pub l1_rpc_url: String,
    pub l2_rpc_url: String,
    pub signer: Arc<Signer>,
    pub rpc_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
}

pub struct ChainClientPair {
    l1: ExecutionLayer,
    l2: ExecutionLayer,
    confirmation_timeout: Duration,
    confirmation_poll_interval: Duration,
}

impl ChainClientPair {
    pub async fn new(config: ChainClientConfig) -> Result<Self, Error> {
        let signer_address = config.signer.get_address();

        let l1_provider =
            alloy_tools::construct_alloy_provider(&config.signer, &config.l1_rpc_url).await?;
        let l1 = ExecutionLayer::new(l1_provider, Layer::L1, signer_address, config.rpc_timeout)
            .await?;

        let l2_provider =
            alloy_tools::construct_alloy_provider(&config.signer, &config.l2_rpc_url).await?;
        let l2 = ExecutionLayer::new(l2_provider, Layer::L2, signer_address, config.rpc_timeout)
            .await?;

        info!(
            "Chain clients ready for {} (L1 chain id: {}, L2 chain id: {})",
            signer_address,
            l1.chain_id(),
            l2.chain_id()
        );

        Ok(Self {
            l1,
            l2,
            confirmation_timeout: config.confirmation_timeout,
            confirmation_poll_interval: config.confirmation_poll_interval,
        })
    }

    pub fn l1(&self) -> &ExecutionLayer {
        &self.l1
    }

    pub fn l2(&self) -> &ExecutionLayer {
        &self.l2
    }

    fn layer(&self, layer: Layer) -> &ExecutionLayer {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }
}

impl ChainClient for ChainClientPair {
    fn signer_address(&self) -> Address {
        self.l2.signer_address()
    }

    fn l2_chain_id(&self) -> u64 {
        self.l2.chain_id()
    }

    async fn read_l1_value(&self, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        self.l1.read_value(key).await
    }

    async fn read_l2_value(&self, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        self.l2.read_value(key).await
    }

    async fn read_l2_balance(&self, address: Address) -> Result<U256, ServiceError> {
        self.l2.get_account_balance(address).await
    }

    async fn submit_l2_transaction(
        &self,
        to: Address,
        data: Bytes,
        replaces: Option<TxHandle>,
    ) -> Result<TxHandle, ServiceError> {
        let (hash, nonce) = self
            .l2
            .send_transaction(to, data, U256::ZERO, replaces.map(|h| h.nonce))
            .await?;
        Ok(TxHandle {
            layer: Layer::L2,
            hash,
            nonce,
        })
    }

    async fn submit_l1_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        replaces: Option<TxHandle>,
    ) -> Result<TxHandle, ServiceError> {
        let (hash, nonce) = self
            .l1
            .send_transaction(to, data, value, replaces.map(|h| h.nonce))
            .await?;
        Ok(TxHandle {
            layer: Layer::L1,
            hash,
            nonce,
        })
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle, confirmations: u64) -> TxStatus {
        self.layer(handle.layer)
            .wait_for_confirmation(
                handle.hash,
                confirmations,
                self.confirmation_timeout,
                self.confirmation_poll_interval,
            )
            .await
    }

    async fn check_confirmation(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> Result<Option<TxStatus>, ServiceError> {
        self.layer(handle.layer)
            .check_confirmation(handle.hash, confirmations)
            .await
    }
}
