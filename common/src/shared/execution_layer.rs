use crate::chain_client::{Layer, OracleObservation, ServiceError, TxStatus, ValueKey};
use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::{ReceiptResponse, TransactionBuilder},
    primitives::{Address, B256, Bytes, U256},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

/// Single chain endpoint: every call is bounded by `rpc_timeout`.
pub struct ExecutionLayer {
    provider: DynProvider,
    layer: Layer,
    chain_id: u64,
    signer_address: Address,
    rpc_timeout: Duration,
}

struct BlockRef {
    number: u64,
    timestamp: u64,
}

impl ExecutionLayer {
    pub async fn new(
        provider: DynProvider,
        layer: Layer,
        signer_address: Address,
        rpc_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        debug!("Creating {} ExecutionLayer from provider", layer);
        let chain_id = match timeout(rpc_timeout, provider.get_chain_id()).await {
            Ok(Ok(chain_id)) => chain_id,
            Ok(Err(e)) => {
                return Err(ServiceError::Rpc(format!(
                    "[{layer}] Failed to get chain ID: {e}"
                )));
            }
            Err(_) => {
                return Err(ServiceError::Rpc(format!(
                    "[{layer}] Failed to get chain ID: request timed out"
                )));
            }
        };

        Ok(Self {
            provider,
            layer,
            chain_id,
            signer_address,
            rpc_timeout,
        })
    }

    /// Creates a formatted error message with layer and chain ID prefix
    fn chain_message(&self, message: &str, context: &str) -> String {
        format!(
            "[{} chain id: {}] {}: {}",
            self.layer, self.chain_id, message, context
        )
    }

    fn rpc_error(&self, message: &str, context: &str) -> ServiceError {
        ServiceError::Rpc(self.chain_message(message, context))
    }

    async fn with_timeout<T, E, F>(&self, message: &str, request: F) -> Result<T, ServiceError>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match timeout(self.rpc_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.rpc_error(message, &e.to_string())),
            Err(_) => Err(self.rpc_error(message, "request timed out")),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    pub async fn get_account_balance(&self, account: Address) -> Result<U256, ServiceError> {
        self.with_timeout("Failed to get balance", self.provider.get_balance(account))
            .await
    }

    pub async fn get_latest_block_number(&self) -> Result<u64, ServiceError> {
        self.with_timeout(
            "Failed to get latest block number",
            self.provider.get_block_number(),
        )
        .await
    }

    async fn get_latest_block_ref(&self) -> Result<BlockRef, ServiceError> {
        let block = self
            .with_timeout(
                "Failed to get latest block",
                self.provider.get_block_by_number(BlockNumberOrTag::Latest),
            )
            .await?
            .ok_or_else(|| {
                ServiceError::Decode(self.chain_message("Failed to get latest block", "None"))
            })?;
        Ok(BlockRef {
            number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    /// Reads a numeric value pinned to the latest block.
    pub async fn read_value(&self, key: &ValueKey) -> Result<OracleObservation, ServiceError> {
        let block = self.get_latest_block_ref().await?;
        let value = match key {
            ValueKey::GasPrice => U256::from(
                self.with_timeout("Failed to get gas price", self.provider.get_gas_price())
                    .await?,
            ),
            ValueKey::Call { to, calldata } => {
                let request = TransactionRequest::default()
                    .with_to(*to)
                    .with_input(calldata.clone());
                let output = self
                    .with_timeout(
                        &format!("Failed to call {to}"),
                        self.provider
                            .call(request)
                            .block(BlockId::number(block.number)),
                    )
                    .await?;
                decode_word(&output).map_err(|e| {
                    ServiceError::Decode(self.chain_message(&format!("Call to {to}"), &e))
                })?
            }
        };

        Ok(OracleObservation {
            value,
            block_number: block.number,
            timestamp: block.timestamp,
        })
    }

    pub async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: Option<u64>,
    ) -> Result<(B256, u64), ServiceError> {
        let nonce = match nonce {
            Some(nonce) => nonce,
            None => {
                self.with_timeout(
                    "Failed to get nonce",
                    self.provider
                        .get_transaction_count(self.signer_address)
                        .pending(),
                )
                .await?
            }
        };
        let request = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(to)
            .with_input(data)
            .with_value(value)
            .with_nonce(nonce);

        match timeout(self.rpc_timeout, self.provider.send_transaction(request)).await {
            Ok(Ok(pending_tx)) => {
                let tx_hash = *pending_tx.tx_hash();
                debug!(
                    "[{}] sent transaction {} to {} with nonce {}",
                    self.layer, tx_hash, to, nonce
                );
                Ok((tx_hash, nonce))
            }
            Ok(Err(e)) => Err(ServiceError::from_submission_failure(
                self.chain_message("Failed to send transaction", &e.to_string()),
            )),
            Err(_) => Err(ServiceError::submission(
                self.chain_message("Failed to send transaction", "request timed out"),
                true,
            )),
        }
    }

    /// One-shot receipt lookup. Reports [`TxStatus::Pending`] while the transaction sits in the
    /// mempool or is not yet buried under `confirmations` blocks, and `None` once the node no
    /// longer knows it.
    pub async fn check_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<Option<TxStatus>, ServiceError> {
        let receipt = self
            .with_timeout(
                "Failed to get transaction receipt",
                self.provider.get_transaction_receipt(tx_hash),
            )
            .await?;
        let Some(receipt) = receipt else {
            let known = self
                .with_timeout(
                    "Failed to get transaction",
                    self.provider.get_transaction_by_hash(tx_hash),
                )
                .await?;
            return Ok(known.map(|_| TxStatus::Pending));
        };
        let Some(block_number) = receipt.block_number() else {
            return Ok(Some(TxStatus::Pending));
        };

        if !receipt.status() {
            let reason = crate::shared::alloy_tools::check_for_revert_reason(
                &self.provider,
                tx_hash,
                block_number,
            )
            .await;
            return Ok(Some(TxStatus::Reverted {
                block_number,
                reason,
            }));
        }

        let head = self.get_latest_block_number().await?;
        if head.saturating_sub(block_number).saturating_add(1) >= confirmations.max(1) {
            Ok(Some(TxStatus::Confirmed { block_number }))
        } else {
            Ok(Some(TxStatus::Pending))
        }
    }

    pub async fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        confirmations: u64,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> TxStatus {
        let deadline = Instant::now() + wait_timeout;
        loop {
            match self.check_confirmation(tx_hash, confirmations).await {
                Ok(Some(TxStatus::Pending)) | Ok(None) => {}
                Ok(Some(status)) => return status,
                Err(e) => warn!("Receipt check for {} failed: {}", tx_hash, e),
            }
            if Instant::now() + poll_interval > deadline {
                return TxStatus::TimedOut;
            }
            sleep(poll_interval).await;
        }
    }
}

/// Interprets call output as one ABI encoded 32-byte word.
pub fn decode_word(output: &[u8]) -> Result<U256, String> {
    if output.len() != 32 {
        return Err(format!(
            "expected a 32-byte word, got {} bytes",
            output.len()
        ));
    }
    Ok(U256::from_be_slice(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_word() {
        let mut word = [0u8; 32];
        word[31] = 106;
        assert_eq!(decode_word(&word), Ok(U256::from(106)));
    }

    #[test]
    fn test_decode_word_rejects_malformed_output() {
        assert!(decode_word(&[]).is_err());
        assert!(decode_word(&[0u8; 31]).is_err());
        assert!(decode_word(&[0u8; 64]).is_err());
    }
}
