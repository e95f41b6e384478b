use crate::signer::Signer;
use alloy::{
    eips::BlockId,
    network::EthereumWallet,
    primitives::B256,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use anyhow::Error;
use tracing::debug;

// Transport level retries only cover rate limiting; the services run their own backoff.
const MAX_RATE_LIMIT_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MS: u64 = 200;
const COMPUTE_UNITS_PER_SECOND: u64 = u64::MAX;

async fn connect_rpc_client(url: &str) -> Result<RpcClient, Error> {
    let retry_layer = RetryBackoffLayer::new(
        MAX_RATE_LIMIT_RETRIES,
        INITIAL_BACKOFF_MS,
        COMPUTE_UNITS_PER_SECOND,
    );
    RpcClient::builder()
        .layer(retry_layer)
        .connect(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {url}: {e}"))
}

pub async fn construct_alloy_provider(signer: &Signer, url: &str) -> Result<DynProvider, Error> {
    debug!(
        "Creating provider for {} with signer {}",
        url,
        signer.get_address()
    );
    let wallet = EthereumWallet::from(signer.local_signer().clone());
    let client = connect_rpc_client(url).await?;
    Ok(ProviderBuilder::new()
        .wallet(wallet)
        .connect_client(client)
        .erased())
}

/// Replays a reverted transaction against the parent state to recover the revert reason.
pub async fn check_for_revert_reason(
    provider: &DynProvider,
    tx_hash: B256,
    block_number: u64,
) -> String {
    let tx = match provider.get_transaction_by_hash(tx_hash).await {
        Ok(Some(tx)) => tx,
        Ok(None) => return format!("Transaction {tx_hash} reverted, transaction not found"),
        Err(e) => return format!("Transaction {tx_hash} reverted, failed to fetch it: {e}"),
    };

    let request = tx.into_request();
    match provider
        .call(request)
        .block(BlockId::number(block_number.saturating_sub(1)))
        .await
    {
        Ok(_) => format!("Transaction {tx_hash} reverted in block {block_number}, no reason found"),
        Err(e) => format!("Transaction {tx_hash} reverted in block {block_number}: {e}"),
    }
}
