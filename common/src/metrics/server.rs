use crate::chain_client::ChainClient;
use crate::metrics::Metrics;
use crate::utils::cancellation_token::CancellationToken;
use alloy::primitives::Address;
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use warp::Filter;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BalanceResponse {
    pub address: String,
    /// Decimal wei amount, `None` when the account cannot be read.
    pub balance: Option<String>,
}

pub async fn balance_response<C: ChainClient>(
    client: Option<Arc<C>>,
    address: String,
) -> BalanceResponse {
    let balance = match (client, Address::from_str(&address)) {
        (Some(client), Ok(parsed)) => client
            .try_read_l2_balance(parsed)
            .await
            .map(|b| b.to_string()),
        _ => None,
    };
    BalanceResponse { address, balance }
}

/// Serves `/metrics` and, when a client is given, `/balance/{address}` for balance pollers.
pub fn serve_metrics<C: ChainClient + 'static>(
    metrics: Arc<Metrics>,
    balance_client: Option<Arc<C>>,
    port: u16,
    cancel_token: CancellationToken,
) {
    tokio::spawn(async move {
        let metrics_route = warp::path!("metrics").and(warp::get()).map(move || {
            let output = metrics.gather();
            warp::reply::with_header(output, "Content-Type", "text/plain; version=0.0.4")
        });

        let balance_route = warp::path!("balance" / String)
            .and(warp::get())
            .then(move |address: String| {
                let client = balance_client.clone();
                async move { warp::reply::json(&balance_response(client, address).await) }
            });

        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        info!("Metrics server listening on {}", addr);
        let server = warp::serve(metrics_route.or(balance_route))
            .bind(addr)
            .await;

        let shutdown_token = cancel_token.clone();
        server
            .graceful(async move {
                shutdown_token.cancelled().await;
                info!("Shutdown signal received, stopping metrics server...");
            })
            .run()
            .await;
    });
}
