use crate::{oracle::OracleRelayer, utils::config::RelayerConfig};
use anyhow::Error;
use common::{
    chain_client::ChainClientPair,
    config::{ConfigTrait, RuntimeConfig},
    funds_controller::{OnboardingFunder, PendingDeposits},
    metrics::Metrics,
    service::{EventSink, RunningServices, ServiceCore, ServiceTask, TracingSink},
    signer::create_signer,
    utils::{cancellation_token::CancellationToken, clock::SystemClock},
};
use std::sync::Arc;
use tracing::info;

pub mod bindings;
pub mod oracle;
pub mod utils;

pub const ORACLE_SERVICE: &str = "oracle-relayer";
pub const FUNDER_SERVICE: &str = "relayer-funder";

/// Starts the oracle relayer and a funder keeping the relayer's L2 account topped up.
///
/// Both services sign with their own key, so they never compete for a nonce.
pub async fn create_relayer_node(
    runtime: &RuntimeConfig,
    metrics: Arc<Metrics>,
    cancel_token: CancellationToken,
) -> Result<RunningServices, Error> {
    let config = RelayerConfig::read_env_variables()
        .map_err(|e| anyhow::anyhow!("Failed to read relayer configuration: {}", e))?;
    info!("Relayer config:\n{}", config);

    let relayer_signer = create_signer(&config.relayer_private_key)?;
    let funder_signer = create_signer(&config.funder_private_key)?;
    let relayer_address = relayer_signer.get_address();

    let relayer_client = Arc::new(
        ChainClientPair::new(runtime.chain_client_config(&config.endpoints, relayer_signer))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create relayer chain clients: {}", e))?,
    );
    let funder_client = Arc::new(
        ChainClientPair::new(runtime.chain_client_config(&config.endpoints, funder_signer))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create funder chain clients: {}", e))?,
    );

    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

    let relayer = OracleRelayer::new(
        (&config).into(),
        relayer_client.clone(),
        ServiceCore::new(
            ORACLE_SERVICE,
            runtime.service_settings(),
            sink.clone(),
            metrics.clone(),
            cancel_token.clone(),
        ),
    );

    let funding = config.funding.clone().watching_or(relayer_address);
    let pending = PendingDeposits::load(funding.pending_deposits_file.clone())?;
    let funder = OnboardingFunder::new(
        funding,
        funder_client,
        Arc::new(SystemClock),
        pending,
        ServiceCore::new(
            FUNDER_SERVICE,
            runtime.service_settings(),
            sink,
            metrics,
            cancel_token,
        ),
    );

    Ok(RunningServices {
        tasks: vec![
            ServiceTask::new(ORACLE_SERVICE, relayer.run()),
            ServiceTask::new(FUNDER_SERVICE, funder.run()),
        ],
        balance_client: relayer_client,
    })
}
