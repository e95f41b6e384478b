use crate::utils::config::OnboardingServiceConfig;
use anyhow::Error;
use common::{
    chain_client::ChainClientPair,
    config::{ConfigTrait, RuntimeConfig},
    funds_controller::{OnboardingFunder, PendingDeposits},
    metrics::Metrics,
    service::{RunningServices, ServiceCore, ServiceTask, TracingSink},
    signer::create_signer,
    utils::{cancellation_token::CancellationToken, clock::SystemClock},
};
use std::sync::Arc;
use tracing::info;

pub mod utils;

pub const ONBOARDING_SERVICE: &str = "onboarding-funder";

/// Starts the funder that keeps newly onboarded L2 accounts above the deposit threshold.
pub async fn create_onboarding_service(
    runtime: &RuntimeConfig,
    metrics: Arc<Metrics>,
    cancel_token: CancellationToken,
) -> Result<RunningServices, Error> {
    let config = OnboardingServiceConfig::read_env_variables()
        .map_err(|e| anyhow::anyhow!("Failed to read onboarding configuration: {}", e))?;

    let signer = create_signer(&config.funder_private_key)?;
    let funding = config.funding.clone().watching_or(signer.get_address());
    info!("Onboarding config:\n{}\n{}", config, funding);

    let client = Arc::new(
        ChainClientPair::new(runtime.chain_client_config(&config.endpoints, signer))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create funder chain clients: {}", e))?,
    );

    let pending = PendingDeposits::load(funding.pending_deposits_file.clone())?;
    info!("Loaded {} pending deposit(s)", pending.len());

    let funder = OnboardingFunder::new(
        funding,
        client.clone(),
        Arc::new(SystemClock),
        pending,
        ServiceCore::new(
            ONBOARDING_SERVICE,
            runtime.service_settings(),
            Arc::new(TracingSink),
            metrics,
            cancel_token,
        ),
    );

    Ok(RunningServices {
        tasks: vec![ServiceTask::new(ONBOARDING_SERVICE, funder.run())],
        balance_client: client,
    })
}
