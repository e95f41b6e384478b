use anyhow::Error;
use clap::{Parser, ValueEnum};
use common::{
    config::{RuntimeConfig, env_lookup},
    metrics::{self, Metrics},
    service::{RunningServices, join_services},
    utils::cancellation_token::CancellationToken,
};
use std::fmt;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

// Initialize rustls crypto provider before any TLS operations
fn init_rustls() -> Result<(), Error> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default rustls crypto provider"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Service {
    /// L1 to L2 oracle relayer, with a funder for the relayer's own L2 account
    Relayer,
    /// Deposit funder for onboarded L2 accounts
    Onboarding,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Relayer => write!(f, "relayer"),
            Service::Onboarding => write!(f, "onboarding"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "relayer_node", version)]
#[command(about = "Relays an L1 value into an L2 oracle and keeps L2 accounts funded")]
struct Args {
    #[arg(long, env = "SERVICE", value_enum, default_value_t = Service::Relayer)]
    service: Service,
}

enum ExecutionStopped {
    CloseApp,
    RecreateNode,
}

const WAIT_BEFORE_RECREATING_NODE_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_rustls()?;
    dotenvy::dotenv().ok();

    common::utils::logging::init_logging();

    let args = Args::parse();
    info!(
        "🚀 Starting relayer node v{} ({} service)",
        env!("CARGO_PKG_VERSION"),
        args.service
    );

    let mut iteration = 0;
    let metrics = Arc::new(Metrics::new());
    loop {
        iteration += 1;
        match run_node(iteration, args.service, metrics.clone()).await {
            Ok(ExecutionStopped::CloseApp) => {
                info!("👋 ExecutionStopped::CloseApp , shutting down...");
                break;
            }
            Ok(ExecutionStopped::RecreateNode) => {
                info!("🔄 ExecutionStopped::RecreateNode, recreating node...");
                continue;
            }
            Err(e) => {
                error!("Failed to run node: {}", e);
                metrics.inc_critical_errors();
                info!(
                    "Waiting {WAIT_BEFORE_RECREATING_NODE_SECS} second before recreating node..."
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(
                    WAIT_BEFORE_RECREATING_NODE_SECS,
                ))
                .await;
                continue;
            }
        }
    }

    Ok(())
}

async fn run_node(
    iteration: u64,
    service: Service,
    metrics: Arc<Metrics>,
) -> Result<ExecutionStopped, Error> {
    info!("Running node iteration: {iteration}");

    let runtime = RuntimeConfig::from_lookup(&env_lookup)
        .map_err(|e| anyhow::anyhow!("Failed to read runtime configuration: {}", e))?;
    info!("Runtime config:\n{}", runtime);

    let cancel_token = CancellationToken::new(metrics.clone());

    // Set up panic hook to cancel token on panic
    let panic_cancel_token = cancel_token.clone();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Panic occurred: {:?}", panic_info);
        panic_cancel_token.cancel_on_critical_error();
        info!("Cancellation token triggered, initiating shutdown...");
    }));

    let RunningServices {
        tasks,
        balance_client,
    } = match service {
        Service::Relayer => {
            relayer::create_relayer_node(&runtime, metrics.clone(), cancel_token.clone()).await?
        }
        Service::Onboarding => {
            onboarding::create_onboarding_service(&runtime, metrics.clone(), cancel_token.clone())
                .await?
        }
    };

    metrics::server::serve_metrics(
        metrics.clone(),
        Some(balance_client),
        runtime.metrics_port,
        cancel_token.clone(),
    );

    let stopped = wait_for_the_termination(cancel_token).await?;

    info!(
        "Waiting up to {}s for services to stop...",
        runtime.shutdown_grace.as_secs()
    );
    for (name, state) in join_services(tasks, runtime.shutdown_grace).await {
        if state.is_none() {
            warn!("{name} was stopped without reporting a final state");
        }
    }

    Ok(stopped)
}

async fn wait_for_the_termination(cancel_token: CancellationToken) -> Result<ExecutionStopped, Error> {
    info!("Starting signal handler...");
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to set up SIGTERM handler: {}", e))?;
    let stopped = tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            cancel_token.cancel();
            ExecutionStopped::CloseApp
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel_token.cancel();
            ExecutionStopped::CloseApp
        }
        _ = cancel_token.cancelled() => {
            info!("Shutdown signal received, recreating relayer node...");
            // prevent rapid recreation of the node in case of initial error
            tokio::time::sleep(tokio::time::Duration::from_secs(WAIT_BEFORE_RECREATING_NODE_SECS)).await;
            ExecutionStopped::RecreateNode
        }
    };
    Ok(stopped)
}
