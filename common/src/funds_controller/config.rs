use crate::config::{
    Lookup, TopUpPolicy, parse_address, parse_address_list, parse_positive_u64, parse_u256,
};
use alloy::primitives::{Address, U256};
use anyhow::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsControllerConfig {
    pub l1_portal_address: Address,
    pub threshold: U256,
    /// L2 accounts kept above `threshold`.
    pub watched_addresses: Vec<Address>,
    pub top_up: TopUpPolicy,
    /// L2 gas limit forwarded with every deposit.
    pub deposit_gas_limit: u64,
    pub monitor_interval: Duration,
    pub pending_deposit_timeout: Duration,
    pub pending_deposits_file: Option<PathBuf>,
}

impl FundsControllerConfig {
    pub fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        let l1_portal_address = parse_address(lookup, "L1_PORTAL_ADDRESS")?;
        let threshold = match lookup("DEPOSIT_FUNDING_THRESHOLD") {
            Some(_) => parse_u256(lookup, "DEPOSIT_FUNDING_THRESHOLD", U256::ZERO)?,
            None => {
                return Err(crate::config::config_error(
                    "DEPOSIT_FUNDING_THRESHOLD must be set",
                ));
            }
        };

        Ok(Self {
            l1_portal_address,
            threshold,
            watched_addresses: parse_address_list(lookup, "ONBOARDING_WATCHED_ADDRESSES")?,
            top_up: TopUpPolicy::from_lookup(lookup)?,
            deposit_gas_limit: parse_positive_u64(lookup, "DEPOSIT_GAS_LIMIT", 100_000)?,
            monitor_interval: Duration::from_secs(parse_positive_u64(
                lookup,
                "FUNDS_MONITOR_INTERVAL_SEC",
                60,
            )?),
            pending_deposit_timeout: Duration::from_secs(parse_positive_u64(
                lookup,
                "PENDING_DEPOSIT_TIMEOUT_SEC",
                900,
            )?),
            pending_deposits_file: lookup("PENDING_DEPOSITS_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Watches `default` when no account was configured explicitly.
    pub fn watching_or(mut self, default: Address) -> Self {
        if self.watched_addresses.is_empty() {
            self.watched_addresses.push(default);
        }
        self
    }
}

impl fmt::Display for FundsControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "L1 portal: {}", self.l1_portal_address)?;
        writeln!(f, "Funding threshold: {} wei", self.threshold)?;
        writeln!(f, "Top-up: {}", self.top_up)?;
        writeln!(f, "Deposit gas limit: {}", self.deposit_gas_limit)?;
        writeln!(
            f,
            "Watched accounts: {}",
            self.watched_addresses
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        writeln!(f, "Monitor interval: {}s", self.monitor_interval.as_secs())?;
        write!(
            f,
            "Pending deposit timeout: {}s{}",
            self.pending_deposit_timeout.as_secs(),
            self.pending_deposits_file
                .as_ref()
                .map(|p| format!(", persisted to {}", p.display()))
                .unwrap_or_default()
        )
    }
}
