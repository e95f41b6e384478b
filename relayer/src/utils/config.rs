use alloy::primitives::{Address, U256};
use anyhow::Error;
use common::{
    config::{
        ChainEndpoints, ConfigTrait, Lookup, config_error, parse_address,
        parse_positive_u64, parse_private_key, redact,
    },
    funds_controller::FundsControllerConfig,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where the relayed L1 value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OracleSource {
    /// `latestValue()` on the L1 oracle contract.
    Contract,
    /// The L1 node's gas price.
    GasPrice,
}

#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub endpoints: ChainEndpoints,
    pub relayer_private_key: String,
    pub funder_private_key: String,
    pub l1_oracle_address: Address,
    pub l1_portal_address: Address,
    pub l2_portal_address: Address,
    /// Contract receiving `setValue`.
    pub l2_oracle_address: Address,
    pub l1_oracle_update_interval: Duration,
    pub deposit_funding_threshold: U256,
    pub oracle_source: OracleSource,
    pub drift_threshold_bps: u64,
    /// Keeps the relayer's L2 account able to pay for updates.
    pub funding: FundsControllerConfig,
}

fn normalized_key(key: &str) -> String {
    key.trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .to_ascii_lowercase()
}

impl ConfigTrait for RelayerConfig {
    fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        let endpoints = ChainEndpoints::from_lookup(lookup)?;

        let relayer_private_key = parse_private_key(lookup, "RELAYER_PRIVATE_KEY")?;
        let funder_private_key = parse_private_key(lookup, "FUNDER_PRIVATE_KEY")?;
        if normalized_key(&relayer_private_key) == normalized_key(&funder_private_key) {
            return Err(config_error(
                "RELAYER_PRIVATE_KEY and FUNDER_PRIVATE_KEY must differ, each service needs its own nonce sequence",
            ));
        }

        let l1_oracle_address = parse_address(lookup, "L1_ORACLE_ADDRESS")?;
        let l2_portal_address = parse_address(lookup, "L2_PORTAL_ADDRESS")?;
        let l2_oracle_address = parse_address(lookup, "L2_ORACLE_ADDRESS")?;

        let l1_oracle_update_interval = Duration::from_secs(parse_positive_u64(
            lookup,
            "L1_ORACLE_UPDATE_INTERVAL_SEC",
            60,
        )?);

        let oracle_source = match lookup("ORACLE_SOURCE") {
            None => OracleSource::Contract,
            Some(raw) => OracleSource::from_str(raw.trim()).map_err(|_| {
                config_error(format!(
                    "ORACLE_SOURCE must be 'contract' or 'gas_price', got '{raw}'"
                ))
            })?,
        };

        let drift_threshold_bps = parse_positive_u64(lookup, "ORACLE_DRIFT_THRESHOLD_BPS", 500)?;

        let funding = FundsControllerConfig::from_lookup(lookup)?;

        Ok(RelayerConfig {
            endpoints,
            relayer_private_key,
            funder_private_key,
            l1_oracle_address,
            l1_portal_address: funding.l1_portal_address,
            l2_portal_address,
            l2_oracle_address,
            l1_oracle_update_interval,
            deposit_funding_threshold: funding.threshold,
            oracle_source,
            drift_threshold_bps,
            funding,
        })
    }
}

impl fmt::Display for RelayerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "L1 RPC URL: {}", self.endpoints.l1_rpc_url)?;
        writeln!(f, "L2 RPC URL: {}", self.endpoints.l2_rpc_url)?;
        writeln!(f, "Relayer key: {}", redact(&self.relayer_private_key))?;
        writeln!(f, "Funder key: {}", redact(&self.funder_private_key))?;
        writeln!(f, "L1 oracle: {} ({})", self.l1_oracle_address, self.oracle_source)?;
        writeln!(f, "L2 oracle: {}", self.l2_oracle_address)?;
        writeln!(f, "L2 portal: {}", self.l2_portal_address)?;
        writeln!(
            f,
            "Update interval: {}s, drift threshold: {} bps",
            self.l1_oracle_update_interval.as_secs(),
            self.drift_threshold_bps
        )?;
        write!(f, "{}", self.funding)
    }
}
