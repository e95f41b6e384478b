use alloy::primitives::{Address, U256};
use anyhow::Error;
use common::{
    config::{ChainEndpoints, ConfigTrait, Lookup, parse_private_key, redact},
    funds_controller::FundsControllerConfig,
};
use std::fmt;

#[derive(Debug, Clone)]
pub struct OnboardingServiceConfig {
    pub endpoints: ChainEndpoints,
    pub funder_private_key: String,
    pub l1_portal_address: Address,
    pub deposit_funding_threshold: U256,
    /// Watched accounts are left empty here when none were configured; the service then
    /// watches the funder's own address.
    pub funding: FundsControllerConfig,
}

impl ConfigTrait for OnboardingServiceConfig {
    fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        let endpoints = ChainEndpoints::from_lookup(lookup)?;
        let funder_private_key = parse_private_key(lookup, "FUNDER_PRIVATE_KEY")?;
        let funding = FundsControllerConfig::from_lookup(lookup)?;

        Ok(OnboardingServiceConfig {
            endpoints,
            funder_private_key,
            l1_portal_address: funding.l1_portal_address,
            deposit_funding_threshold: funding.threshold,
            funding,
        })
    }
}

impl fmt::Display for OnboardingServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "L1 RPC URL: {}", self.endpoints.l1_rpc_url)?;
        writeln!(f, "L2 RPC URL: {}", self.endpoints.l2_rpc_url)?;
        write!(f, "Funder key: {}", redact(&self.funder_private_key))
    }
}
