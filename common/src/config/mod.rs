mod config_trait;
pub use config_trait::ConfigTrait;

use crate::{
    chain_client::{ChainClientConfig, ServiceError},
    service::{RetryPolicy, ServiceSettings},
    signer::Signer,
};
use alloy::primitives::{Address, B256, U256};
use anyhow::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Source of configuration values, the process environment in production.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub fn config_error(message: impl Into<String>) -> Error {
    ServiceError::Config(message.into()).into()
}

/// Creates a formatted error message for address parsing failures.
pub fn address_parse_error(env_var: &str, error: impl fmt::Display, value: &str) -> Error {
    config_error(format!(
        "Failed to parse {}: {}. Address must be exactly 42 characters (0x followed by 40 hex characters). Got: '{}' (length: {})",
        env_var,
        error,
        value,
        value.len()
    ))
}

pub fn required(lookup: Lookup, key: &str) -> Result<String, Error> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(config_error(format!("{key} must be set"))),
    }
}

pub fn parse_address(lookup: Lookup, key: &str) -> Result<Address, Error> {
    let value = required(lookup, key)?;
    Address::from_str(&value).map_err(|e| address_parse_error(key, e, &value))
}

pub fn parse_address_list(lookup: Lookup, key: &str) -> Result<Vec<Address>, Error> {
    let Some(raw) = lookup(key) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).map_err(|e| address_parse_error(key, e, s)))
        .collect()
}

/// 32-byte hex private key. The key is only checked for shape here.
pub fn parse_private_key(lookup: Lookup, key: &str) -> Result<String, Error> {
    let value = required(lookup, key)?;
    B256::from_str(&value)
        .map_err(|_| config_error(format!("{key} must be a 32-byte hex private key")))?;
    Ok(value)
}

pub fn parse_u64(lookup: Lookup, key: &str, default: u64) -> Result<u64, Error> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| config_error(format!("{key} must be a number: {e}"))),
    }
}

pub fn parse_positive_u64(lookup: Lookup, key: &str, default: u64) -> Result<u64, Error> {
    let value = parse_u64(lookup, key, default)?;
    if value == 0 {
        return Err(config_error(format!("{key} must be a positive number")));
    }
    Ok(value)
}

/// Decimal wei amount.
pub fn parse_u256(lookup: Lookup, key: &str, default: U256) -> Result<U256, Error> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => U256::from_str_radix(value.trim(), 10)
            .map_err(|e| config_error(format!("{key} must be a decimal wei amount: {e}"))),
    }
}

/// Masks all but the first characters of a secret for display.
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{visible}…")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoints {
    pub l1_rpc_url: String,
    pub l2_rpc_url: String,
}

impl ChainEndpoints {
    pub fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        Ok(Self {
            l1_rpc_url: required(lookup, "L1_RPC_URL")?,
            l2_rpc_url: required(lookup, "L2_RPC_URL")?,
        })
    }
}

/// How the funder sizes a deposit once a balance is below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopUpPolicy {
    /// Bring the balance back to the threshold plus `margin`.
    Deficit { margin: U256 },
    /// Always deposit the same amount.
    Fixed(U256),
}

impl Default for TopUpPolicy {
    fn default() -> Self {
        TopUpPolicy::Deficit { margin: U256::ZERO }
    }
}

impl fmt::Display for TopUpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopUpPolicy::Deficit { margin } => write!(f, "deficit (+{margin} wei)"),
            TopUpPolicy::Fixed(amount) => write!(f, "fixed {amount} wei"),
        }
    }
}

impl TopUpPolicy {
    pub fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        let mode = lookup("DEPOSIT_TOP_UP_MODE").unwrap_or_else(|| "deficit".to_string());
        match mode.trim().to_ascii_lowercase().as_str() {
            "deficit" => Ok(TopUpPolicy::Deficit {
                margin: parse_u256(lookup, "DEPOSIT_TOP_UP_MARGIN_WEI", U256::ZERO)?,
            }),
            "fixed" => {
                let amount = parse_u256(lookup, "DEPOSIT_FIXED_AMOUNT", U256::ZERO)?;
                if amount.is_zero() {
                    return Err(config_error(
                        "DEPOSIT_FIXED_AMOUNT must be set to a non-zero amount when DEPOSIT_TOP_UP_MODE=fixed",
                    ));
                }
                Ok(TopUpPolicy::Fixed(amount))
            }
            other => Err(config_error(format!(
                "DEPOSIT_TOP_UP_MODE must be 'deficit' or 'fixed', got '{other}'"
            ))),
        }
    }
}

/// Timeouts, retry discipline and process settings shared by every service.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub rpc_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
    pub confirmations: u64,
    pub retry: RetryPolicy,
    pub metrics_port: u16,
    pub shutdown_grace: Duration,
}

impl RuntimeConfig {
    pub fn from_lookup(lookup: Lookup) -> Result<Self, Error> {
        let rpc_timeout = Duration::from_millis(parse_positive_u64(lookup, "RPC_TIMEOUT_MS", 10_000)?);
        let confirmation_timeout =
            Duration::from_secs(parse_positive_u64(lookup, "CONFIRMATION_TIMEOUT_SEC", 120)?);
        let confirmation_poll_interval = Duration::from_millis(parse_positive_u64(
            lookup,
            "CONFIRMATION_POLL_INTERVAL_MS",
            2_000,
        )?);
        let confirmations = parse_positive_u64(lookup, "CONFIRMATIONS", 1)?;

        let max_attempts = u32::try_from(parse_positive_u64(lookup, "MAX_ATTEMPTS", 5)?)
            .map_err(|e| config_error(format!("MAX_ATTEMPTS is too large: {e}")))?;
        let base_delay = Duration::from_millis(parse_positive_u64(lookup, "BACKOFF_BASE_MS", 1_000)?);
        let max_delay = Duration::from_millis(parse_positive_u64(lookup, "BACKOFF_CAP_MS", 60_000)?);
        if max_delay < base_delay {
            return Err(config_error(
                "BACKOFF_CAP_MS must not be lower than BACKOFF_BASE_MS",
            ));
        }

        let metrics_port = u16::try_from(parse_u64(lookup, "METRICS_PORT", 9898)?)
            .map_err(|e| config_error(format!("METRICS_PORT must be a valid port: {e}")))?;
        let shutdown_grace = Duration::from_secs(parse_u64(lookup, "SHUTDOWN_GRACE_SEC", 10)?);

        if confirmation_poll_interval >= confirmation_timeout {
            warn!(
                "CONFIRMATION_POLL_INTERVAL_MS is not shorter than CONFIRMATION_TIMEOUT_SEC: receipts are polled at most once"
            );
        }

        Ok(Self {
            rpc_timeout,
            confirmation_timeout,
            confirmation_poll_interval,
            confirmations,
            retry: RetryPolicy {
                max_attempts,
                base_delay,
                max_delay,
            },
            metrics_port,
            shutdown_grace,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            retry: self.retry,
            confirmations: self.confirmations,
        }
    }

    pub fn chain_client_config(
        &self,
        endpoints: &ChainEndpoints,
        signer: Arc<Signer>,
    ) -> ChainClientConfig {
        ChainClientConfig {
            l1_rpc_url: endpoints.l1_rpc_url.clone(),
            l2_rpc_url: endpoints.l2_rpc_url.clone(),
            signer,
            rpc_timeout: self.rpc_timeout,
            confirmation_timeout: self.confirmation_timeout,
            confirmation_poll_interval: self.confirmation_poll_interval,
        }
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RPC timeout: {}ms", self.rpc_timeout.as_millis())?;
        writeln!(
            f,
            "Confirmation timeout: {}s, poll every {}ms, {} confirmation(s)",
            self.confirmation_timeout.as_secs(),
            self.confirmation_poll_interval.as_millis(),
            self.confirmations
        )?;
        writeln!(
            f,
            "Retry: {} attempts, backoff {}ms..{}ms",
            self.retry.max_attempts,
            self.retry.base_delay.as_millis(),
            self.retry.max_delay.as_millis()
        )?;
        writeln!(f, "Metrics port: {}", self.metrics_port)?;
        write!(f, "Shutdown grace: {}s", self.shutdown_grace.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn is_config_error(err: &Error) -> bool {
        matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::Config(_)))
    }

    #[test]
    fn test_runtime_defaults() {
        let lookup = lookup_from(&[]);
        let config = RuntimeConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.metrics_port, 9898);
        assert_eq!(config.confirmations, 1);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let lookup = lookup_from(&[("CONFIRMATION_TIMEOUT_SEC", "0")]);
        let err = RuntimeConfig::from_lookup(&lookup).unwrap_err();
        assert!(is_config_error(&err));
        assert!(err.to_string().contains("CONFIRMATION_TIMEOUT_SEC"));
    }

    #[test]
    fn test_address_errors_name_the_variable() {
        let lookup = lookup_from(&[("L1_PORTAL_ADDRESS", "0x1234")]);
        let err = parse_address(&lookup, "L1_PORTAL_ADDRESS").unwrap_err();
        assert!(is_config_error(&err));
        assert!(err.to_string().contains("L1_PORTAL_ADDRESS"));
    }

    #[test]
    fn test_address_list_skips_blanks() {
        let lookup = lookup_from(&[(
            "WATCHED",
            "0x1234567890123456789012345678901234567890, ,0x1234567890123456789012345678901234567891",
        )]);
        let list = parse_address_list(&lookup, "WATCHED").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_private_key_shape() {
        let good = lookup_from(&[(
            "KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )]);
        assert!(parse_private_key(&good, "KEY").is_ok());
        let bad = lookup_from(&[("KEY", "not-a-key")]);
        assert!(is_config_error(&parse_private_key(&bad, "KEY").unwrap_err()));
    }

    #[test]
    fn test_top_up_policy_modes() {
        let lookup = lookup_from(&[]);
        assert_eq!(
            TopUpPolicy::from_lookup(&lookup).unwrap(),
            TopUpPolicy::default()
        );

        let lookup = lookup_from(&[
            ("DEPOSIT_TOP_UP_MODE", "fixed"),
            ("DEPOSIT_FIXED_AMOUNT", "1000000000000000000"),
        ]);
        assert_eq!(
            TopUpPolicy::from_lookup(&lookup).unwrap(),
            TopUpPolicy::Fixed(U256::from(1_000_000_000_000_000_000u128))
        );

        let lookup = lookup_from(&[("DEPOSIT_TOP_UP_MODE", "fixed")]);
        assert!(TopUpPolicy::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_u256_parses_large_thresholds() {
        let lookup = lookup_from(&[("DEPOSIT_FUNDING_THRESHOLD", "340282366920938463463374607431768211456")]);
        let value = parse_u256(&lookup, "DEPOSIT_FUNDING_THRESHOLD", U256::ZERO).unwrap();
        assert_eq!(value, U256::from(u128::MAX) + U256::from(1));
    }
}
