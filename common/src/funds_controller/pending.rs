use crate::chain_client::ServiceError;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// A confirmed deposit not yet visible in the recipient's L2 balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub l1_tx_hash: B256,
    pub amount: U256,
    pub balance_before: U256,
    /// Unix seconds.
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Credited,
    Expired,
    Waiting,
}

impl PendingDeposit {
    pub fn status(&self, balance: U256, threshold: U256, now: u64, timeout: Duration) -> PendingStatus {
        if balance >= self.balance_before.saturating_add(self.amount) || balance >= threshold {
            return PendingStatus::Credited;
        }
        if now.saturating_sub(self.submitted_at) >= timeout.as_secs() {
            return PendingStatus::Expired;
        }
        PendingStatus::Waiting
    }
}

/// Pending deposits keyed by `chain_id:address`, optionally mirrored to a JSON file so a
/// restart does not fund the same account twice.
#[derive(Debug, Default)]
pub struct PendingDeposits {
    entries: HashMap<String, PendingDeposit>,
    file: Option<PathBuf>,
}

impl PendingDeposits {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the markers stored in `file`. A missing file starts empty.
    pub fn load(file: Option<PathBuf>) -> Result<Self, ServiceError> {
        let Some(path) = file else {
            return Ok(Self::in_memory());
        };
        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                ServiceError::Config(format!(
                    "pending deposits file {} is not valid JSON: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(ServiceError::Config(format!(
                    "failed to read pending deposits file {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            entries,
            file: Some(path),
        })
    }

    pub fn key(chain_id: u64, address: Address) -> String {
        format!("{chain_id}:{address}")
    }

    pub fn get(&self, chain_id: u64, address: Address) -> Option<&PendingDeposit> {
        self.entries.get(&Self::key(chain_id, address))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, chain_id: u64, address: Address, deposit: PendingDeposit) {
        self.entries.insert(Self::key(chain_id, address), deposit);
        self.persist();
    }

    pub fn remove(&mut self, chain_id: u64, address: Address) -> Option<PendingDeposit> {
        let removed = self.entries.remove(&Self::key(chain_id, address));
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    fn persist(&self) {
        let Some(path) = &self.file else {
            return;
        };
        if let Err(e) = write_atomically(path, &self.entries) {
            warn!(
                "Failed to persist pending deposits to {}: {}",
                path.display(),
                e
            );
        } else {
            debug!("Persisted {} pending deposit(s)", self.entries.len());
        }
    }
}

fn write_atomically(path: &Path, entries: &HashMap<String, PendingDeposit>) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(entries).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const ACCOUNT: Address = address!("0x1234567890123456789012345678901234567890");

    fn deposit() -> PendingDeposit {
        PendingDeposit {
            l1_tx_hash: B256::repeat_byte(0xab),
            amount: U256::from(500),
            balance_before: U256::from(500),
            submitted_at: 1_000,
        }
    }

    #[test]
    fn test_status_transitions() {
        let timeout = Duration::from_secs(600);
        let threshold = U256::from(1_000);
        let pending = deposit();

        assert_eq!(
            pending.status(U256::from(500), threshold, 1_100, timeout),
            PendingStatus::Waiting
        );
        assert_eq!(
            pending.status(U256::from(1_000), threshold, 1_100, timeout),
            PendingStatus::Credited
        );
        assert_eq!(
            pending.status(U256::from(500), threshold, 1_600, timeout),
            PendingStatus::Expired
        );
    }

    #[test]
    fn test_credit_is_recognised_after_spending() {
        // The account spent some funds meanwhile, but the deposit pushed it over threshold.
        let pending = deposit();
        assert_eq!(
            pending.status(U256::from(1_200), U256::from(1_100), 1_001, Duration::from_secs(60)),
            PendingStatus::Credited
        );
    }

    #[test]
    fn test_markers_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");

        let mut pending = PendingDeposits::load(Some(path.clone())).unwrap();
        assert!(pending.is_empty());
        pending.insert(167, ACCOUNT, deposit());

        let reloaded = PendingDeposits::load(Some(path.clone())).unwrap();
        assert_eq!(reloaded.get(167, ACCOUNT), Some(&deposit()));
        assert_eq!(reloaded.get(1, ACCOUNT), None);

        let mut reloaded = reloaded;
        reloaded.remove(167, ACCOUNT);
        assert!(PendingDeposits::load(Some(path)).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = PendingDeposits::load(Some(path)).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
