use alloy::primitives::{Address, B256, Bytes, U256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    L1,
    L2,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::L1 => write!(f, "L1"),
            Layer::L2 => write!(f, "L2"),
        }
    }
}

/// What to read when asking a chain for a numeric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKey {
    /// The node's current gas price.
    GasPrice,
    /// A view call whose return data is a single 32-byte word.
    Call { to: Address, calldata: Bytes },
}

impl ValueKey {
    pub fn call(to: Address, calldata: impl Into<Bytes>) -> Self {
        ValueKey::Call {
            to,
            calldata: calldata.into(),
        }
    }
}

/// A value read from a chain together with the block it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleObservation {
    pub value: U256,
    pub block_number: u64,
    pub timestamp: u64,
}

/// Handle to a submitted transaction.
///
/// A replacement is sent with the same `nonce`, so at most one of the two can land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub layer: Layer,
    pub hash: B256,
    pub nonce: u64,
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tx {} (nonce {})", self.layer, self.hash, self.nonce)
    }
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed { block_number: u64 },
    Reverted { block_number: u64, reason: String },
    /// Known to the node but not mined yet, or mined under fewer blocks than required.
    /// Only reported by one-shot lookups; a confirmation wait keeps polling instead.
    Pending,
    TimedOut,
}
