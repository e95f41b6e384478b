use super::TxHandle;
use alloy::primitives::B256;

/// Failure taxonomy shared by the chain clients and the services built on top of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Invalid or missing configuration value. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),
    /// Network failure or timeout talking to a node.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The node answered, but the payload could not be interpreted.
    #[error("decode error: {0}")]
    Decode(String),
    #[error("submission error (retryable: {retryable}): {message}")]
    Submission { message: String, retryable: bool },
    /// The transaction was mined and reverted.
    #[error("transaction {hash} reverted: {reason}")]
    Reverted { hash: B256, reason: String },
    /// The transaction was not confirmed in time, even after rechecking chain state.
    #[error("transaction {0} not confirmed in time")]
    ConfirmationTimeout(B256),
    /// Cancellation was observed while waiting.
    #[error("shutdown requested")]
    Shutdown,
}

impl ServiceError {
    /// Whether the owning service may retry the failed step after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Rpc(_) | ServiceError::Decode(_) => true,
            ServiceError::Submission { retryable, .. } => *retryable,
            ServiceError::Config(_)
            | ServiceError::Reverted { .. }
            | ServiceError::ConfirmationTimeout(_)
            | ServiceError::Shutdown => false,
        }
    }

    pub fn submission(message: impl Into<String>, retryable: bool) -> Self {
        ServiceError::Submission {
            message: message.into(),
            retryable,
        }
    }

    pub fn reverted(handle: &TxHandle, block_number: u64, reason: &str) -> Self {
        ServiceError::Reverted {
            hash: handle.hash,
            reason: format!("{} tx in block {block_number}: {reason}", handle.layer),
        }
    }

    /// Classifies a node's rejection of a transaction.
    ///
    /// Nonce races and fee problems clear up on a later attempt, reverts do not.
    pub fn from_submission_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let retryable = is_retryable_submission_message(&message);
        ServiceError::Submission { message, retryable }
    }
}

const NON_RETRYABLE_MARKERS: [&str; 4] = [
    "revert",
    "insufficient funds",
    "invalid opcode",
    "out of gas",
];

const RETRYABLE_MARKERS: [&str; 12] = [
    "nonce too low",
    "nonce too high",
    "replacement transaction underpriced",
    "transaction underpriced",
    "already known",
    "max fee per gas less than block base fee",
    "fee cap",
    "intrinsic gas too low",
    "timeout",
    "timed out",
    "connection",
    "error sending request",
];

fn is_retryable_submission_message(message: &str) -> bool {
    let message = message.to_lowercase();
    if NON_RETRYABLE_MARKERS.iter().any(|m| message.contains(m)) {
        return false;
    }
    RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
}
