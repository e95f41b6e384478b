use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Local ECDSA key used to sign transactions for one service.
///
/// Each service gets its own signer so that nonces are never shared between write paths.
pub struct Signer {
    key: PrivateKeySigner,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.key.address())
            .finish_non_exhaustive()
    }
}

pub fn create_signer(private_key: &str) -> Result<Arc<Signer>, Error> {
    let key = PrivateKeySigner::from_str(private_key.trim())
        .map_err(|e| anyhow::anyhow!("Failed to parse ECDSA private key: {e}"))?;
    Ok(Arc::new(Signer { key }))
}

impl Signer {
    pub fn get_address(&self) -> Address {
        self.key.address()
    }

    pub fn local_signer(&self) -> &PrivateKeySigner {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    // anvil account #0
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_create_signer_derives_address() {
        let signer = create_signer(KEY).unwrap();
        assert_eq!(
            signer.get_address(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let signer = create_signer(KEY).unwrap();
        let printed = format!("{signer:?}");
        assert!(!printed.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478"));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(create_signer("0x1234").is_err());
    }
}
