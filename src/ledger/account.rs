use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use sha3::{Digest, Sha3_256};

/// Single-signer scheme identifier used in the native address derivation.
const ED25519_SCHEME: u8 = 0x00;

/// A locally-held ed25519 identity on the underlying ledger (the relayer
/// or the faucet account).
#[derive(Clone)]
pub struct LocalAccount {
    signing_key: SigningKey,
    address: String,
}

impl LocalAccount {
    /// Build an account from a 32-byte hex private key. The native address
    /// is sha3-256(public_key || scheme).
    pub fn from_private_key_hex(private_key: &str) -> Result<Self> {
        let stripped = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes: [u8; 32] = hex::decode(stripped)
            .context("private key is not valid hex")?
            .try_into()
            .map_err(|_| anyhow!("ed25519 private key must be 32 bytes"))?;

        let signing_key = SigningKey::from_bytes(&bytes);
        let public_key = signing_key.verifying_key();

        let mut hasher = Sha3_256::new();
        hasher.update(public_key.as_bytes());
        hasher.update([ED25519_SCHEME]);
        let address = format!("0x{}", hex::encode(hasher.finalize()));

        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_hex(&self) -> String {
        format!(
            "0x{}",
            hex::encode(self.signing_key.verifying_key().as_bytes())
        )
    }

    /// Sign a raw signing message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_a_stable_address() {
        let key = "0x1111111111111111111111111111111111111111111111111111111111111111";
        let a = LocalAccount::from_private_key_hex(key).unwrap();
        let b = LocalAccount::from_private_key_hex(key).unwrap();

        assert_eq!(a.address(), b.address());
        assert_eq!(a.address().len(), 66);
        assert!(a.address().starts_with("0x"));
    }

    #[test]
    fn rejects_short_keys() {
        assert!(LocalAccount::from_private_key_hex("0xdead").is_err());
    }

    #[test]
    fn signatures_are_64_bytes() {
        let key = "0x2222222222222222222222222222222222222222222222222222222222222222";
        let account = LocalAccount::from_private_key_hex(key).unwrap();
        assert_eq!(account.sign(b"message").len(), 64);
    }
}
