//! Distributor signing key, loaded from the standard Solana keypair file
//! (JSON array of 64 bytes: secret followed by public key).

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use std::fs;
use std::path::Path;

use crate::types::Address;

pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    /// Accepts a 64-byte keypair or a bare 32-byte secret.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            64 => {
                let secret: [u8; 32] = bytes[..32].try_into()?;
                let kp = Self::from_secret_bytes(&secret);
                if kp.address().as_bytes()[..] != bytes[32..] {
                    return Err(anyhow!(
                        "keypair public half does not match its secret key"
                    ));
                }
                Ok(kp)
            }
            32 => {
                let secret: [u8; 32] = bytes.try_into()?;
                Ok(Self::from_secret_bytes(&secret))
            }
            n => Err(anyhow!("keypair must be 32 or 64 bytes, got {n}")),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading keypair {}", path.display()))?;
        let bytes: Vec<u8> = serde_json::from_str(&raw)
            .with_context(|| format!("keypair {} is not a JSON byte array", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("loading keypair {}", path.display()))
    }

    pub fn address(&self) -> Address {
        Address::new(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.signing.verifying_key().verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
