//! Ed25519 client identity.
//!
//! The keypair is generated once on first run and re-used for every
//! later authentication; the server identifies the account by the
//! public key alone, so losing the private key means losing the
//! account.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

pub struct CryptoIdentity {
    signing_key: SigningKey,
}

impl CryptoIdentity {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public key in the PEM-style wrapper the registration endpoint
    /// expects.
    pub fn public_key_pem(&self) -> String {
        let encoded = STANDARD.encode(self.signing_key.verifying_key().as_bytes());
        format!("-----BEGIN PUBLIC KEY-----\n{encoded}\n-----END PUBLIC KEY-----")
    }

    /// Sign a server-issued challenge; the signature travels as base64.
    pub fn sign_challenge(&self, challenge: &str) -> String {
        let signature = self.signing_key.sign(challenge.as_bytes());
        STANDARD.encode(signature.to_bytes())
    }

    /// Base64 form of the private key for persistence.
    pub fn encode_private_key(&self) -> String {
        STANDARD.encode(self.signing_key.to_bytes())
    }

    /// Rebuild the identity from its persisted form. Returns `None`
    /// when the stored value is not a valid key, in which case the
    /// caller starts over with a fresh identity.
    pub fn decode_private_key(encoded: &str) -> Option<Self> {
        let bytes = STANDARD.decode(encoded).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }
}

impl std::fmt::Debug for CryptoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log private key material.
        f.debug_struct("CryptoIdentity").finish_non_exhaustive()
    }
}
