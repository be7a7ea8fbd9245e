//! REST handshake: register, challenge, token.
//!
//! Registration happens once per identity; challenge and token are
//! repeated on every (re)connect because tokens are single-use.

use crate::identity::CryptoIdentity;
use crate::store::{IdentityStore, StoredCredentials};
use async_trait::async_trait;
use escrow_wire::{
    ChallengeRequest, ChallengeResponse, RegisterRequest, RegisterResponse, TokenRequest,
    TokenResponse,
};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("{stage} rejected by server: {status}")]
    Rejected { stage: &'static str, status: StatusCode },

    #[error("failed to persist credentials: {0}")]
    StoreFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// The three REST calls of the handshake, as a seam so the flow can be
/// tested without a server.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Register a public key; returns the server-assigned username.
    async fn register(&self, public_key: &str) -> Result<String>;

    /// Request a fresh challenge nonce for the username.
    async fn challenge(&self, generated_username: &str) -> Result<String>;

    /// Exchange a signed challenge for a single-use access token.
    async fn token(
        &self,
        generated_username: &str,
        challenge: &str,
        signature: &str,
    ) -> Result<String>;
}

/// REST implementation against the escrow server.
pub struct AuthClient {
    base_url: String,
    client: Client,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn register(&self, public_key: &str) -> Result<String> {
        let url = format!("{}/v1/auth/register", self.base_url);
        debug!("Registering public key at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&RegisterRequest {
                public_key: public_key.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected {
                stage: "registration",
                status: response.status(),
            });
        }
        let body: RegisterResponse = response.json().await?;
        Ok(body.generated_username)
    }

    async fn challenge(&self, generated_username: &str) -> Result<String> {
        let url = format!("{}/v1/auth/challenge", self.base_url);
        debug!("Requesting challenge for {}", generated_username);

        let response = self
            .client
            .post(&url)
            .json(&ChallengeRequest {
                generated_username: generated_username.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected {
                stage: "challenge",
                status: response.status(),
            });
        }
        let body: ChallengeResponse = response.json().await?;
        Ok(body.challenge)
    }

    async fn token(
        &self,
        generated_username: &str,
        challenge: &str,
        signature: &str,
    ) -> Result<String> {
        let url = format!("{}/v1/auth/token", self.base_url);
        debug!("Exchanging signed challenge for token");

        let response = self
            .client
            .post(&url)
            .json(&TokenRequest {
                generated_username: generated_username.to_string(),
                challenge: challenge.to_string(),
                signature: signature.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected {
                stage: "token exchange",
                status: response.status(),
            });
        }
        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }
}

/// A ready-to-connect identity: the keypair, its server-side username,
/// and a fresh single-use token.
pub struct Credentials {
    pub identity: CryptoIdentity,
    pub generated_username: String,
    pub access_token: String,
}

/// Runs the handshake end to end against an [`AuthApi`].
pub struct Authenticator {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn IdentityStore>,
}

impl Authenticator {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn IdentityStore>) -> Self {
        Self { api, store }
    }

    /// Load the stored identity, or register a new one. Credentials hit
    /// the store only after the server has accepted the key, never
    /// before.
    async fn ensure_identity(&self) -> Result<(CryptoIdentity, String)> {
        if let Some(stored) = self.store.load() {
            match CryptoIdentity::decode_private_key(&stored.private_key) {
                Some(identity) => {
                    debug!("Reusing stored identity {}", stored.generated_username);
                    return Ok((identity, stored.generated_username));
                }
                None => {
                    warn!("Stored private key is unreadable, registering a new identity");
                    self.store.clear()?;
                }
            }
        }

        let identity = CryptoIdentity::generate();
        let generated_username = self.api.register(&identity.public_key_pem()).await?;
        self.store.save(&StoredCredentials {
            private_key: identity.encode_private_key(),
            generated_username: generated_username.clone(),
        })?;
        info!("Registered new identity {}", generated_username);
        Ok((identity, generated_username))
    }

    /// Full register-challenge-token sequence, in that order.
    pub async fn authenticate(&self) -> Result<Credentials> {
        let (identity, generated_username) = self.ensure_identity().await?;
        let challenge = self.api.challenge(&generated_username).await?;
        let signature = identity.sign_challenge(&challenge);
        let access_token = self
            .api
            .token(&generated_username, &challenge, &signature)
            .await?;
        Ok(Credentials {
            identity,
            generated_username,
            access_token,
        })
    }
}
