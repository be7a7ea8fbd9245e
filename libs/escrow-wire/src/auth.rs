//! REST handshake request/response bodies.
//!
//! Three-step challenge-response flow:
//! `POST /v1/auth/register` -> `POST /v1/auth/challenge` ->
//! `POST /v1/auth/token`. Field names are fixed by the server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub generated_username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeRequest {
    pub generated_username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub generated_username: String,
    pub challenge: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}
