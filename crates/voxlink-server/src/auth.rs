//! Bearer-token identity verification.
//!
//! When the `auth` config section is present, every offer must carry a
//! bearer token that resolves to an identity on the configured auth
//! backend (a GoTrue-style `/auth/v1/user` endpoint). Without that
//! section the server is open — useful for local development.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::debug;

use voxlink_core::config::AuthConfig;
use voxlink_core::error::{Result, VoxlinkError};

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    /// Human-facing name, folded into the greeting when present.
    pub display_name: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve a bearer token to an identity, or fail with an auth error.
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Extract the token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verifies tokens against a GoTrue-compatible user endpoint.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl HttpIdentityVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.resolve_service_key(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let mut request = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token);
        if let Some(key) = &self.service_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoxlinkError::Auth(format!("auth backend unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(VoxlinkError::Auth(format!(
                "token rejected ({})",
                response.status()
            )));
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| VoxlinkError::Auth(format!("malformed auth response: {e}")))?;

        let display_name = user
            .user_metadata
            .get("full_name")
            .or_else(|| user.user_metadata.get("name"))
            .and_then(|v| v.as_str())
            .map(String::from);

        debug!(user_id = %user.id, "Token verified");
        Ok(Identity {
            id: user.id,
            email: user.email,
            display_name,
        })
    }
}
