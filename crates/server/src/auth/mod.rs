// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Authentication and per-request identity binding.
//!
//! Two mutually exclusive modes selected by the auth config: a local
//! user table with tokens issued by this service, or verification-only
//! against an external OIDC IdP. When auth is disabled every request is
//! anonymous and ownership checks are skipped.

mod external;
mod local;

pub use external::ExternalAuth;
pub use local::{hash_password, LocalAuth, TokenResponse};

use crate::error::ApiError;
use sapporo_core::{AuthConfig, IdpProvider};
use tracing::info;

/// The configured authentication backend.
pub enum Authenticator {
    Disabled,
    Local(LocalAuth),
    External(ExternalAuth),
}

impl Authenticator {
    /// Build the backend from config. Weak local secrets and non-HTTPS
    /// IdP URLs abort startup here.
    pub fn from_config(config: AuthConfig, debug: bool) -> Result<Self, AuthSetupError> {
        if !config.auth_enabled {
            return Ok(Self::Disabled);
        }
        match config.idp_provider {
            IdpProvider::Sapporo => {
                info!("auth enabled: local user table");
                Ok(Self::Local(LocalAuth::new(config.sapporo_auth_config, debug)?))
            }
            IdpProvider::External => {
                let external = config
                    .external_config
                    .ok_or(AuthSetupError::MissingExternalConfig)?;
                info!(idp_url = %external.idp_url, "auth enabled: external IdP");
                Ok(Self::External(ExternalAuth::new(external, debug)?))
            }
        }
    }

    pub fn enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Verify the bearer token and bind a username to the request.
    ///
    /// `Ok(None)` means auth is disabled; when enabled, a missing or
    /// invalid token is a 401.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Option<String>, ApiError> {
        match self {
            Self::Disabled => Ok(None),
            Self::Local(local) => {
                let token = bearer
                    .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;
                Ok(Some(local.verify(token)?))
            }
            Self::External(external) => {
                let token = bearer
                    .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;
                Ok(Some(external.verify(token).await?))
            }
        }
    }

    /// Issue a token for a username/password pair (local mode only).
    pub fn issue_token(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        match self {
            Self::Local(local) => local.issue(username, password),
            Self::Disabled => Err(ApiError::invalid_request("authentication is disabled")),
            Self::External(_) => Err(ApiError::invalid_request(
                "tokens are issued by the external identity provider",
            )),
        }
    }
}

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum AuthSetupError {
    #[error("secret_key is shorter than 32 bytes")]
    SecretTooShort,

    #[error("secret_key matches the bundled default; set a real secret")]
    SecretIsDefault,

    #[error("secret_key has too little entropy ({0:.2} bits/char)")]
    SecretLowEntropy(f64),

    #[error("non-expiring tokens (expires_delta_hours: null) are only allowed in debug mode")]
    NonExpiringTokens,

    #[error("idp_provider is external but external_config is missing")]
    MissingExternalConfig,

    #[error("idp_url must use https (set SAPPORO_ALLOW_INSECURE_IDP=true in debug to override): {0}")]
    InsecureIdp(String),
}
