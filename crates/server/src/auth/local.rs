// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Local (sapporo) auth mode: Argon2id password table + HS256 tokens.

use crate::auth::AuthSetupError;
use crate::error::ApiError;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sapporo_core::auth::{LocalAuthConfig, BUNDLED_DEFAULT_SECRET};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Response body of `POST /token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

pub struct LocalAuth {
    config: LocalAuthConfig,
    debug: bool,
}

impl LocalAuth {
    pub fn new(config: LocalAuthConfig, debug: bool) -> Result<Self, AuthSetupError> {
        if !debug {
            check_secret(&config.secret_key)?;
            if config.expires_delta_hours.is_none() {
                return Err(AuthSetupError::NonExpiringTokens);
            }
        }
        Ok(Self { config, debug })
    }

    /// Verify credentials and issue a compact HS256 token.
    ///
    /// Unknown user and wrong password produce the same message so the
    /// endpoint is not a username oracle.
    pub fn issue(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let user = self
            .config
            .users
            .iter()
            .find(|u| u.username == username)
            .ok_or_else(invalid_credentials)?;

        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|_| ApiError::internal("malformed password hash in auth config"))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| invalid_credentials())?;

        self.issue_for(username, Utc::now())
    }

    /// Issue a token with an explicit clock (split out for tests).
    pub fn issue_for(&self, username: &str, now: DateTime<Utc>) -> Result<TokenResponse, ApiError> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp: self.config.expires_delta_hours.map(|h| iat + h * 3600),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )
        .map_err(|e| ApiError::internal(format!("failed to sign token: {e}")))?;
        debug!(username, "issued token");
        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
        })
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, ApiError> {
        let key = DecodingKey::from_secret(self.config.secret_key.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e)
                if self.debug
                    && matches!(
                        e.kind(),
                        jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
                    ) =>
            {
                // Debug builds may run with non-expiring tokens.
                let mut lax = Validation::new(Algorithm::HS256);
                lax.set_required_spec_claims::<&str>(&[]);
                lax.validate_exp = false;
                let data = decode::<Claims>(token, &key, &lax)
                    .map_err(|e| ApiError::unauthenticated(format!("invalid token: {e}")))?;
                Ok(data.claims.sub)
            }
            Err(e) => Err(ApiError::unauthenticated(format!("invalid token: {e}"))),
        }
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthenticated("invalid username or password")
}

/// Hash a password into an Argon2id PHC string (used by operators to
/// populate the user table).
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::internal(format!("failed to hash password: {e}")))
}

/// Reject weak secrets at startup (skipped entirely in debug mode).
fn check_secret(secret: &str) -> Result<(), AuthSetupError> {
    if secret.len() < 32 {
        return Err(AuthSetupError::SecretTooShort);
    }
    if secret == BUNDLED_DEFAULT_SECRET {
        return Err(AuthSetupError::SecretIsDefault);
    }
    let entropy = shannon_entropy(secret.as_bytes());
    if entropy < 3.0 {
        return Err(AuthSetupError::SecretLowEntropy(entropy));
    }
    Ok(())
}

/// Shannon entropy in bits per byte.
fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for b in bytes {
        counts[*b as usize] += 1;
    }
    let len = bytes.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
