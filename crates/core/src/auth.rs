// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Authentication configuration.
//!
//! Loaded from the `--auth-config` JSON file. Two mutually exclusive
//! modes: a local user table with HS256-signed tokens, or verification
//! against an external OIDC identity provider.

use serde::{Deserialize, Serialize};

/// The secret key shipped in the example config. Startup refuses to run
/// with it outside debug mode.
pub const BUNDLED_DEFAULT_SECRET: &str = "sapporo-wes-secret-key-please-change-me";

/// Which identity provider backs authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdpProvider {
    /// Local user table, tokens issued by this service.
    Sapporo,
    /// External OIDC IdP, verification only.
    External,
}

/// OAuth2 client mode of the external IdP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    Public,
    Confidential,
}

/// One local user entry. `password_hash` is an Argon2id PHC string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    pub password_hash: String,
}

/// Local-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAuthConfig {
    pub secret_key: String,
    /// Token lifetime in hours. `None` means non-expiring, which is
    /// only honored in debug builds.
    #[serde(default)]
    pub expires_delta_hours: Option<i64>,
    #[serde(default)]
    pub users: Vec<AuthUser>,
}

impl Default for LocalAuthConfig {
    fn default() -> Self {
        Self {
            secret_key: BUNDLED_DEFAULT_SECRET.to_string(),
            expires_delta_hours: Some(24),
            users: Vec::new(),
        }
    }
}

/// External-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAuthConfig {
    pub idp_url: String,
    pub jwt_audience: String,
    pub client_mode: ClientMode,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Top-level auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub auth_enabled: bool,
    #[serde(default = "default_idp_provider")]
    pub idp_provider: IdpProvider,
    #[serde(default)]
    pub sapporo_auth_config: LocalAuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_config: Option<ExternalAuthConfig>,
}

fn default_idp_provider() -> IdpProvider {
    IdpProvider::Sapporo
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            idp_provider: IdpProvider::Sapporo,
            sapporo_auth_config: LocalAuthConfig::default(),
            external_config: None,
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
