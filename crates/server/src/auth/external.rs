// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! External auth mode: verification-only against an OIDC IdP.
//!
//! Discovery metadata is cached for an hour, the JWKS for five
//! minutes. A token whose `kid` is not cached triggers exactly one
//! eager JWKS refetch before rejection. Only the RS* family is
//! accepted; HS* is rejected outright to rule out key-confusion with
//! the local mode.

use crate::auth::AuthSetupError;
use crate::error::ApiError;
use crate::service::get_with_retry;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use sapporo_core::ExternalAuthConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const DISCOVERY_TTL: Duration = Duration::from_secs(3600);
const JWKS_TTL: Duration = Duration::from_secs(300);

/// Environment override allowing a plain-http IdP (debug mode only).
pub const ALLOW_INSECURE_IDP_ENV: &str = "SAPPORO_ALLOW_INSECURE_IDP";

const ALLOWED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Raw RSA components are cached (not `DecodingKey`, which is not
/// `Clone`); the key is reconstructed on demand.
#[derive(Debug, Clone)]
struct CachedJwk {
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

impl CachedJwk {
    fn to_decoding_key(&self) -> Result<DecodingKey, ApiError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_deref()
                    .ok_or_else(|| ApiError::unauthenticated("RSA key missing 'n' component"))?;
                let e = self
                    .e
                    .as_deref()
                    .ok_or_else(|| ApiError::unauthenticated("RSA key missing 'e' component"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| ApiError::unauthenticated(format!("bad RSA key: {e}")))
            }
            other => Err(ApiError::unauthenticated(format!(
                "unsupported key type: {other}"
            ))),
        }
    }
}

struct CachedDiscovery {
    document: DiscoveryDocument,
    fetched_at: Instant,
}

struct CachedJwks {
    keys: HashMap<String, CachedJwk>,
    fetched_at: Instant,
}

pub struct ExternalAuth {
    config: ExternalAuthConfig,
    client: reqwest::Client,
    discovery: RwLock<Option<CachedDiscovery>>,
    jwks: RwLock<Option<CachedJwks>>,
    refresh_lock: Mutex<()>,
}

impl ExternalAuth {
    pub fn new(config: ExternalAuthConfig, debug: bool) -> Result<Self, AuthSetupError> {
        if !config.idp_url.starts_with("https://") {
            let override_set = std::env::var(ALLOW_INSECURE_IDP_ENV)
                .map(|v| v == "true")
                .unwrap_or(false);
            if !(debug && override_set) {
                return Err(AuthSetupError::InsecureIdp(config.idp_url.clone()));
            }
            warn!(idp_url = %config.idp_url, "allowing non-HTTPS IdP (debug override)");
        }
        Ok(Self {
            config,
            client: crate::service::Service::build_http_client(),
            discovery: RwLock::new(None),
            jwks: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a token and return the bound username.
    pub async fn verify(&self, token: &str) -> Result<String, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthenticated(format!("malformed token header: {e}")))?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            // HS* in particular: a symmetric token must never validate
            // against a public key.
            return Err(ApiError::unauthenticated(format!(
                "disallowed JWT algorithm: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthenticated("token header missing kid"))?;

        let document = self.discovery().await?;
        let key = self.key_for(&document, &kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.algorithms = ALLOWED_ALGORITHMS.to_vec();
        validation.set_issuer(&[&document.issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        let data = decode::<serde_json::Value>(token, &key, &validation)
            .map_err(|e| ApiError::unauthenticated(format!("token validation failed: {e}")))?;
        username_from_claims(&data.claims)
    }

    /// Discovery metadata, cached for [`DISCOVERY_TTL`].
    async fn discovery(&self) -> Result<DiscoveryDocument, ApiError> {
        if let Some(cached) = self.discovery.read().await.as_ref() {
            if cached.fetched_at.elapsed() < DISCOVERY_TTL {
                return Ok(cached.document.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(cached) = self.discovery.read().await.as_ref() {
            if cached.fetched_at.elapsed() < DISCOVERY_TTL {
                return Ok(cached.document.clone());
            }
        }

        let url = format!(
            "{}/.well-known/openid-configuration",
            self.config.idp_url.trim_end_matches('/')
        );
        let document: DiscoveryDocument = get_with_retry(&self.client, &url)
            .await
            .map_err(|e| ApiError::upstream(format!("IdP discovery fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("malformed IdP discovery document: {e}")))?;
        debug!(issuer = %document.issuer, "fetched IdP discovery document");

        *self.discovery.write().await = Some(CachedDiscovery {
            document: document.clone(),
            fetched_at: Instant::now(),
        });
        Ok(document)
    }

    /// Decoding key for `kid`, with exactly one eager refetch on miss.
    async fn key_for(
        &self,
        document: &DiscoveryDocument,
        kid: &str,
    ) -> Result<DecodingKey, ApiError> {
        {
            let cache = self.jwks.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    if let Some(jwk) = cached.keys.get(kid) {
                        return jwk.to_decoding_key();
                    }
                }
            }
        }

        self.refresh_jwks(document).await?;

        let cache = self.jwks.read().await;
        cache
            .as_ref()
            .and_then(|c| c.keys.get(kid))
            .ok_or_else(|| ApiError::unauthenticated(format!("unknown signing key: {kid}")))?
            .to_decoding_key()
    }

    async fn refresh_jwks(&self, document: &DiscoveryDocument) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;
        let jwks: JwksResponse = get_with_retry(&self.client, &document.jwks_uri)
            .await
            .map_err(|e| ApiError::upstream(format!("JWKS fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("malformed JWKS: {e}")))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if let Some(kid) = jwk.kid {
                keys.insert(
                    kid,
                    CachedJwk {
                        kty: jwk.kty,
                        n: jwk.n,
                        e: jwk.e,
                    },
                );
            }
        }
        debug!(keys = keys.len(), "refreshed JWKS cache");
        *self.jwks.write().await = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

fn username_from_claims(claims: &serde_json::Value) -> Result<String, ApiError> {
    claims
        .get("preferred_username")
        .or_else(|| claims.get("sub"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthenticated("token carries no username claim"))
}

#[cfg(test)]
#[path = "external_tests.rs"]
mod tests;
