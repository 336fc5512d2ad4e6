// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Service configuration.
//!
//! The CLI resolves flags, `SAPPORO_*` environment variables and
//! defaults (in that order) into a [`ServerConfig`]; this module owns
//! validation and the auxiliary config files (service-info, executable
//! workflows, auth config).

use sapporo_core::AuthConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1122;
pub const DEFAULT_RUN_DIR: &str = "./runs";
pub const DEFAULT_ALLOW_ORIGIN: &str = "*";
pub const DEFAULT_SNAPSHOT_INTERVAL_MIN: u64 = 30;

/// Resolved process configuration.
///
/// Serialized into each run's `sapporo_config.json` so the dispatcher
/// (and later readers) see the exact config the run was submitted
/// under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub run_dir: PathBuf,
    /// Dispatcher executable, invoked as `run.sh <run_dir>`.
    pub run_sh: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_info_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_workflows_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub allow_origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_remove_older_than_days: Option<u64>,
    pub snapshot_interval_min: u64,
}

impl ServerConfig {
    /// Check cross-field constraints. Called once at startup; a failure
    /// is a non-zero process exit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_interval_min < 1 {
            return Err(ConfigError::OutOfRange {
                field: "snapshot-interval",
                min: 1,
            });
        }
        if let Some(days) = self.run_remove_older_than_days {
            if days < 1 {
                return Err(ConfigError::OutOfRange {
                    field: "run-remove-older-than-days",
                    min: 1,
                });
            }
        }
        if let Some(prefix) = &self.url_prefix {
            if !prefix.starts_with('/') || prefix.ends_with('/') {
                return Err(ConfigError::BadUrlPrefix(prefix.clone()));
            }
        }
        Ok(())
    }

    /// Base URL for links in responses: explicit `--base-url`, or
    /// derived from the bind address and URL prefix.
    pub fn effective_base_url(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "http://{}:{}{}",
                self.host,
                self.port,
                self.url_prefix.as_deref().unwrap_or("")
            ),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: false,
            run_dir: PathBuf::from(DEFAULT_RUN_DIR),
            run_sh: PathBuf::from("./run.sh"),
            service_info_path: None,
            executable_workflows_path: None,
            auth_config_path: None,
            url_prefix: None,
            base_url: None,
            allow_origin: DEFAULT_ALLOW_ORIGIN.to_string(),
            run_remove_older_than_days: None,
            snapshot_interval_min: DEFAULT_SNAPSHOT_INTERVAL_MIN,
        }
    }
}

/// The executable-workflow whitelist: an ordered set of absolute
/// `http(s)` URLs. Empty means no restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutableWorkflows {
    #[serde(default)]
    pub workflows: Vec<String>,
}

impl ExecutableWorkflows {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?;
        let parsed: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Malformed(path.to_path_buf(), e.to_string()))?;
        for url in &parsed.workflows {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Malformed(
                    path.to_path_buf(),
                    format!("executable workflow is not an absolute http(s) URL: {url:?}"),
                ));
            }
        }
        Ok(parsed)
    }
}

/// Load the service-info document, falling back to the built-in one.
pub fn load_service_info(path: Option<&Path>) -> Result<serde_json::Value, ConfigError> {
    let Some(path) = path else {
        return Ok(default_service_info());
    };
    let raw =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(path.to_path_buf(), e.to_string()))
}

/// Load the auth configuration; absent path means auth disabled.
pub fn load_auth_config(path: Option<&Path>) -> Result<AuthConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(AuthConfig::default());
    };
    let raw =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(path.to_path_buf(), e.to_string()))
}

/// The built-in service-info document served when no file is given.
pub fn default_service_info() -> serde_json::Value {
    serde_json::json!({
        "id": "sapporo-service",
        "name": "sapporo-service",
        "type": {"group": "sapporo-wes", "artifact": "wes", "version": "sapporo-wes-2.0.0"},
        "description": "A GA4GH WES server for workflow execution",
        "organization": {"name": "sapporo-wes", "url": "https://github.com/sapporo-wes"},
        "environment": "production",
        "workflow_type_versions": {
            "CWL": {"workflow_type_version": ["v1.0", "v1.1", "v1.2"]},
            "WDL": {"workflow_type_version": ["1.0", "1.1"]},
            "NFL": {"workflow_type_version": ["1.0", "DSL2"]},
            "SMK": {"workflow_type_version": ["1.0"]}
        },
        "supported_wes_versions": ["1.0.0", "sapporo-wes-2.0.0"],
        "supported_filesystem_protocols": ["http", "https", "file"],
        "workflow_engine_versions": {
            "cwltool": "3.1",
            "nextflow": "24.04",
            "toil": "6.1",
            "cromwell": "87",
            "snakemake": "8.16",
            "ep3": "1.7",
            "streamflow": "0.2"
        },
        "default_workflow_engine_parameters": [],
        "auth_instructions_url": "",
        "tags": {}
    })
}

/// Configuration errors; each aborts startup with a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be >= {min}")]
    OutOfRange { field: &'static str, min: u64 },

    #[error("url-prefix must start with '/' and not end with '/': {0:?}")]
    BadUrlPrefix(String),

    #[error("cannot read {0}: {1}")]
    Unreadable(PathBuf, #[source] std::io::Error),

    #[error("malformed config file {0}: {1}")]
    Malformed(PathBuf, String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
