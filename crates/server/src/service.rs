// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Top-level service state shared across handlers and background tasks.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use sapporo_core::SystemClock;
use sapporo_storage::{Index, RunStore};
use std::sync::Arc;
use std::time::Duration;

/// Outbound HTTP timeout (IdP discovery, JWKS, attachment fetches).
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry backoff schedule for outbound HTTP.
pub const OUTBOUND_BACKOFF: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(2000),
];

/// Everything a request handler needs, owned in one place with explicit
/// lifecycle (no ambient singletons).
pub struct Service {
    pub config: ServerConfig,
    pub store: RunStore,
    pub index: Index,
    pub auth: Authenticator,
    pub service_info: serde_json::Value,
    /// Executable-workflow whitelist; empty means unrestricted.
    pub executable_workflows: Vec<String>,
    pub http: reqwest::Client,
    pub clock: SystemClock,
}

pub type AppState = Arc<Service>;

impl Service {
    /// Shared outbound HTTP client with the service-wide timeout.
    pub fn build_http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()
            .unwrap_or_default()
    }
}

/// GET with up to three retries and exponential backoff.
///
/// Every outbound fetch in the service (JWKS, discovery, attachment
/// bodies) goes through this so transient IdP or object-store hiccups
/// do not fail requests.
pub async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    for backoff in OUTBOUND_BACKOFF {
        match client.get(url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => return Ok(response),
            Err(e) => {
                tracing::debug!(url, error = %e, "outbound fetch failed, backing off");
                tokio::time::sleep(backoff).await;
            }
        }
    }
    client.get(url).send().await.and_then(|r| r.error_for_status())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::Authenticator;
    use sapporo_core::{RunId, RunRequest, WorkflowEngine, WorkflowType};
    use sapporo_storage::NewRun;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Service state rooted in a temp directory, auth disabled.
    pub(crate) fn state_in(dir: &Path) -> AppState {
        state_with(dir, Authenticator::Disabled)
    }

    pub(crate) fn state_with(dir: &Path, auth: Authenticator) -> AppState {
        let run_dir = dir.join("runs");
        let store = RunStore::open(&run_dir).unwrap();
        let index = Index::new(store.index_db_path());
        let config = ServerConfig {
            run_dir,
            run_sh: dir.join("run.sh"),
            ..Default::default()
        };
        Arc::new(Service {
            config,
            store,
            index,
            auth,
            service_info: crate::config::default_service_info(),
            executable_workflows: Vec::new(),
            http: Service::build_http_client(),
            clock: SystemClock,
        })
    }

    /// Install a dispatcher stand-in script at the configured run_sh path.
    pub(crate) fn install_run_sh(state: &AppState, script: &str) {
        let path = &state.config.run_sh;
        std::fs::write(path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub(crate) fn sample_request() -> RunRequest {
        RunRequest {
            workflow_type: WorkflowType::Cwl,
            workflow_type_version: "v1.2".to_string(),
            workflow_url: "https://example.com/wf.cwl".to_string(),
            workflow_engine: WorkflowEngine::Cwltool,
            workflow_engine_version: None,
            workflow_params: Some(serde_json::json!({"threads": 2})),
            workflow_engine_parameters: Default::default(),
            workflow_attachment_obj: Vec::new(),
            tags: Default::default(),
        }
    }

    pub(crate) fn create_run(state: &AppState, username: Option<&str>) -> RunId {
        let request = sample_request();
        let snapshot = serde_json::json!({"debug": false});
        state
            .store
            .create(NewRun {
                request: &request,
                config_snapshot: &snapshot,
                username,
                attachments: &[],
            })
            .unwrap()
    }
}
