// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Service lifecycle: startup, serving, graceful shutdown.
//!
//! Startup fails fast (non-zero exit) on config errors, weak secrets,
//! a second service instance on the same run dir, or a bind failure.
//! Shutdown stops accepting connections, drains in-flight requests for
//! up to 30 seconds and cancels the indexer. In-flight workflow
//! engines are detached children and are deliberately NOT signaled.

use crate::auth::{AuthSetupError, Authenticator};
use crate::config::{
    load_auth_config, load_service_info, ConfigError, ExecutableWorkflows, ServerConfig,
};
use crate::service::{AppState, Service};
use crate::{indexer, routes};
use fs2::FileExt;
use sapporo_core::SystemClock;
use sapporo_storage::{layout, Index, RunStore, StoreError};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long in-flight HTTP requests may drain after a signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the service until a termination signal arrives.
pub async fn serve(config: ServerConfig) -> Result<(), LifecycleError> {
    // 1. Validate config before touching anything on disk.
    config.validate()?;

    // 2. Auth backend; weak local secrets and insecure IdP URLs abort here.
    let auth_config = load_auth_config(config.auth_config_path.as_deref())?;
    let auth = Authenticator::from_config(auth_config, config.debug)?;

    // 3. Run dir and the exclusive instance lock.
    let store = RunStore::open(&config.run_dir)?;
    let _lock_file = acquire_lock(&config.run_dir)?;

    // 4. Auxiliary config files.
    let service_info = load_service_info(config.service_info_path.as_deref())?;
    let executable_workflows =
        ExecutableWorkflows::load(config.executable_workflows_path.as_deref())?.workflows;

    let index = Index::new(store.index_db_path());
    let state: AppState = Arc::new(Service {
        config,
        store,
        index,
        auth,
        service_info,
        executable_workflows,
        http: Service::build_http_client(),
        clock: SystemClock,
    });

    // 5. Crash recovery: one synchronous pass reconciles runs whose
    // supervisor died with the previous process.
    match indexer::run_pass(&state) {
        Ok(stats) => info!(
            runs = stats.runs,
            reconciled = stats.reconciled,
            "startup snapshot pass complete"
        ),
        Err(e) => warn!(error = %e, "startup snapshot pass failed"),
    }

    // 6. Background indexer on its own clock.
    let indexer_cancel = CancellationToken::new();
    let indexer_task = tokio::spawn(indexer::run_periodic(
        state.clone(),
        indexer_cancel.clone(),
    ));

    // 7. Bind and serve.
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(addr.clone(), e))?;
    info!(%addr, "listening");

    let shutdown = CancellationToken::new();
    install_signal_handler(shutdown.clone());

    let app = routes::router(state.clone());
    let shutdown_for_serve = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_for_serve.cancelled_owned())
            .await
    });

    tokio::select! {
        result = &mut server => {
            indexer_cancel.cancel();
            result.map_err(|e| LifecycleError::Serve(e.to_string()))??;
        }
        _ = shutdown.cancelled() => {
            info!("shutdown signal received, draining connections");
            indexer_cancel.cancel();
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
                Ok(result) => {
                    result.map_err(|e| LifecycleError::Serve(e.to_string()))??;
                }
                Err(_) => {
                    warn!("drain timed out, aborting remaining connections");
                    server.abort();
                }
            }
        }
    }

    let _ = indexer_task.await;
    info!("shutdown complete");
    Ok(())
}

/// Take the exclusive per-run-dir lock so two service processes never
/// double-index the same tree. The file keeps the holder's PID for
/// operators.
pub fn acquire_lock(run_dir: &Path) -> Result<File, LifecycleError> {
    let lock_path = run_dir.join(layout::LOCK_FILE);
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(LifecycleError::Io)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0).map_err(LifecycleError::Io)?;
    writeln!(lock_file, "{}", std::process::id()).map_err(LifecycleError::Io)?;
    Ok(lock_file)
}

/// SIGTERM or SIGINT triggers graceful shutdown. Detached engine
/// children are in their own process groups and never see either.
fn install_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "could not install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate => {}
        }
        token.cancel();
    });
}

/// Errors that abort startup; each maps to a non-zero process exit.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("auth configuration error: {0}")]
    Auth(#[from] AuthSetupError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to acquire run-dir lock (is another instance running?): {0}")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(String, #[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
