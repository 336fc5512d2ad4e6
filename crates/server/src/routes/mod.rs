// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! HTTP surface: thin handlers mapping WES endpoints onto the store,
//! validator, authenticator, supervisor and index.

mod guard;
mod outputs;
mod query;
mod runs;
mod service_info;
mod tasks;
mod token;

use crate::service::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Workflow attachments can be large; axum's 2 MiB default is far too
/// small for multipart submissions.
const MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

/// Build the full router, nested under `url_prefix` when configured.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/service-info", get(service_info::get_service_info))
        .route(
            "/executable-workflows",
            get(service_info::get_executable_workflows),
        )
        .route("/token", post(token::post_token))
        .route("/me", get(token::get_me))
        .route(
            "/runs",
            get(runs::list_runs)
                .post(runs::post_run)
                .delete(runs::delete_runs),
        )
        .route("/runs/{run_id}", get(runs::get_run).delete(runs::delete_run))
        .route("/runs/{run_id}/status", get(runs::get_run_status))
        .route("/runs/{run_id}/cancel", post(runs::cancel_run))
        .route("/runs/{run_id}/outputs", get(outputs::list_run_outputs))
        .route("/runs/{run_id}/outputs/{*path}", get(outputs::get_output))
        .route("/runs/{run_id}/ro-crate", get(outputs::get_ro_crate))
        .route("/runs/{run_id}/tasks", get(tasks::list_tasks))
        .route("/runs/{run_id}/tasks/{task_id}", get(tasks::get_task));

    let router = match state.config.url_prefix.clone() {
        Some(prefix) => Router::new().nest(&prefix, api),
        None => api,
    };
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.allow_origin))
        .with_state(state)
}

fn cors_layer(allow_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);
    if allow_origin == "*" {
        layer.allow_origin(Any)
    } else {
        match allow_origin.parse::<HeaderValue>() {
            Ok(origin) => layer.allow_origin(origin),
            Err(_) => {
                warn!(allow_origin, "invalid allow-origin value, falling back to *");
                layer.allow_origin(Any)
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
