// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! `GET /service-info` and the executable-workflow listing.

use crate::error::ApiError;
use crate::service::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

/// The configured document, enriched with live per-state run counts.
pub(super) async fn get_service_info(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let mut info = state.service_info.clone();

    let counts = match state.index.count_by_state() {
        Ok(counts) => counts,
        Err(e) => {
            // The snapshot may not exist yet; counts are best-effort.
            warn!(error = %e, "could not count runs for service-info");
            Default::default()
        }
    };
    if let Value::Object(map) = &mut info {
        map.insert(
            "system_state_counts".to_string(),
            serde_json::to_value(&counts).unwrap_or(Value::Null),
        );
        map.insert(
            "auth_enabled".to_string(),
            Value::Bool(state.auth.enabled()),
        );
    }
    Ok(Json(info))
}

/// The whitelist as configured; empty means unrestricted.
pub(super) async fn get_executable_workflows(
    State(state): State<AppState>,
) -> Json<Value> {
    Json(json!({ "workflows": state.executable_workflows }))
}
