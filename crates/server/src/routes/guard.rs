// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Per-request identity binding and run ownership checks.

use crate::error::ApiError;
use crate::service::AppState;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use sapporo_core::{RunId, RunSummary};

/// Authenticate the request. `Ok(None)` means auth is disabled;
/// otherwise the verified username is bound to the request.
pub(crate) async fn caller(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<String>, ApiError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));
    state.auth.authenticate(bearer).await
}

/// Parse a run ID path parameter.
pub(crate) fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid_request(format!("malformed run_id: {raw:?}")))
}

/// Load a run, enforcing ownership without leaking existence.
///
/// When auth is enabled, ownership mismatch and not-found BOTH produce
/// 403 so a non-owner cannot probe for run IDs; 404 is reserved for the
/// auth-disabled case.
pub(crate) fn load_owned(
    state: &AppState,
    caller: Option<&str>,
    run_id: RunId,
) -> Result<RunSummary, ApiError> {
    match state.store.load(run_id) {
        Some(summary) => {
            check_owner(caller, summary.username.as_deref())?;
            Ok(summary)
        }
        None => Err(missing_run(caller, run_id)),
    }
}

/// The error for a run the caller may not see (or that does not exist).
pub(crate) fn missing_run(caller: Option<&str>, run_id: RunId) -> ApiError {
    if caller.is_some() {
        ApiError::forbidden()
    } else {
        ApiError::not_found(format!("run not found: {run_id}"))
    }
}

/// Owner comparison. A run with no recorded owner (created while auth
/// was disabled) is readable by anyone.
fn check_owner(caller: Option<&str>, owner: Option<&str>) -> Result<(), ApiError> {
    match (caller, owner) {
        (Some(caller), Some(owner)) if caller != owner => Err(ApiError::forbidden()),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
