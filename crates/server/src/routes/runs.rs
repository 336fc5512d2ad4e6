// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Run lifecycle endpoints.

use crate::error::ApiError;
use crate::service::{get_with_retry, AppState};
use crate::supervisor::{self, CancelOutcome};
use crate::validator::{self, RawRunForm};
use axum::extract::{FromRequest, Multipart, Path, RawQuery, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::Json;
use sapporo_core::clock::to_rfc3339_utc;
use sapporo_core::{safe_file_name, RunId, State as RunState};
use sapporo_storage::{layout, NewRun, RunFilter};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::guard::{caller, load_owned, missing_run, parse_run_id};
use super::outputs::api_outputs;
use super::query::{parse_list_query, parse_run_ids};

#[derive(Debug, Serialize)]
pub(super) struct RunListEntry {
    run_id: RunId,
    state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunListResponse {
    runs: Vec<RunListEntry>,
    next_page_token: String,
    total_runs: u64,
}

/// `POST /runs`: validate, materialize, fork.
pub(super) async fn post_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let form = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::invalid_request(format!("bad multipart body: {e}")))?;
        RawRunForm::from_multipart(multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<Value>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::invalid_request(format!("bad JSON body: {e}")))?;
        RawRunForm::from_json(body)?
    } else {
        return Err(ApiError::invalid_request(
            "POST /runs accepts multipart/form-data or application/json",
        ));
    };

    let validated = validator::validate(form, &state.service_info, &state.executable_workflows)?;

    // Stage remote attachments alongside the uploaded ones.
    let mut attachments = validated.attachments;
    for obj in &validated.request.workflow_attachment_obj {
        let body = get_with_retry(&state.http, &obj.file_url)
            .await
            .map_err(|e| {
                ApiError::upstream(format!("failed to fetch attachment {}: {e}", obj.file_url))
            })?
            .bytes()
            .await
            .map_err(|e| {
                ApiError::upstream(format!("failed to read attachment {}: {e}", obj.file_url))
            })?;
        let name = safe_file_name(&obj.file_name)
            .map_err(|e| ApiError::invalid_request(format!("{e}")))?;
        attachments.push((name, body.to_vec()));
    }

    let config_snapshot = serde_json::to_value(&state.config)
        .map_err(|e| ApiError::internal(format!("failed to capture config: {e}")))?;
    let run_id = state.store.create(NewRun {
        request: &validated.request,
        config_snapshot: &config_snapshot,
        username: caller.as_deref(),
        attachments: &attachments,
    })?;
    info!(run_id = %run_id, engine = %validated.request.workflow_engine, "run created");

    supervisor::spawn_dispatcher(&state, run_id).await;
    Ok(Json(json!({ "run_id": run_id })))
}

/// `GET /runs`: served from the snapshot; `latest=true` re-reads disk
/// for the matched rows.
pub(super) async fn list_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<RunListResponse>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let query = parse_list_query(raw.as_deref())?;

    let filter = RunFilter {
        state: query.state,
        run_ids: query.run_ids,
        tags: query.tags,
        username: caller,
        sort_order: query.sort_order,
        page_size: query.page_size,
        offset: query.offset,
    };
    let page = state.index.query(&filter)?;

    let mut runs = Vec::with_capacity(page.runs.len());
    for row in page.runs {
        let entry = if query.latest {
            // Deleted directories keep their snapshot row (the index
            // must tolerate missing directories).
            match state.store.load(row.run_id) {
                Some(live) => RunListEntry {
                    run_id: live.run_id,
                    state: live.state,
                    start_time: live.start_time.map(to_rfc3339_utc),
                    end_time: live.end_time.map(to_rfc3339_utc),
                    tags: live
                        .tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                None => index_entry(row),
            }
        } else {
            index_entry(row)
        };
        runs.push(entry);
    }

    Ok(Json(RunListResponse {
        runs,
        next_page_token: page
            .next_offset
            .map(|o| o.to_string())
            .unwrap_or_default(),
        total_runs: page.total,
    }))
}

fn index_entry(row: sapporo_storage::IndexRow) -> RunListEntry {
    RunListEntry {
        run_id: row.run_id,
        state: row.state,
        start_time: row.start_time.map(to_rfc3339_utc),
        end_time: row.end_time.map(to_rfc3339_utc),
        tags: row.tags,
    }
}

/// `GET /runs/{id}`: always reconstructed from disk, never the index.
pub(super) async fn get_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    let summary = load_owned(&state, caller.as_deref(), run_id)?;

    let system_logs: Value = state
        .store
        .read_text(run_id, layout::SYSTEM_LOGS_JSON)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Array(Vec::new()));

    Ok(Json(json!({
        "run_id": run_id,
        "request": summary.request,
        "state": summary.state,
        "run_log": {
            "name": summary.request.as_ref().map(|r| r.workflow_url.clone()),
            "cmd": state.store.read_text(run_id, layout::CMD_TXT),
            "start_time": summary.start_time.map(to_rfc3339_utc),
            "end_time": summary.end_time.map(to_rfc3339_utc),
            "stdout": state.store.read_text(run_id, layout::STDOUT_LOG),
            "stderr": state.store.read_text(run_id, layout::STDERR_LOG),
            "exit_code": summary.exit_code,
            "system_logs": system_logs,
        },
        "task_logs": Value::Null,
        "outputs": api_outputs(&state, run_id),
    })))
}

/// `GET /runs/{id}/status`: live state, minimal body.
pub(super) async fn get_run_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    let summary = load_owned(&state, caller.as_deref(), run_id)?;
    Ok(Json(json!({ "run_id": run_id, "state": summary.state })))
}

/// `POST /runs/{id}/cancel`.
pub(super) async fn cancel_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    load_owned(&state, caller.as_deref(), run_id)?;

    let outcome = supervisor::request_cancel(&state, run_id)?;
    let already_exited = matches!(
        outcome,
        CancelOutcome::AlreadyTerminal | CancelOutcome::Signaled { already_exited: true }
    );
    let current = state
        .store
        .read_state(run_id)
        .unwrap_or(RunState::Unknown);
    Ok(Json(json!({
        "run_id": run_id,
        "state": current,
        "already_exited": already_exited,
    })))
}

/// `DELETE /runs/{id}`: remove the directory; DELETED survives only in
/// the index.
pub(super) async fn delete_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    load_owned(&state, caller.as_deref(), run_id)?;

    delete_one(&state, run_id)?;
    Ok(Json(json!({ "run_id": run_id })))
}

/// `DELETE /runs?run_ids=...`: bulk form; `run_ids` is required.
pub(super) async fn delete_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_ids = parse_run_ids(raw.as_deref())?;

    for run_id in &run_ids {
        load_owned(&state, caller.as_deref(), *run_id)?;
    }
    for run_id in &run_ids {
        match delete_one(&state, *run_id) {
            Ok(()) => {}
            // Lost a race with another deleter; the outcome stands.
            Err(e) if e.kind == sapporo_core::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Json(json!({ "run_ids": run_ids })))
}

fn delete_one(state: &AppState, run_id: RunId) -> Result<(), ApiError> {
    state.store.delete(run_id).map_err(|e| {
        match e {
            // The run vanished mid-flight.
            sapporo_storage::StoreError::NotFound(_) => missing_run(None, run_id),
            other => other.into(),
        }
    })?;
    if let Err(e) = state.index.mark_deleted(run_id) {
        // The tombstone will be retried by the next snapshot pass.
        warn!(run_id = %run_id, error = %e, "failed to record deletion tombstone");
    }
    info!(run_id = %run_id, "run deleted");
    Ok(())
}
