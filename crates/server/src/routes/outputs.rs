// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Output and RO-Crate endpoints.
//!
//! Every `file_url` handed to clients points back into this API under
//! `/runs/{id}/outputs/...`; raw disk paths never leave the service.

use crate::error::ApiError;
use crate::service::AppState;
use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sapporo_core::{FileObject, RunId};
use sapporo_storage::layout;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use super::guard::{caller, load_owned, parse_run_id};
use super::query::query_flag;

/// Outputs with API-facing URLs, for embedding in run detail and the
/// outputs listing.
pub(super) fn api_outputs(state: &AppState, run_id: RunId) -> Vec<FileObject> {
    let base = state.config.effective_base_url();
    state
        .store
        .list_outputs(run_id)
        .into_iter()
        .map(|f| FileObject {
            file_url: format!("{base}/runs/{run_id}/outputs/{}", f.file_name),
            file_name: f.file_name,
        })
        .collect()
}

/// `GET /runs/{id}/outputs`: listing, or a zip archive with
/// `download=true`.
pub(super) async fn list_run_outputs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    load_owned(&state, caller.as_deref(), run_id)?;

    if query_flag(raw.as_deref(), "download") {
        let archive = zip_outputs(&state, run_id).await?;
        let disposition = format!("attachment; filename=\"{run_id}_outputs.zip\"");
        return Ok((
            [
                (CONTENT_TYPE, "application/zip".to_string()),
                (CONTENT_DISPOSITION, disposition),
            ],
            archive,
        )
            .into_response());
    }

    Ok(Json(json!({ "outputs": api_outputs(&state, run_id) })).into_response())
}

/// `GET /runs/{id}/outputs/{path...}`: stream one output file.
pub(super) async fn get_output(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((run_id, path)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    load_owned(&state, caller.as_deref(), run_id)?;

    let resolved = state.store.resolve_output(run_id, &path)?;
    let file = tokio::fs::File::open(&resolved)
        .await
        .map_err(|e| ApiError::internal(format!("failed to open output: {e}")))?;

    let mime = mime_guess::from_path(&resolved).first_or_octet_stream();
    let mut response = Response::builder().header(CONTENT_TYPE, mime.as_ref());
    if query_flag(raw.as_deref(), "download") {
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        response = response.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        );
    }
    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

/// `GET /runs/{id}/ro-crate`: the provenance metadata file.
pub(super) async fn get_ro_crate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let caller = caller(&state, &headers).await?;
    let run_id = parse_run_id(&run_id)?;
    load_owned(&state, caller.as_deref(), run_id)?;

    let raw_crate = state
        .store
        .read_text(run_id, layout::RO_CRATE_METADATA_JSON)
        .ok_or_else(|| ApiError::not_found("ro-crate-metadata.json has not been generated"))?;
    let value: Value = serde_json::from_str(&raw_crate)
        .map_err(|e| ApiError::internal(format!("malformed ro-crate-metadata.json: {e}")))?;

    if query_flag(raw.as_deref(), "download") {
        return Ok((
            [
                (CONTENT_TYPE, "application/ld+json".to_string()),
                (
                    CONTENT_DISPOSITION,
                    "attachment; filename=\"ro-crate-metadata.json\"".to_string(),
                ),
            ],
            raw_crate,
        )
            .into_response());
    }
    Ok(Json(value).into_response())
}

/// Build an in-memory zip of everything under `outputs/`.
async fn zip_outputs(state: &AppState, run_id: RunId) -> Result<Vec<u8>, ApiError> {
    let files = state.store.list_outputs(run_id);
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = async_zip::tokio::write::ZipFileWriter::with_tokio(&mut cursor);

    for file in files {
        let data = tokio::fs::read(&file.file_url)
            .await
            .map_err(|e| ApiError::internal(format!("failed to read output: {e}")))?;
        let entry = async_zip::ZipEntryBuilder::new(
            file.file_name.clone().into(),
            async_zip::Compression::Deflate,
        );
        writer
            .write_entry_whole(entry, &data)
            .await
            .map_err(|e| ApiError::internal(format!("failed to archive outputs: {e}")))?;
    }
    writer
        .close()
        .await
        .map_err(|e| ApiError::internal(format!("failed to finalize archive: {e}")))?;
    Ok(cursor.into_inner())
}
