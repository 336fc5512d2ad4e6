// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! `/runs/{id}/tasks*`: per-step task introspection is not part of
//! this implementation; both endpoints answer with the protocol-level
//! UNSUPPORTED error.

use crate::error::ApiError;
use axum::extract::Path;

pub(super) async fn list_tasks(Path(_run_id): Path<String>) -> ApiError {
    ApiError::unsupported()
}

pub(super) async fn get_task(Path((_run_id, _task_id)): Path<(String, String)>) -> ApiError {
    ApiError::unsupported()
}
