// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! HTTP error mapping.
//!
//! Every handler failure funnels through [`ApiError`], which renders
//! the `ErrorResponse` wire body with the status code fixed by its
//! [`ErrorKind`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sapporo_core::{ErrorKind, ErrorResponse};
use sapporo_storage::{IndexError, StoreError};

/// A classified, user-visible error.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {msg}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub msg: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, msg)
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, msg)
    }

    /// Deliberately terse: ownership mismatch and not-found produce the
    /// same body so a non-owner cannot probe for run existence.
    pub fn forbidden() -> Self {
        Self::new(ErrorKind::Forbidden, "forbidden")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }

    pub fn unsupported() -> Self {
        Self::new(ErrorKind::Unsupported, "unsupported in this implementation")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, msg)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::NotFound(id) => Self::not_found(format!("run not found: {id}")),
            StoreError::StateConflict { .. } => Self::conflict(e.to_string()),
            StoreError::UnsafePath(_) => Self::invalid_request(e.to_string()),
            StoreError::OutputNotFound(_) => Self::not_found(e.to_string()),
            StoreError::Io(_) | StoreError::Json(_) => {
                Self::new(ErrorKind::StorageIo, e.to_string())
            }
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        Self::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.kind, self.msg);
        let status =
            StatusCode::from_u16(body.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
