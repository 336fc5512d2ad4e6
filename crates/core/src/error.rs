// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Error vocabulary shared across the service.
//!
//! Every user-visible failure maps to one of these kinds, and every
//! 4xx/5xx body conforms to [`ErrorResponse`].

use serde::{Deserialize, Serialize};

/// Classified error kinds with fixed HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    /// Requested surface exists in the protocol but is not implemented
    /// here (the `/tasks*` endpoints).
    Unsupported,
    StorageIo,
    Internal,
    /// IdP fetch failed after retries.
    Upstream,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::Unsupported => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::StorageIo | ErrorKind::Internal => 500,
            ErrorKind::Upstream => 502,
        }
    }
}

crate::simple_display! {
    ErrorKind {
        InvalidRequest => "INVALID_REQUEST",
        Unauthenticated => "UNAUTHENTICATED",
        Forbidden => "FORBIDDEN",
        NotFound => "NOT_FOUND",
        Conflict => "CONFLICT",
        Unsupported => "UNSUPPORTED",
        StorageIo => "STORAGE_IO",
        Internal => "INTERNAL",
        Upstream => "UPSTREAM",
    }
}

/// Wire body for every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub msg: String,
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            status_code: kind.status_code(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
