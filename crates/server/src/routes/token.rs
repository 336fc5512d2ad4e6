// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Token issuance (local auth mode) and identity echo.

use crate::auth::TokenResponse;
use crate::error::ApiError;
use crate::service::AppState;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use super::guard::caller;

/// `POST /token`: multipart form with `username` and `password`.
pub(super) async fn post_token(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<TokenResponse>, ApiError> {
    // Extract by hand so malformed bodies still produce the uniform
    // ErrorResponse shape.
    let mut multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| ApiError::invalid_request(format!("expected multipart form: {e}")))?;

    let mut username = None;
    let mut password = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_request(format!("bad multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let text = field
            .text()
            .await
            .map_err(|e| ApiError::invalid_request(format!("bad field {name:?}: {e}")))?;
        match name.as_str() {
            "username" => username = Some(text),
            "password" => password = Some(text),
            _ => {}
        }
    }
    let username =
        username.ok_or_else(|| ApiError::invalid_request("username is required"))?;
    let password =
        password.ok_or_else(|| ApiError::invalid_request("password is required"))?;

    Ok(Json(state.auth.issue_token(&username, &password)?))
}

/// `GET /me`: echo the verified identity.
pub(super) async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    match caller(&state, &headers).await? {
        Some(username) => Ok(Json(json!({ "username": username }))),
        None => Err(ApiError::invalid_request("authentication is disabled")),
    }
}
