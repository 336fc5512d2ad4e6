// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Query-string parsing for list endpoints.
//!
//! `run_ids` and `tags` are repeatable, which `axum::extract::Query`
//! does not model; the raw query string is parsed with
//! `form_urlencoded` instead.

use crate::error::ApiError;
use sapporo_core::{RunId, State};
use sapporo_storage::index::DEFAULT_PAGE_SIZE;
use sapporo_storage::SortOrder;

/// Parsed `GET /runs` query parameters.
#[derive(Debug)]
pub(crate) struct ListQuery {
    pub page_size: u32,
    pub offset: u64,
    pub sort_order: SortOrder,
    pub state: Option<State>,
    pub run_ids: Option<Vec<RunId>>,
    pub tags: Vec<(String, String)>,
    /// Bypass the snapshot and re-read matched rows from disk.
    pub latest: bool,
}

pub(crate) fn parse_list_query(raw: Option<&str>) -> Result<ListQuery, ApiError> {
    let mut query = ListQuery {
        page_size: DEFAULT_PAGE_SIZE,
        offset: 0,
        sort_order: SortOrder::default(),
        state: None,
        run_ids: None,
        tags: Vec::new(),
        latest: false,
    };
    for (key, value) in pairs(raw) {
        match key.as_str() {
            "page_size" => {
                query.page_size = value
                    .parse()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| ApiError::invalid_request("page_size must be a positive integer"))?;
            }
            "page_token" => {
                if !value.is_empty() {
                    query.offset = value
                        .parse()
                        .map_err(|_| ApiError::invalid_request("invalid page_token"))?;
                }
            }
            "sort_order" => {
                query.sort_order = value
                    .parse()
                    .map_err(|e: String| ApiError::invalid_request(e))?;
            }
            "state" => {
                query.state = Some(
                    value
                        .parse()
                        .map_err(|_| ApiError::invalid_request(format!("unknown state: {value:?}")))?,
                );
            }
            "run_ids" | "run_ids[]" => {
                let id = value
                    .parse()
                    .map_err(|_| ApiError::invalid_request(format!("malformed run_id: {value:?}")))?;
                query.run_ids.get_or_insert_with(Vec::new).push(id);
            }
            "tags" | "tags[]" => {
                let (k, v) = value.split_once(':').ok_or_else(|| {
                    ApiError::invalid_request("tags must be key:value pairs")
                })?;
                query.tags.push((k.to_string(), v.to_string()));
            }
            "latest" => query.latest = is_true(&value),
            _ => {}
        }
    }
    Ok(query)
}

/// Parse the repeatable `run_ids` parameter for `DELETE /runs`.
pub(crate) fn parse_run_ids(raw: Option<&str>) -> Result<Vec<RunId>, ApiError> {
    let mut ids = Vec::new();
    for (key, value) in pairs(raw) {
        if key == "run_ids" || key == "run_ids[]" {
            ids.push(value.parse().map_err(|_| {
                ApiError::invalid_request(format!("malformed run_id: {value:?}"))
            })?);
        }
    }
    if ids.is_empty() {
        return Err(ApiError::invalid_request("run_ids is required"));
    }
    Ok(ids)
}

/// Read a boolean flag (`download`, `latest`) from a query string.
pub(crate) fn query_flag(raw: Option<&str>, name: &str) -> bool {
    pairs(raw).any(|(key, value)| key == name && is_true(&value))
}

fn pairs(raw: Option<&str>) -> impl Iterator<Item = (String, String)> + '_ {
    url::form_urlencoded::parse(raw.unwrap_or("").as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
}

fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
