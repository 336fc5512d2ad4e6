// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Request validation: turns a raw `POST /runs` body into a canonical
//! [`RunRequest`] or a structured 400.
//!
//! Bodies arrive either as `multipart/form-data` (every field a string,
//! some JSON-encoded) or as `application/json`; both are unified into a
//! [`RawRunForm`] first so the validation rules run once.

use crate::error::ApiError;
use axum::extract::Multipart;
use sapporo_core::{safe_file_name, FileObject, RunRequest, WorkflowEngine, WorkflowType};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Field name for uploaded attachment parts.
const ATTACHMENT_FIELD: &str = "workflow_attachment";

/// The unified, not-yet-validated form.
#[derive(Debug, Default)]
pub struct RawRunForm {
    /// Text fields, JSON-encoded or plain.
    pub fields: HashMap<String, String>,
    /// Uploaded attachment bodies (multipart only), keyed by the
    /// client-sent file name (not yet normalized).
    pub attachments: Vec<(String, Vec<u8>)>,
}

impl RawRunForm {
    /// Drain a multipart body into the unified form.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::invalid_request(format!("malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == ATTACHMENT_FIELD || name == "workflow_attachment[]" {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::invalid_request("workflow_attachment part without a filename")
                    })?;
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::invalid_request(format!("failed to read attachment: {e}"))
                })?;
                form.attachments.push((file_name, bytes.to_vec()));
            } else {
                let text = field.text().await.map_err(|e| {
                    ApiError::invalid_request(format!("failed to read field {name:?}: {e}"))
                })?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Flatten a JSON body into the unified form. Non-string values are
    /// kept as their JSON encoding and re-parsed by the dual-form
    /// readers below.
    pub fn from_json(body: Value) -> Result<Self, ApiError> {
        let Value::Object(map) = body else {
            return Err(ApiError::invalid_request("request body must be a JSON object"));
        };
        let mut form = Self::default();
        for (key, value) in map {
            if key == ATTACHMENT_FIELD {
                return Err(ApiError::invalid_request(
                    "workflow_attachment uploads require multipart/form-data",
                ));
            }
            let text = match value {
                Value::String(s) => s,
                Value::Null => continue,
                other => other.to_string(),
            };
            form.fields.insert(key, text);
        }
        Ok(form)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|s| !s.trim().is_empty())
    }
}

/// A JSON object or a JSON string containing one (the dual form every
/// structured field accepts).
fn parse_object_field(
    raw: &str,
    field: &'static str,
) -> Result<serde_json::Map<String, Value>, ApiError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| ApiError::invalid_request(format!("{field} is not valid JSON")))?;
    let value = match value {
        // A JSON string containing an object: parse one level deeper.
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|_| ApiError::invalid_request(format!("{field} is not valid JSON")))?,
        other => other,
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::invalid_request(format!("{field} must be a JSON object"))),
    }
}

fn parse_string_map(raw: &str, field: &'static str) -> Result<BTreeMap<String, String>, ApiError> {
    let map = parse_object_field(raw, field)?;
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let Value::String(s) = value else {
            return Err(ApiError::invalid_request(format!(
                "{field} values must be strings (key {key:?})"
            )));
        };
        out.insert(key, s);
    }
    Ok(out)
}

fn parse_attachment_obj(raw: &str) -> Result<Vec<FileObject>, ApiError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| ApiError::invalid_request("workflow_attachment_obj is not valid JSON"))?;
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner).map_err(|_| {
            ApiError::invalid_request("workflow_attachment_obj is not valid JSON")
        })?,
        other => other,
    };
    let objs: Vec<FileObject> = serde_json::from_value(value).map_err(|_| {
        ApiError::invalid_request(
            "workflow_attachment_obj must be a list of {file_name, file_url}",
        )
    })?;
    for obj in &objs {
        if !(obj.file_url.starts_with("http://") || obj.file_url.starts_with("https://")) {
            return Err(ApiError::invalid_request(format!(
                "workflow_attachment_obj file_url must be an absolute http(s) URL: {:?}",
                obj.file_url
            )));
        }
    }
    Ok(objs)
}

fn is_absolute_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// The validated outcome: the canonical request plus normalized
/// multipart attachment bodies ready for staging.
#[derive(Debug)]
pub struct ValidatedRun {
    pub request: RunRequest,
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Validate a unified form against the service configuration.
pub fn validate(
    form: RawRunForm,
    service_info: &Value,
    executable_workflows: &[String],
) -> Result<ValidatedRun, ApiError> {
    let workflow_type: WorkflowType = form
        .get("workflow_type")
        .ok_or_else(|| ApiError::invalid_request("workflow_type is required"))?
        .parse()
        .map_err(|e| ApiError::invalid_request(format!("{e}")))?;

    let workflow_engine: WorkflowEngine = form
        .get("workflow_engine")
        .ok_or_else(|| ApiError::invalid_request("workflow_engine is required"))?
        .parse()
        .map_err(|e| ApiError::invalid_request(format!("{e}")))?;

    if !workflow_engine.accepts(workflow_type) {
        return Err(ApiError::invalid_request(format!(
            "workflow_engine {workflow_engine} does not accept workflow_type {workflow_type}"
        )));
    }

    let workflow_type_version = form
        .get("workflow_type_version")
        .ok_or_else(|| ApiError::invalid_request("workflow_type_version is required"))?
        .to_string();
    check_type_version(service_info, workflow_type, &workflow_type_version)?;

    let workflow_params = match form.get("workflow_params") {
        Some(raw) => Some(Value::Object(parse_object_field(raw, "workflow_params")?)),
        None => None,
    };
    let workflow_engine_parameters = match form.get("workflow_engine_parameters") {
        Some(raw) => parse_string_map(raw, "workflow_engine_parameters")?,
        None => BTreeMap::new(),
    };
    let tags = match form.get("tags") {
        Some(raw) => parse_string_map(raw, "tags")?,
        None => BTreeMap::new(),
    };
    let workflow_attachment_obj = match form.get("workflow_attachment_obj") {
        Some(raw) => parse_attachment_obj(raw)?,
        None => Vec::new(),
    };

    // Normalize uploaded attachment names before anything references them.
    let mut attachments = Vec::with_capacity(form.attachments.len());
    for (name, body) in &form.attachments {
        let safe = safe_file_name(name).map_err(|e| ApiError::invalid_request(format!("{e}")))?;
        attachments.push((safe, body.clone()));
    }
    let mut remote_names = Vec::new();
    for obj in &workflow_attachment_obj {
        let safe =
            safe_file_name(&obj.file_name).map_err(|e| ApiError::invalid_request(format!("{e}")))?;
        remote_names.push(safe);
    }

    // workflow_url: required unless exactly one attachment can supply it.
    let workflow_url = match form.get("workflow_url") {
        Some(url) => url.to_string(),
        None if attachments.len() == 1 && remote_names.is_empty() => attachments[0].0.clone(),
        None => {
            return Err(ApiError::invalid_request(
                "workflow_url is required when attachments do not identify the workflow document",
            ))
        }
    };

    if !executable_workflows.is_empty() {
        // Whitelist mode: only exact matches of absolute URLs run.
        if !is_absolute_http(&workflow_url)
            || !executable_workflows.iter().any(|w| w == &workflow_url)
        {
            return Err(ApiError::invalid_request(
                "workflow_url not in executable workflows",
            ));
        }
    } else if !is_absolute_http(&workflow_url) {
        // Attachment-relative: the named file must actually be staged.
        let safe = safe_file_name(&workflow_url)
            .map_err(|e| ApiError::invalid_request(format!("{e}")))?;
        let staged = attachments.iter().any(|(n, _)| n == &safe)
            || remote_names.iter().any(|n| n == &safe);
        if !staged {
            return Err(ApiError::invalid_request(format!(
                "workflow_url {workflow_url:?} does not match any attachment"
            )));
        }
    }

    let request = RunRequest {
        workflow_type,
        workflow_type_version,
        workflow_url,
        workflow_engine,
        workflow_engine_version: form.get("workflow_engine_version").map(str::to_string),
        workflow_params,
        workflow_engine_parameters,
        workflow_attachment_obj,
        tags,
    };
    Ok(ValidatedRun {
        request,
        attachments,
    })
}

/// `workflow_type_version` must be one the service advertises for the
/// given type (when the service-info document lists any).
fn check_type_version(
    service_info: &Value,
    workflow_type: WorkflowType,
    version: &str,
) -> Result<(), ApiError> {
    let advertised = service_info
        .get("workflow_type_versions")
        .and_then(|v| v.get(workflow_type.to_string()))
        .and_then(|v| v.get("workflow_type_version"))
        .and_then(Value::as_array);
    let Some(advertised) = advertised else {
        return Ok(());
    };
    if advertised.iter().any(|v| v.as_str() == Some(version)) {
        Ok(())
    } else {
        Err(ApiError::invalid_request(format!(
            "workflow_type_version {version:?} is not supported for workflow_type {workflow_type}"
        )))
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
