// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! The canonical, immutable run request.
//!
//! A [`RunRequest`] is the validated form of a `POST /runs` body. It is
//! written to `run_request.json` verbatim at submit time and never
//! modified afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Workflow language of the submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowType {
    #[serde(rename = "CWL")]
    Cwl,
    #[serde(rename = "WDL")]
    Wdl,
    #[serde(rename = "NFL")]
    Nfl,
    #[serde(rename = "SMK")]
    Smk,
}

crate::simple_display! {
    WorkflowType {
        Cwl => "CWL",
        Wdl => "WDL",
        Nfl => "NFL",
        Smk => "SMK",
    }
}

impl FromStr for WorkflowType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CWL" => Ok(WorkflowType::Cwl),
            "WDL" => Ok(WorkflowType::Wdl),
            "NFL" => Ok(WorkflowType::Nfl),
            "SMK" => Ok(WorkflowType::Smk),
            other => Err(RequestError::UnknownWorkflowType(other.to_string())),
        }
    }
}

/// Workflow engine that will execute the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowEngine {
    Cwltool,
    Nextflow,
    Toil,
    Cromwell,
    Snakemake,
    Ep3,
    Streamflow,
}

crate::simple_display! {
    WorkflowEngine {
        Cwltool => "cwltool",
        Nextflow => "nextflow",
        Toil => "toil",
        Cromwell => "cromwell",
        Snakemake => "snakemake",
        Ep3 => "ep3",
        Streamflow => "streamflow",
    }
}

impl FromStr for WorkflowEngine {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cwltool" => Ok(WorkflowEngine::Cwltool),
            "nextflow" => Ok(WorkflowEngine::Nextflow),
            "toil" => Ok(WorkflowEngine::Toil),
            "cromwell" => Ok(WorkflowEngine::Cromwell),
            "snakemake" => Ok(WorkflowEngine::Snakemake),
            "ep3" => Ok(WorkflowEngine::Ep3),
            "streamflow" => Ok(WorkflowEngine::Streamflow),
            other => Err(RequestError::UnknownWorkflowEngine(other.to_string())),
        }
    }
}

impl WorkflowEngine {
    /// Engine/type compatibility matrix.
    ///
    /// cromwell runs WDL only (CWL is rejected even though upstream
    /// cromwell nominally supports it).
    pub fn accepts(&self, workflow_type: WorkflowType) -> bool {
        match self {
            WorkflowEngine::Cwltool
            | WorkflowEngine::Toil
            | WorkflowEngine::Ep3
            | WorkflowEngine::Streamflow => workflow_type == WorkflowType::Cwl,
            WorkflowEngine::Cromwell => workflow_type == WorkflowType::Wdl,
            WorkflowEngine::Nextflow => workflow_type == WorkflowType::Nfl,
            WorkflowEngine::Snakemake => workflow_type == WorkflowType::Smk,
        }
    }
}

/// A named file reference.
///
/// `file_name` is a relative path (no `..` segment, no leading `/`).
/// `file_url` is an absolute `http(s)` URL or resolves within the run
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObject {
    pub file_name: String,
    pub file_url: String,
}

/// Validate and normalize an attachment or output file name.
///
/// Returns the normalized relative path (leading `./` stripped, forward
/// slashes only). Rejects empty names, absolute paths, backslashes and
/// any `..` segment.
pub fn safe_file_name(name: &str) -> Result<String, RequestError> {
    let reject = |why: &str| {
        Err(RequestError::UnsafeFileName {
            name: name.to_string(),
            why: why.to_string(),
        })
    };

    if name.is_empty() {
        return reject("empty");
    }
    if name.contains('\\') {
        return reject("backslash");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name.contains('\0') {
        return reject("NUL byte");
    }

    let normalized = name.strip_prefix("./").unwrap_or(name);
    if normalized.is_empty() || normalized.ends_with('/') {
        return reject("empty");
    }
    for segment in normalized.split('/') {
        if segment == ".." {
            return reject("`..` segment");
        }
        if segment.is_empty() {
            return reject("empty segment");
        }
    }
    Ok(normalized.to_string())
}

/// The validated request a run was created from. Immutable for the
/// lifetime of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub workflow_type: WorkflowType,
    pub workflow_type_version: String,
    /// Absolute `http(s)` URL or a path relative to the staged
    /// attachments under `exe/`.
    pub workflow_url: String,
    pub workflow_engine: WorkflowEngine,
    /// Advisory only; recorded and surfaced but never enforced against
    /// the running engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_engine_version: Option<String>,
    /// Canonical JSON object (a JSON-string body is parsed at validation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workflow_engine_parameters: BTreeMap<String, String>,
    /// Remote attachments to stage into `exe/` at submit time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflow_attachment_obj: Vec<FileObject>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl RunRequest {
    /// Whether `workflow_url` points into the staged attachments rather
    /// than at a remote document.
    pub fn url_is_attachment_relative(&self) -> bool {
        !(self.workflow_url.starts_with("http://") || self.workflow_url.starts_with("https://"))
    }
}

/// Errors from request parsing and normalization.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unknown workflow_type: {0:?}")]
    UnknownWorkflowType(String),

    #[error("unknown workflow_engine: {0:?}")]
    UnknownWorkflowEngine(String),

    #[error("unsafe file_name {name:?}: {why}")]
    UnsafeFileName { name: String, why: String },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
