// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! On-disk layout of a run directory.
//!
//! ```text
//! {run_dir}/{id[:2]}/{id}/
//!   run_request.json       exact validated request
//!   sapporo_config.json    captured process config at submit time
//!   state.txt              single state word
//!   start_time.txt         RFC3339 UTC
//!   end_time.txt           RFC3339 UTC
//!   exit_code.txt          integer
//!   run.pid                supervisor PID
//!   stdout.log, stderr.log engine streams
//!   cmd.txt                final docker command
//!   workflow_engine_params.txt
//!   outputs/               produced artifacts (recursive)
//!   outputs.json           manifest, relative to outputs/
//!   exe/                   staged workflow document, attachments, params
//!   username.txt           present iff auth enabled
//!   system_logs.json       free-form structured notes
//!   ro-crate-metadata.json produced post-success
//! {run_dir}/sapporo.db     SQLite snapshot (destroyable)
//! ```

use sapporo_core::RunId;
use std::path::{Path, PathBuf};

pub const RUN_REQUEST_JSON: &str = "run_request.json";
pub const SAPPORO_CONFIG_JSON: &str = "sapporo_config.json";
pub const STATE_TXT: &str = "state.txt";
pub const START_TIME_TXT: &str = "start_time.txt";
pub const END_TIME_TXT: &str = "end_time.txt";
pub const EXIT_CODE_TXT: &str = "exit_code.txt";
pub const RUN_PID: &str = "run.pid";
pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";
pub const CMD_TXT: &str = "cmd.txt";
pub const ENGINE_PARAMS_TXT: &str = "workflow_engine_params.txt";
pub const OUTPUTS_DIR: &str = "outputs";
pub const OUTPUTS_JSON: &str = "outputs.json";
pub const EXE_DIR: &str = "exe";
pub const WORKFLOW_PARAMS_JSON: &str = "workflow_params.json";
pub const USERNAME_TXT: &str = "username.txt";
pub const SYSTEM_LOGS_JSON: &str = "system_logs.json";
pub const RO_CRATE_METADATA_JSON: &str = "ro-crate-metadata.json";

/// Global files at the run-dir root.
pub const INDEX_DB: &str = "sapporo.db";
pub const LOCK_FILE: &str = "sapporo.lock";

/// Path helper for one run's directory.
#[derive(Debug, Clone)]
pub struct RunDir {
    root: PathBuf,
    run_id: RunId,
}

impl RunDir {
    pub fn new(root: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            root: root.into(),
            run_id,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The public sharded directory: `{root}/{id[:2]}/{id}`.
    pub fn path(&self) -> PathBuf {
        self.root
            .join(self.run_id.shard())
            .join(self.run_id.to_string())
    }

    /// Staging path used during creation; renamed to [`Self::path`] once
    /// fully materialized so partial runs are never visible.
    pub fn staging_path(&self) -> PathBuf {
        self.root
            .join(self.run_id.shard())
            .join(format!("{}.tmp", self.run_id))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.file(OUTPUTS_DIR)
    }

    pub fn exe_dir(&self) -> PathBuf {
        self.file(EXE_DIR)
    }

    pub fn exists(&self) -> bool {
        self.path().is_dir()
    }
}

/// Build the manifest of files under an `outputs/` directory.
///
/// Walks recursively, skipping anything that is not a regular file, and
/// emits forward-slash relative paths in sorted order.
pub fn walk_outputs(outputs_dir: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(outputs_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(outputs_dir) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !rel.is_empty() {
                paths.push(rel);
            }
        }
    }
    paths.sort();
    paths
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
