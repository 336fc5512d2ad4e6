// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! The run store: atomic reads and writes of per-run state files.
//!
//! Single-file writes go through write-temp + rename so readers never
//! observe a partial file. Run creation materializes the whole
//! directory under a `.tmp` suffix and renames it into the sharded
//! path, so a partially-created run is never visible (and is rolled
//! back on failure).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sapporo_core::clock::{parse_rfc3339_utc, to_rfc3339_utc};
use sapporo_core::{FileObject, RunId, RunRequest, RunSummary, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::layout::{self, RunDir};

/// Everything needed to materialize a new run directory.
pub struct NewRun<'a> {
    pub request: &'a RunRequest,
    /// Captured process configuration, written to `sapporo_config.json`.
    pub config_snapshot: &'a serde_json::Value,
    pub username: Option<&'a str>,
    /// Attachment bodies staged under `exe/`. Names are already
    /// normalized relative paths.
    pub attachments: &'a [(String, Vec<u8>)],
}

/// One entry in `system_logs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub time: String,
    pub note: String,
}

/// Filesystem-backed store for all runs under one root directory.
pub struct RunStore {
    root: PathBuf,
    /// Advisory per-run locks serializing `state.txt` writes for the
    /// same run. Between different runs no ordering is guaranteed.
    locks: Mutex<HashMap<RunId, Arc<Mutex<()>>>>,
}

impl RunStore {
    /// Open (creating if necessary) the run directory root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: RunId) -> RunDir {
        RunDir::new(&self.root, run_id)
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.root.join(layout::INDEX_DB)
    }

    fn lock_for(&self, run_id: RunId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(run_id).or_default().clone()
    }

    /// Materialize a new run directory and return its ID.
    ///
    /// The directory appears under the public sharded path only after
    /// every file has been written; any failure removes the staging
    /// directory and surfaces as `StorageIo`.
    pub fn create(&self, new_run: NewRun<'_>) -> Result<RunId, StoreError> {
        let run_id = RunId::new();
        let dir = self.run_dir(run_id);
        let staging = dir.staging_path();

        match self.materialize(&staging, &new_run) {
            Ok(()) => {}
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(run_id = %run_id, error = %cleanup, "failed to roll back staging dir");
                    }
                }
                return Err(e);
            }
        }

        if let Err(e) = std::fs::rename(&staging, dir.path()) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        debug!(run_id = %run_id, "run directory created");
        Ok(run_id)
    }

    fn materialize(&self, staging: &Path, new_run: &NewRun<'_>) -> Result<(), StoreError> {
        create_dir_0755(staging)?;
        create_dir_0755(&staging.join(layout::OUTPUTS_DIR))?;
        create_dir_0755(&staging.join(layout::EXE_DIR))?;

        let request_json = serde_json::to_vec_pretty(new_run.request)?;
        atomic_write(&staging.join(layout::RUN_REQUEST_JSON), &request_json)?;

        let config_json = serde_json::to_vec_pretty(new_run.config_snapshot)?;
        atomic_write(&staging.join(layout::SAPPORO_CONFIG_JSON), &config_json)?;

        let params = new_run
            .request
            .workflow_params
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        atomic_write(
            &staging
                .join(layout::EXE_DIR)
                .join(layout::WORKFLOW_PARAMS_JSON),
            &serde_json::to_vec_pretty(&params)?,
        )?;

        let mut engine_params = String::new();
        for (key, value) in &new_run.request.workflow_engine_parameters {
            engine_params.push_str(key);
            if !value.is_empty() {
                engine_params.push(' ');
                engine_params.push_str(value);
            }
            engine_params.push('\n');
        }
        atomic_write(
            &staging.join(layout::ENGINE_PARAMS_TXT),
            engine_params.as_bytes(),
        )?;

        for (name, body) in new_run.attachments {
            let path = staging.join(layout::EXE_DIR).join(name);
            if let Some(parent) = path.parent() {
                create_dir_0755(parent)?;
            }
            atomic_write(&path, body)?;
        }

        if let Some(username) = new_run.username {
            atomic_write(&staging.join(layout::USERNAME_TXT), username.as_bytes())?;
        }

        atomic_write(&staging.join(layout::SYSTEM_LOGS_JSON), b"[]")?;

        // State goes last: a run is QUEUED only once fully materialized.
        atomic_write(
            &staging.join(layout::STATE_TXT),
            State::Queued.to_string().as_bytes(),
        )?;
        Ok(())
    }

    /// Reconstruct a run's summary from disk.
    ///
    /// Returns `None` only when the directory itself is missing.
    /// Missing files map to `None` fields; a missing `state.txt` maps
    /// to `UNKNOWN`.
    pub fn load(&self, run_id: RunId) -> Option<RunSummary> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return None;
        }
        Some(RunSummary {
            run_id,
            state: self.read_state(run_id).unwrap_or(State::Unknown),
            start_time: self.read_time(run_id, layout::START_TIME_TXT),
            end_time: self.read_time(run_id, layout::END_TIME_TXT),
            exit_code: self
                .read_text(run_id, layout::EXIT_CODE_TXT)
                .and_then(|s| s.trim().parse().ok()),
            username: self
                .read_text(run_id, layout::USERNAME_TXT)
                .map(|s| s.trim().to_string()),
            request: self
                .read_text(run_id, layout::RUN_REQUEST_JSON)
                .and_then(|s| serde_json::from_str::<RunRequest>(&s).ok()),
            pid: self.read_pid(run_id),
        })
    }

    /// Current state, or `None` when the run directory is missing.
    pub fn read_state(&self, run_id: RunId) -> Option<State> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return None;
        }
        let state = self
            .read_text(run_id, layout::STATE_TXT)
            .and_then(|s| s.parse().ok())
            .unwrap_or(State::Unknown);
        Some(state)
    }

    /// Atomically transition `state.txt`.
    ///
    /// The current state is inspected under the run's advisory lock
    /// just prior to the write; a forbidden transition is a no-op
    /// surfaced as [`StoreError::StateConflict`].
    pub fn write_state(&self, run_id: RunId, to: State) -> Result<(), StoreError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock();

        let from = self.read_state(run_id).ok_or(StoreError::NotFound(run_id))?;
        if !from.can_transition(to) {
            return Err(StoreError::StateConflict { run_id, from, to });
        }
        let path = self.run_dir(run_id).file(layout::STATE_TXT);
        atomic_write_retry(&path, to.to_string().as_bytes())?;
        debug!(run_id = %run_id, %from, %to, "state transition");
        Ok(())
    }

    pub fn read_pid(&self, run_id: RunId) -> Option<i32> {
        self.read_text(run_id, layout::RUN_PID)
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn write_pid(&self, run_id: RunId, pid: i32) -> Result<(), StoreError> {
        let path = self.run_dir(run_id).file(layout::RUN_PID);
        atomic_write(&path, format!("{pid}\n").as_bytes())?;
        Ok(())
    }

    /// Read one of the per-run files as UTF-8 text.
    pub fn read_text(&self, run_id: RunId, name: &str) -> Option<String> {
        std::fs::read_to_string(self.run_dir(run_id).file(name)).ok()
    }

    /// Atomically (re)write one of the per-run files.
    pub fn write_text(&self, run_id: RunId, name: &str, contents: &str) -> Result<(), StoreError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Err(StoreError::NotFound(run_id));
        }
        atomic_write(&dir.file(name), contents.as_bytes())?;
        Ok(())
    }

    fn read_time(&self, run_id: RunId, name: &str) -> Option<DateTime<Utc>> {
        self.read_text(run_id, name)
            .and_then(|s| parse_rfc3339_utc(&s))
    }

    /// Append a structured note to `system_logs.json`.
    pub fn append_system_log(
        &self,
        run_id: RunId,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Err(StoreError::NotFound(run_id));
        }
        let mut entries: Vec<SystemLogEntry> = self
            .read_text(run_id, layout::SYSTEM_LOGS_JSON)
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        entries.push(SystemLogEntry {
            time: to_rfc3339_utc(now),
            note: note.to_string(),
        });
        atomic_write(
            &dir.file(layout::SYSTEM_LOGS_JSON),
            &serde_json::to_vec_pretty(&entries)?,
        )?;
        Ok(())
    }

    /// Walk `outputs/` and list every produced file.
    ///
    /// `file_name` is the forward-slash relative path; `file_url` is the
    /// absolute path on disk (always within the outputs tree).
    pub fn list_outputs(&self, run_id: RunId) -> Vec<FileObject> {
        let outputs = self.run_dir(run_id).outputs_dir();
        layout::walk_outputs(&outputs)
            .into_iter()
            .map(|rel| FileObject {
                file_url: outputs.join(&rel).to_string_lossy().into_owned(),
                file_name: rel,
            })
            .collect()
    }

    /// Resolve a relative output path to its file on disk.
    ///
    /// Rejects `..` segments, backslashes and absolute paths before
    /// touching the filesystem, then re-checks that the resolved file
    /// still lives under `outputs/`.
    pub fn resolve_output(&self, run_id: RunId, relpath: &str) -> Result<PathBuf, StoreError> {
        let safe = sapporo_core::safe_file_name(relpath)
            .map_err(|_| StoreError::UnsafePath(relpath.to_string()))?;
        let outputs = self.run_dir(run_id).outputs_dir();
        let candidate = outputs.join(&safe);

        let resolved = candidate
            .canonicalize()
            .map_err(|_| StoreError::OutputNotFound(safe.clone()))?;
        let outputs_root = outputs
            .canonicalize()
            .map_err(|_| StoreError::OutputNotFound(safe.clone()))?;
        if !resolved.starts_with(&outputs_root) {
            return Err(StoreError::UnsafePath(relpath.to_string()));
        }
        if !resolved.is_file() {
            return Err(StoreError::OutputNotFound(safe));
        }
        Ok(resolved)
    }

    /// Transition to DELETING and remove the directory.
    ///
    /// The DELETED word lives only in the index; callers record the
    /// tombstone there after this returns.
    pub fn delete(&self, run_id: RunId) -> Result<(), StoreError> {
        self.write_state(run_id, State::Deleting)?;
        self.remove_dir(run_id)
    }

    /// Remove a run directory without the state dance (age-based
    /// cleanup, where nothing observes the intermediate state).
    pub fn remove_dir(&self, run_id: RunId) -> Result<(), StoreError> {
        let dir = self.run_dir(run_id);
        match std::fs::remove_dir_all(dir.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(run_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate every run ID present on disk.
    ///
    /// Tolerates foreign files at the root (`sapporo.db`, the lock
    /// file) and malformed directory names.
    pub fn scan(&self) -> Vec<RunId> {
        let mut ids = Vec::new();
        let Ok(shards) = std::fs::read_dir(&self.root) else {
            return ids;
        };
        for shard in shards.filter_map(Result::ok) {
            if !shard.path().is_dir() {
                continue;
            }
            let Ok(runs) = std::fs::read_dir(shard.path()) else {
                continue;
            };
            for entry in runs.filter_map(Result::ok) {
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name();
                if let Ok(id) = name.to_string_lossy().parse::<RunId>() {
                    ids.push(id);
                }
            }
        }
        ids.sort_by_key(|id| id.to_string());
        ids
    }
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("illegal state transition for {run_id}: {from} -> {to}")]
    StateConflict {
        run_id: RunId,
        from: State,
        to: State,
    },

    #[error("path escapes outputs directory: {0:?}")]
    UnsafePath(String),

    #[error("no such output file: {0:?}")]
    OutputNotFound(String),
}

fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write-temp + rename. The temp name carries the PID and a process-wide
/// counter so concurrent writers of the same file never collide.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));

    let mut file = std::fs::File::create(&temp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    match std::fs::rename(&temp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            Err(e)
        }
    }
}

/// Atomic write with a single retry on rename races.
fn atomic_write_retry(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match atomic_write(path, contents) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "atomic write failed, retrying once");
            atomic_write(path, contents)
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
