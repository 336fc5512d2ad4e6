// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! The reconstructed view of a run.

use crate::request::RunRequest;
use crate::state::State;
use crate::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a single pass over a run directory can reconstruct.
///
/// Missing files map to `None` fields, never to errors; a missing
/// `state.txt` maps to [`State::Unknown`]. The filesystem is
/// authoritative: a summary is always derived from disk, the SQLite
/// snapshot only caches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Present iff auth was enabled at submit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RunRequest>,
    /// Supervisor PID from `run.pid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

impl RunSummary {
    /// Tags submitted with the run, if the request survives on disk.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.request
            .iter()
            .flat_map(|r| r.tags.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether `tag` (a `key:value` pair) matches this run.
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags().any(|(k, v)| k == key && v == value)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
