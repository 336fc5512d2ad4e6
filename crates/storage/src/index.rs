// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! SQLite snapshot of all runs.
//!
//! `GET /runs` is served from this snapshot so list queries never walk
//! the whole run tree. The snapshot is rebuilt periodically into a temp
//! file and atomically renamed over `sapporo.db`; it is a derived cache
//! and may be deleted at any time. DELETED tombstones live only here
//! (the directory itself is gone) and are carried across rebuilds.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use sapporo_core::clock::{parse_rfc3339_utc, to_rfc3339_utc};
use sapporo_core::{RunId, RunSummary, State};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Sort direction for list queries, by `start_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("sort_order must be asc or desc, got {other:?}")),
        }
    }
}

/// Default upper bound for one page of results.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filters for a list query. All present filters AND together.
#[derive(Debug, Clone)]
pub struct RunFilter {
    pub state: Option<State>,
    pub run_ids: Option<Vec<RunId>>,
    /// `key:value` pairs; every pair must match.
    pub tags: Vec<(String, String)>,
    /// Restrict to one owner (set when auth is enabled).
    pub username: Option<String>,
    pub sort_order: SortOrder,
    pub page_size: u32,
    pub offset: u64,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            state: None,
            run_ids: None,
            tags: Vec::new(),
            username: None,
            sort_order: SortOrder::default(),
            page_size: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// One row of the snapshot.
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub run_id: RunId,
    pub state: State,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub username: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// A page of query results.
#[derive(Debug, Clone)]
pub struct Page {
    pub runs: Vec<IndexRow>,
    pub total: u64,
    /// Offset of the next page, when more rows match.
    pub next_offset: Option<u64>,
}

/// Handle on the snapshot database file.
pub struct Index {
    db_path: PathBuf,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    username TEXT,
    tags_json TEXT NOT NULL DEFAULT '{}'
)";

impl Index {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Rebuild the snapshot from the given disk truth.
    ///
    /// Builds into a temp file and renames over the live name so
    /// readers always open a complete database. DELETED tombstones from
    /// the previous snapshot are preserved unless the run reappeared on
    /// disk.
    pub fn rebuild(&self, summaries: &[RunSummary]) -> Result<(), IndexError> {
        let tombstones = self.load_tombstones();

        let temp = self.db_path.with_extension(format!(
            "rebuild.{}.tmp",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&temp);

        {
            let mut conn = Connection::open(&temp)?;
            conn.execute(SCHEMA, [])?;
            let tx = conn.transaction()?;
            {
                let mut insert = tx.prepare(
                    "INSERT OR REPLACE INTO runs
                     (run_id, state, start_time, end_time, username, tags_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for summary in summaries {
                    let tags: BTreeMap<&str, &str> = summary.tags().collect();
                    insert.execute(rusqlite::params![
                        summary.run_id.to_string(),
                        summary.state.to_string(),
                        summary.start_time.map(to_rfc3339_utc),
                        summary.end_time.map(to_rfc3339_utc),
                        summary.username,
                        serde_json::to_string(&tags).unwrap_or_else(|_| "{}".to_string()),
                    ])?;
                }
                let live: std::collections::HashSet<RunId> =
                    summaries.iter().map(|s| s.run_id).collect();
                let mut insert_tombstone = tx.prepare(
                    "INSERT OR IGNORE INTO runs (run_id, state, tags_json)
                     VALUES (?1, 'DELETED', '{}')",
                )?;
                for id in tombstones {
                    if !live.contains(&id) {
                        insert_tombstone.execute([id.to_string()])?;
                    }
                }
            }
            tx.commit()?;
        }

        std::fs::rename(&temp, &self.db_path)?;
        debug!(runs = summaries.len(), "snapshot rebuilt");
        Ok(())
    }

    fn load_tombstones(&self) -> Vec<RunId> {
        if !self.db_path.exists() {
            return Vec::new();
        }
        let result = (|| -> Result<Vec<RunId>, IndexError> {
            let conn = Connection::open(&self.db_path)?;
            let mut stmt = conn.prepare("SELECT run_id FROM runs WHERE state = 'DELETED'")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(Result::ok)
                .filter_map(|s| s.parse().ok())
                .collect();
            Ok(ids)
        })();
        match result {
            Ok(ids) => ids,
            Err(e) => {
                // A corrupt or half-written snapshot is not fatal; it
                // is about to be replaced.
                warn!(error = %e, "could not read tombstones from existing snapshot");
                Vec::new()
            }
        }
    }

    /// Record a DELETED tombstone immediately (between rebuilds).
    pub fn mark_deleted(&self, run_id: RunId) -> Result<(), IndexError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(SCHEMA, [])?;
        conn.execute(
            "INSERT INTO runs (run_id, state, tags_json) VALUES (?1, 'DELETED', '{}')
             ON CONFLICT(run_id) DO UPDATE SET state = 'DELETED'",
            [run_id.to_string()],
        )?;
        Ok(())
    }

    /// Run a filtered, paginated list query against the snapshot.
    ///
    /// A missing snapshot file yields an empty page, never an error
    /// (the snapshot is destroyable by contract).
    pub fn query(&self, filter: &RunFilter) -> Result<Page, IndexError> {
        if !self.db_path.exists() {
            return Ok(Page {
                runs: Vec::new(),
                total: 0,
                next_offset: None,
            });
        }
        let conn = Connection::open(&self.db_path)?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            where_clauses.push(format!("state = ?{}", params.len() + 1));
            params.push(Box::new(state.to_string()));
        }
        if let Some(username) = &filter.username {
            where_clauses.push(format!("username = ?{}", params.len() + 1));
            params.push(Box::new(username.clone()));
        }
        if let Some(run_ids) = &filter.run_ids {
            if run_ids.is_empty() {
                return Ok(Page {
                    runs: Vec::new(),
                    total: 0,
                    next_offset: None,
                });
            }
            let placeholders: Vec<String> = run_ids
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", params.len() + 1 + i))
                .collect();
            where_clauses.push(format!("run_id IN ({})", placeholders.join(", ")));
            for id in run_ids {
                params.push(Box::new(id.to_string()));
            }
        }
        for (key, value) in &filter.tags {
            where_clauses.push(format!(
                "json_extract(tags_json, ?{}) = ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Box::new(format!("$.{key}")));
            params.push(Box::new(value.clone()));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM runs {where_sql}");
        let total: u64 = conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| row.get(0),
        )?;

        let direction = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let select_sql = format!(
            "SELECT run_id, state, start_time, end_time, username, tags_json
             FROM runs {where_sql}
             ORDER BY start_time IS NULL, start_time {direction}, run_id ASC
             LIMIT ?{} OFFSET ?{}",
            params.len() + 1,
            params.len() + 2
        );
        params.push(Box::new(filter.page_size as i64));
        params.push(Box::new(filter.offset as i64));

        let mut stmt = conn.prepare(&select_sql)?;
        let runs: Vec<IndexRow> = stmt
            .query_map(
                rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                |row| {
                    Ok(RawRow {
                        run_id: row.get(0)?,
                        state: row.get(1)?,
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                        username: row.get(4)?,
                        tags_json: row.get(5)?,
                    })
                },
            )?
            .filter_map(Result::ok)
            .filter_map(RawRow::decode)
            .collect();

        let consumed = filter.offset + runs.len() as u64;
        let next_offset = (consumed < total && !runs.is_empty()).then_some(consumed);
        Ok(Page {
            runs,
            total,
            next_offset,
        })
    }

    /// Count runs per state word, for `service-info`.
    pub fn count_by_state(&self) -> Result<BTreeMap<String, u64>, IndexError> {
        if !self.db_path.exists() {
            return Ok(BTreeMap::new());
        }
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM runs GROUP BY state")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
            .filter_map(Result::ok)
            .collect();
        Ok(counts)
    }
}

struct RawRow {
    run_id: String,
    state: String,
    start_time: Option<String>,
    end_time: Option<String>,
    username: Option<String>,
    tags_json: String,
}

impl RawRow {
    fn decode(self) -> Option<IndexRow> {
        Some(IndexRow {
            run_id: self.run_id.parse().ok()?,
            state: self.state.parse().unwrap_or(State::Unknown),
            start_time: self.start_time.as_deref().and_then(parse_rfc3339_utc),
            end_time: self.end_time.as_deref().and_then(parse_rfc3339_utc),
            username: self.username,
            tags: serde_json::from_str(&self.tags_json).unwrap_or_default(),
        })
    }
}

/// Errors from snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
