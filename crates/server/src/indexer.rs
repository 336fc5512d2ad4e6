// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! The periodic snapshot indexer.
//!
//! Runs one pass at startup (crash recovery) and then every
//! `snapshot_interval` minutes: walk the run tree, reconcile runs whose
//! supervisor died, rebuild the SQLite snapshot, and apply age-based
//! cleanup. It consumes only the store; everything it knows comes from
//! disk, so a missed pass or a destroyed snapshot loses nothing.

use crate::service::AppState;
use crate::supervisor::pid_alive;
use sapporo_core::clock::to_rfc3339_utc;
use sapporo_core::{Clock, RunSummary, State};
use sapporo_storage::{layout, IndexError, StoreError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Young pid-less runs are skipped by reconciliation: the fork may
/// simply not have happened yet.
const RECONCILE_GRACE: Duration = Duration::from_secs(60);

/// What one pass did, for logs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub runs: usize,
    pub reconciled: usize,
    pub removed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Run passes forever, until cancelled. Interval violations are logged,
/// never fatal: the next pass heals whatever this one missed.
pub async fn run_periodic(state: AppState, cancel: CancellationToken) {
    let interval = Duration::from_secs(state.config.snapshot_interval_min * 60);
    loop {
        match run_pass(&state) {
            Ok(stats) => info!(
                runs = stats.runs,
                reconciled = stats.reconciled,
                removed = stats.removed,
                "snapshot pass complete"
            ),
            Err(e) => warn!(error = %e, "snapshot pass failed"),
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("indexer stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One full pass: load, reconcile, clean up, rebuild.
pub fn run_pass(state: &AppState) -> Result<PassStats, IndexerError> {
    let mut stats = PassStats::default();
    let mut summaries: Vec<RunSummary> = Vec::new();

    for run_id in state.store.scan() {
        // The directory may vanish at any moment (concurrent delete).
        let Some(mut summary) = state.store.load(run_id) else {
            continue;
        };
        if should_reconcile(state, &summary) {
            if let Err(e) = reconcile(state, &mut summary) {
                warn!(run_id = %run_id, error = %e, "failed to reconcile dead run");
            } else {
                stats.reconciled += 1;
            }
        }
        summaries.push(summary);
    }

    if let Some(days) = state.config.run_remove_older_than_days {
        let cutoff = state.clock.now_utc() - chrono::Duration::days(days as i64);
        summaries.retain(|summary| {
            let expired = summary.start_time.is_some_and(|t| t < cutoff);
            if expired {
                match state.store.remove_dir(summary.run_id) {
                    Ok(()) => {
                        info!(run_id = %summary.run_id, "removed expired run directory");
                        stats.removed += 1;
                    }
                    Err(e) => warn!(run_id = %summary.run_id, error = %e, "failed to remove expired run"),
                }
            }
            !expired
        });
    }

    stats.runs = summaries.len();
    state.index.rebuild(&summaries)?;
    Ok(stats)
}

/// A run needs reconciliation when it claims to be live but its
/// supervisor process is gone.
fn should_reconcile(state: &AppState, summary: &RunSummary) -> bool {
    if summary.state.is_terminal() || summary.state == State::Deleting {
        return false;
    }
    match summary.pid {
        Some(pid) => !pid_alive(pid),
        None => {
            // No PID recorded: dead unless the run was created moments
            // ago and the fork is still in flight.
            let dir = state.store.run_dir(summary.run_id);
            let age = std::fs::metadata(dir.path())
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok());
            age.is_none_or(|age| age > RECONCILE_GRACE)
        }
    }
}

fn reconcile(state: &AppState, summary: &mut RunSummary) -> Result<(), IndexerError> {
    let run_id = summary.run_id;
    let now = state.clock.now_utc();

    if summary.exit_code.is_none() {
        state
            .store
            .write_text(run_id, layout::EXIT_CODE_TXT, "1\n")?;
        summary.exit_code = Some(1);
    }
    if summary.end_time.is_none() {
        state
            .store
            .write_text(run_id, layout::END_TIME_TXT, &to_rfc3339_utc(now))?;
        summary.end_time = Some(now);
    }
    state.store.append_system_log(
        run_id,
        "supervisor process no longer exists; marked SYSTEM_ERROR",
        now,
    )?;
    state.store.write_state(run_id, State::SystemError)?;
    summary.state = State::SystemError;
    info!(run_id = %run_id, "reconciled dead run to SYSTEM_ERROR");
    Ok(())
}

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
