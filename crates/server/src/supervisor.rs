// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Dispatcher supervision.
//!
//! Each run forks the external dispatcher (`run.sh <run_dir>`) as a
//! detached child in its own process group, so signals aimed at the
//! HTTP process never reach in-flight engines. The dispatcher owns
//! timestamps, `exit_code.txt` and terminal state words (they must
//! survive this process dying); the supervisor only records the PID,
//! relays cooperative cancellation via SIGUSR1, and leaves a note when
//! the child exits.

use crate::error::ApiError;
use crate::service::AppState;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sapporo_core::{Clock, RunId, State};
use sapporo_storage::layout;
use sapporo_storage::StoreError;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use tracing::{info, warn};

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The run had already reached a terminal state; nothing to do.
    AlreadyTerminal,
    /// CANCELING was written and the dispatcher was signaled.
    Signaled { already_exited: bool },
}

/// Fork the dispatcher for a freshly created run.
///
/// Failures are never surfaced to the submitting client: the run is
/// marked SYSTEM_ERROR on disk and the cause lands in
/// `system_logs.json`, visible on the next status read.
pub async fn spawn_dispatcher(state: &AppState, run_id: RunId) {
    if let Err(e) = try_spawn(state, run_id).await {
        warn!(run_id = %run_id, error = %e, "failed to fork dispatcher");
        let now = state.clock.now_utc();
        let note = format!("failed to fork dispatcher: {e}");
        if let Err(log_err) = state.store.append_system_log(run_id, &note, now) {
            warn!(run_id = %run_id, error = %log_err, "could not record fork failure");
        }
        let _ = state.store.write_text(run_id, layout::EXIT_CODE_TXT, "1\n");
        let _ = state.store.write_text(
            run_id,
            layout::END_TIME_TXT,
            &sapporo_core::clock::to_rfc3339_utc(now),
        );
        if let Err(state_err) = state.store.write_state(run_id, State::SystemError) {
            warn!(run_id = %run_id, error = %state_err, "could not mark run SYSTEM_ERROR");
        }
    }
}

async fn try_spawn(state: &AppState, run_id: RunId) -> Result<(), SpawnError> {
    let dir = state.store.run_dir(run_id);
    let stdout = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.file(layout::STDOUT_LOG))?;
    let stderr = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.file(layout::STDERR_LOG))?;

    let mut command = std::process::Command::new(&state.config.run_sh);
    command
        .arg(dir.path())
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        // Own process group: a SIGINT/SIGTERM to the service must not
        // propagate to in-flight workflow engines.
        .process_group(0);

    let mut child = tokio::process::Command::from(command)
        .kill_on_drop(false)
        .spawn()?;

    let pid = child.id().ok_or(SpawnError::NoPid)? as i32;
    state.store.write_pid(run_id, pid)?;
    info!(run_id = %run_id, pid, "dispatcher forked");

    // From here the dispatcher drives the state file; INITIALIZING just
    // records that the fork happened. A cancel may already have won the
    // race, in which case the dispatcher observes CANCELING.
    if let Err(e) = state.store.write_state(run_id, State::Initializing) {
        match e {
            StoreError::StateConflict { .. } => {}
            other => return Err(other.into()),
        }
    }

    let wait_state = state.clone();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                info!(run_id = %run_id, %status, "dispatcher exited");
                let note = format!("dispatcher exited: {status}");
                let now = wait_state.clock.now_utc();
                if let Err(e) = wait_state.store.append_system_log(run_id, &note, now) {
                    // The run may have been deleted while in flight.
                    warn!(run_id = %run_id, error = %e, "could not record dispatcher exit");
                }
            }
            Err(e) => warn!(run_id = %run_id, error = %e, "failed to await dispatcher"),
        }
    });
    Ok(())
}

/// Handle `POST /runs/{id}/cancel`.
///
/// Writes CANCELING first, then signals the recorded PID with SIGUSR1.
/// If the dispatcher already finalized a terminal state the call is an
/// idempotent no-op; if the process is already gone the caller still
/// gets 200 with a flag and the next indexer pass reconciles.
pub fn request_cancel(state: &AppState, run_id: RunId) -> Result<CancelOutcome, ApiError> {
    let current = state
        .store
        .read_state(run_id)
        .ok_or_else(|| ApiError::not_found(format!("run not found: {run_id}")))?;

    if current.is_terminal() {
        return Ok(CancelOutcome::AlreadyTerminal);
    }
    if current == State::Canceling {
        return Err(ApiError::conflict("cancellation already in progress"));
    }

    match state.store.write_state(run_id, State::Canceling) {
        Ok(()) => {}
        // The dispatcher finalized a terminal state between our read
        // and the write; the cancel is a no-op, not a failure.
        Err(StoreError::StateConflict { from, .. }) if from.is_terminal() => {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        Err(e) => return Err(e.into()),
    }
    let now = state.clock.now_utc();
    let _ = state
        .store
        .append_system_log(run_id, "cancellation requested", now);

    let Some(pid) = state.store.read_pid(run_id) else {
        return Ok(CancelOutcome::Signaled {
            already_exited: true,
        });
    };
    match kill(Pid::from_raw(pid), Signal::SIGUSR1) {
        Ok(()) => {
            info!(run_id = %run_id, pid, "sent SIGUSR1 to dispatcher");
            Ok(CancelOutcome::Signaled {
                already_exited: false,
            })
        }
        Err(Errno::ESRCH) => Ok(CancelOutcome::Signaled {
            already_exited: true,
        }),
        Err(e) => Err(ApiError::internal(format!(
            "failed to signal dispatcher: {e}"
        ))),
    }
}

/// Probe whether a recorded PID still refers to a live process.
pub fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

#[derive(Debug, thiserror::Error)]
enum SpawnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("child reported no PID")]
    NoPid,
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
