// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use crate::config::{default_service_info, ServerConfig};
use crate::service::test_support::{create_run, state_in};
use crate::service::{AppState, Service};
use sapporo_core::SystemClock;
use sapporo_storage::{Index, RunFilter, RunStore};
use std::sync::Arc;

/// State with age-based cleanup switched on.
fn state_with_cleanup(dir: &std::path::Path, days: u64) -> AppState {
    let run_dir = dir.join("runs");
    let store = RunStore::open(&run_dir).unwrap();
    let index = Index::new(store.index_db_path());
    Arc::new(Service {
        config: ServerConfig {
            run_dir,
            run_sh: dir.join("run.sh"),
            run_remove_older_than_days: Some(days),
            ..Default::default()
        },
        store,
        index,
        auth: crate::auth::Authenticator::Disabled,
        service_info: default_service_info(),
        executable_workflows: Vec::new(),
        http: Service::build_http_client(),
        clock: SystemClock,
    })
}

#[tokio::test]
async fn pass_rebuilds_snapshot_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    create_run(&state, None);
    create_run(&state, Some("alice"));

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.runs, 2);

    let page = state.index.query(&RunFilter::default()).unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn dead_run_is_reconciled_to_system_error() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let run_id = create_run(&state, None);
    state.store.write_pid(run_id, 99_999_999).unwrap();
    state.store.write_state(run_id, State::Initializing).unwrap();
    state.store.write_state(run_id, State::Running).unwrap();

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.reconciled, 1);

    assert_eq!(state.store.read_state(run_id), Some(State::SystemError));
    assert_eq!(
        state
            .store
            .read_text(run_id, layout::EXIT_CODE_TXT)
            .map(|s| s.trim().to_string()),
        Some("1".to_string())
    );
    let logs = state.store.read_text(run_id, layout::SYSTEM_LOGS_JSON).unwrap();
    assert!(logs.contains("SYSTEM_ERROR"));

    // The rebuilt snapshot reflects the reconciled state.
    let page = state.index.query(&RunFilter::default()).unwrap();
    assert_eq!(page.runs[0].state, State::SystemError);
}

#[tokio::test]
async fn fresh_queued_run_without_pid_is_left_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let run_id = create_run(&state, None);

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.reconciled, 0);
    assert_eq!(state.store.read_state(run_id), Some(State::Queued));
}

#[tokio::test]
async fn live_run_is_not_reconciled() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let run_id = create_run(&state, None);
    // Our own PID is definitely alive.
    state.store.write_pid(run_id, std::process::id() as i32).unwrap();
    state.store.write_state(run_id, State::Initializing).unwrap();

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.reconciled, 0);
    assert_eq!(state.store.read_state(run_id), Some(State::Initializing));
}

#[tokio::test]
async fn terminal_runs_are_never_reconciled() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let run_id = create_run(&state, None);
    state.store.write_pid(run_id, 99_999_999).unwrap();
    state.store.write_state(run_id, State::Initializing).unwrap();
    state.store.write_state(run_id, State::Running).unwrap();
    state.store.write_state(run_id, State::Complete).unwrap();

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.reconciled, 0);
    assert_eq!(state.store.read_state(run_id), Some(State::Complete));
}

#[tokio::test]
async fn expired_runs_are_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_with_cleanup(tmp.path(), 7);

    let old = create_run(&state, None);
    state
        .store
        .write_text(old, layout::START_TIME_TXT, "2020-01-01T00:00:00Z")
        .unwrap();
    mark_complete(&state, old);

    let recent = create_run(&state, None);
    let now = to_rfc3339_utc(chrono::Utc::now());
    state
        .store
        .write_text(recent, layout::START_TIME_TXT, &now)
        .unwrap();
    mark_complete(&state, recent);

    let stats = run_pass(&state).unwrap();
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.runs, 1);
    assert!(state.store.load(old).is_none());
    assert!(state.store.load(recent).is_some());

    let page = state.index.query(&RunFilter::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.runs[0].run_id, recent);
}

fn mark_complete(state: &AppState, run_id: sapporo_core::RunId) {
    state.store.write_pid(run_id, std::process::id() as i32).unwrap();
    state.store.write_state(run_id, State::Initializing).unwrap();
    state.store.write_state(run_id, State::Running).unwrap();
    state.store.write_state(run_id, State::Complete).unwrap();
}
