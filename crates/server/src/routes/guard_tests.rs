// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use crate::service::test_support::{create_run, state_in};

#[test]
fn parse_run_id_rejects_garbage() {
    assert!(parse_run_id("11111111-1111-4111-8111-111111111111").is_ok());
    assert!(parse_run_id("../../etc").is_err());
    assert!(parse_run_id("").is_err());
}

#[test]
fn owner_match_allows_and_mismatch_forbids() {
    assert!(check_owner(Some("alice"), Some("alice")).is_ok());
    assert!(check_owner(None, Some("alice")).is_ok());
    assert!(check_owner(Some("alice"), None).is_ok());

    let err = check_owner(Some("mallory"), Some("alice")).unwrap_err();
    assert_eq!(err.kind.status_code(), 403);
    assert_eq!(err.msg, "forbidden");
}

#[tokio::test]
async fn missing_run_is_403_when_authenticated_404_otherwise() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let ghost = RunId::new();

    let err = load_owned(&state, Some("alice"), ghost).unwrap_err();
    assert_eq!(err.kind.status_code(), 403);
    assert_eq!(err.msg, "forbidden");

    let err = load_owned(&state, None, ghost).unwrap_err();
    assert_eq!(err.kind.status_code(), 404);
}

#[tokio::test]
async fn load_owned_enforces_ownership() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let run_id = create_run(&state, Some("alice"));

    assert!(load_owned(&state, Some("alice"), run_id).is_ok());
    assert!(load_owned(&state, None, run_id).is_ok());

    // A non-owner gets the same 403 as for a nonexistent run.
    let mismatch = load_owned(&state, Some("mallory"), run_id).unwrap_err();
    let ghost = load_owned(&state, Some("mallory"), RunId::new()).unwrap_err();
    assert_eq!(mismatch.msg, ghost.msg);
    assert_eq!(mismatch.kind.status_code(), ghost.kind.status_code());
}
