// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;

#[test]
fn run_id_is_hyphenated_uuid() {
    let id = RunId::new();
    let s = id.to_string();
    assert_eq!(s.len(), 36);
    assert_eq!(s.matches('-').count(), 4);
    assert_eq!(s, s.to_lowercase());
}

#[test]
fn run_id_round_trips() {
    let id = RunId::new();
    let parsed = RunId::parse(&id.to_string()).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn shard_is_first_two_chars() {
    let id = RunId::parse("a3f1c2d4-0000-4000-8000-000000000000").unwrap();
    assert_eq!(id.shard(), "a3");
}

#[test]
fn rejects_uppercase() {
    assert!(RunId::parse("A3F1C2D4-0000-4000-8000-000000000000").is_err());
}

#[test]
fn rejects_garbage() {
    assert!(RunId::parse("not-a-uuid").is_err());
    assert!(RunId::parse("").is_err());
    assert!(RunId::parse("../../etc/passwd").is_err());
}

#[test]
fn run_id_serde() {
    let id = RunId::parse("a3f1c2d4-0000-4000-8000-000000000000").unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"a3f1c2d4-0000-4000-8000-000000000000\"");

    let parsed: RunId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
