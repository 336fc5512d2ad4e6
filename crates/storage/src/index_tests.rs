// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use chrono::TimeZone;
use sapporo_core::{RunRequest, WorkflowEngine, WorkflowType};

fn summary(
    id: &str,
    state: State,
    start_hour: Option<u32>,
    username: Option<&str>,
    tags: &[(&str, &str)],
) -> RunSummary {
    RunSummary {
        run_id: id.parse().unwrap(),
        state,
        start_time: start_hour
            .map(|h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).single().unwrap()),
        end_time: None,
        exit_code: None,
        username: username.map(String::from),
        request: Some(RunRequest {
            workflow_type: WorkflowType::Cwl,
            workflow_type_version: "v1.2".to_string(),
            workflow_url: "https://example.com/wf.cwl".to_string(),
            workflow_engine: WorkflowEngine::Cwltool,
            workflow_engine_version: None,
            workflow_params: None,
            workflow_engine_parameters: Default::default(),
            workflow_attachment_obj: vec![],
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }),
        pid: None,
    }
}

const ID1: &str = "11111111-1111-4111-8111-111111111111";
const ID2: &str = "22222222-2222-4222-8222-222222222222";
const ID3: &str = "33333333-3333-4333-8333-333333333333";

fn three_run_index(dir: &std::path::Path) -> Index {
    let index = Index::new(dir.join("sapporo.db"));
    index
        .rebuild(&[
            summary(ID1, State::Complete, Some(1), Some("alice"), &[("env", "prod")]),
            summary(ID2, State::Running, Some(2), Some("alice"), &[("env", "test")]),
            summary(ID3, State::Queued, Some(3), Some("bob"), &[]),
        ])
        .unwrap();
    index
}

#[test]
fn query_sorts_by_start_time() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    let asc = index
        .query(&RunFilter {
            sort_order: SortOrder::Asc,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(asc.total, 3);
    let ids: Vec<String> = asc.runs.iter().map(|r| r.run_id.to_string()).collect();
    assert_eq!(ids, vec![ID1, ID2, ID3]);

    let desc = index.query(&RunFilter::default()).unwrap();
    let ids: Vec<String> = desc.runs.iter().map(|r| r.run_id.to_string()).collect();
    assert_eq!(ids, vec![ID3, ID2, ID1]);
}

#[test]
fn query_filters_by_state() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    let page = index
        .query(&RunFilter {
            state: Some(State::Running),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.runs[0].run_id.to_string(), ID2);
}

#[test]
fn query_filters_by_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    let page = index
        .query(&RunFilter {
            tags: vec![("env".to_string(), "prod".to_string())],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.runs[0].run_id.to_string(), ID1);

    // A tag that matches nothing.
    let page = index
        .query(&RunFilter {
            tags: vec![("env".to_string(), "staging".to_string())],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn query_filters_by_username_and_run_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    let page = index
        .query(&RunFilter {
            username: Some("alice".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 2);

    // run_ids AND username.
    let page = index
        .query(&RunFilter {
            username: Some("alice".to_string()),
            run_ids: Some(vec![ID1.parse().unwrap(), ID3.parse().unwrap()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.runs[0].run_id.to_string(), ID1);
}

#[test]
fn pagination_walks_all_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    let first = index
        .query(&RunFilter {
            sort_order: SortOrder::Asc,
            page_size: 2,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(first.runs.len(), 2);
    assert_eq!(first.total, 3);
    assert_eq!(first.next_offset, Some(2));

    let second = index
        .query(&RunFilter {
            sort_order: SortOrder::Asc,
            page_size: 2,
            offset: 2,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(second.runs.len(), 1);
    assert_eq!(second.next_offset, None);
    assert_eq!(second.runs[0].run_id.to_string(), ID3);
}

#[test]
fn missing_snapshot_is_empty_not_error() {
    let tmp = tempfile::tempdir().unwrap();
    let index = Index::new(tmp.path().join("sapporo.db"));
    let page = index.query(&RunFilter::default()).unwrap();
    assert_eq!(page.total, 0);
    assert!(page.runs.is_empty());
}

#[test]
fn tombstones_survive_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    index.mark_deleted(ID2.parse().unwrap()).unwrap();
    let page = index
        .query(&RunFilter {
            run_ids: Some(vec![ID2.parse().unwrap()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.runs[0].state, State::Deleted);

    // The run directory is gone from disk; a rebuild keeps the tombstone.
    index
        .rebuild(&[summary(ID1, State::Complete, Some(1), None, &[])])
        .unwrap();
    let page = index
        .query(&RunFilter {
            run_ids: Some(vec![ID2.parse().unwrap()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.runs[0].state, State::Deleted);
}

#[test]
fn rebuild_replaces_stale_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());

    index
        .rebuild(&[
            summary(ID1, State::Complete, Some(1), None, &[]),
            summary(ID2, State::Complete, Some(2), None, &[]),
        ])
        .unwrap();
    let page = index.query(&RunFilter::default()).unwrap();
    assert_eq!(page.total, 2);
    assert!(page.runs.iter().all(|r| r.state == State::Complete));
}

#[test]
fn count_by_state_groups() {
    let tmp = tempfile::tempdir().unwrap();
    let index = three_run_index(tmp.path());
    let counts = index.count_by_state().unwrap();
    assert_eq!(counts.get("COMPLETE"), Some(&1));
    assert_eq!(counts.get("RUNNING"), Some(&1));
    assert_eq!(counts.get("QUEUED"), Some(&1));
}
