// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use crate::request::{WorkflowEngine, WorkflowType};
use std::collections::BTreeMap;

fn summary_with_tags(tags: &[(&str, &str)]) -> RunSummary {
    RunSummary {
        run_id: RunId::new(),
        state: State::Complete,
        start_time: None,
        end_time: None,
        exit_code: Some(0),
        username: None,
        request: Some(RunRequest {
            workflow_type: WorkflowType::Cwl,
            workflow_type_version: "v1.2".to_string(),
            workflow_url: "https://example.com/wf.cwl".to_string(),
            workflow_engine: WorkflowEngine::Cwltool,
            workflow_engine_version: None,
            workflow_params: None,
            workflow_engine_parameters: BTreeMap::new(),
            workflow_attachment_obj: vec![],
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }),
        pid: None,
    }
}

#[test]
fn tag_matching() {
    let summary = summary_with_tags(&[("env", "prod"), ("team", "genomics")]);
    assert!(summary.has_tag("env", "prod"));
    assert!(summary.has_tag("team", "genomics"));
    assert!(!summary.has_tag("env", "test"));
    assert!(!summary.has_tag("missing", "prod"));
}

#[test]
fn no_request_means_no_tags() {
    let summary = RunSummary {
        run_id: RunId::new(),
        state: State::Unknown,
        start_time: None,
        end_time: None,
        exit_code: None,
        username: None,
        request: None,
        pid: None,
    };
    assert_eq!(summary.tags().count(), 0);
    assert!(!summary.has_tag("env", "prod"));
}
