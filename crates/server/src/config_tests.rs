// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;

#[test]
fn default_config_validates() {
    ServerConfig::default().validate().unwrap();
}

#[test]
fn snapshot_interval_zero_is_rejected() {
    let config = ServerConfig {
        snapshot_interval_min: 0,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OutOfRange { field: "snapshot-interval", .. })
    ));
}

#[test]
fn cleanup_days_zero_is_rejected() {
    let config = ServerConfig {
        run_remove_older_than_days: Some(0),
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn url_prefix_shape_is_checked() {
    let ok = ServerConfig {
        url_prefix: Some("/ga4gh/wes/v1".to_string()),
        ..Default::default()
    };
    ok.validate().unwrap();

    let bad = ServerConfig {
        url_prefix: Some("ga4gh/".to_string()),
        ..Default::default()
    };
    assert!(matches!(bad.validate(), Err(ConfigError::BadUrlPrefix(_))));
}

#[test]
fn effective_base_url_prefers_explicit() {
    let config = ServerConfig {
        base_url: Some("https://wes.example.com/".to_string()),
        ..Default::default()
    };
    assert_eq!(config.effective_base_url(), "https://wes.example.com");

    let derived = ServerConfig {
        url_prefix: Some("/wes".to_string()),
        ..Default::default()
    };
    assert_eq!(derived.effective_base_url(), "http://127.0.0.1:1122/wes");
}

#[test]
fn executable_workflows_default_is_unrestricted() {
    let workflows = ExecutableWorkflows::load(None).unwrap();
    assert!(workflows.workflows.is_empty());
}

#[test]
fn executable_workflows_rejects_relative_urls() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("workflows.json");
    std::fs::write(&path, r#"{"workflows": ["workflow.cwl"]}"#).unwrap();
    assert!(ExecutableWorkflows::load(Some(&path)).is_err());

    std::fs::write(&path, r#"{"workflows": ["https://ex/wf.cwl"]}"#).unwrap();
    let parsed = ExecutableWorkflows::load(Some(&path)).unwrap();
    assert_eq!(parsed.workflows, vec!["https://ex/wf.cwl"]);
}

#[test]
fn default_service_info_lists_all_engines() {
    let info = default_service_info();
    let engines = info["workflow_engine_versions"].as_object().unwrap();
    for engine in ["cwltool", "nextflow", "toil", "cromwell", "snakemake", "ep3", "streamflow"] {
        assert!(engines.contains_key(engine), "missing {engine}");
    }
}
