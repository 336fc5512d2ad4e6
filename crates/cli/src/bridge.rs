// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Post-run helpers invoked by the dispatcher.
//!
//! Both run inside an existing run directory after the engine exits:
//! `outputs` rebuilds the `outputs.json` manifest, `ro-crate` writes
//! the provenance metadata. RO-Crate generation is non-fatal by
//! contract: any failure is recorded as `{"@error": "<reason>"}` so
//! readers can distinguish "absent" from "failed".

use anyhow::Context;
use sapporo_core::{FileObject, RunRequest};
use sapporo_server::ServerConfig;
use sapporo_storage::layout;
use serde_json::{json, Value};
use std::path::Path;

/// Walk `outputs/` and write the `outputs.json` manifest.
pub fn write_outputs_manifest(run_dir: &Path) -> anyhow::Result<()> {
    let run_id = run_dir_name(run_dir)?;
    let outputs_dir = run_dir.join(layout::OUTPUTS_DIR);
    let base_url = read_base_url(run_dir);

    let manifest: Vec<FileObject> = layout::walk_outputs(&outputs_dir)
        .into_iter()
        .map(|rel| FileObject {
            file_url: match &base_url {
                Some(base) => format!("{base}/runs/{run_id}/outputs/{rel}"),
                None => format!("outputs/{rel}"),
            },
            file_name: rel,
        })
        .collect();

    let path = run_dir.join(layout::OUTPUTS_JSON);
    std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(files = manifest.len(), "wrote outputs manifest");
    Ok(())
}

/// Generate `ro-crate-metadata.json`. Never fails the dispatcher.
pub fn write_ro_crate(run_dir: &Path) -> anyhow::Result<()> {
    let path = run_dir.join(layout::RO_CRATE_METADATA_JSON);
    let document = match build_ro_crate(run_dir) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(error = %e, "ro-crate generation failed");
            json!({ "@error": e.to_string() })
        }
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&document)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn build_ro_crate(run_dir: &Path) -> anyhow::Result<Value> {
    let run_id = run_dir_name(run_dir)?;
    let request: RunRequest = {
        let raw = std::fs::read_to_string(run_dir.join(layout::RUN_REQUEST_JSON))
            .context("reading run_request.json")?;
        serde_json::from_str(&raw).context("parsing run_request.json")?
    };

    let read_trimmed = |name: &str| {
        std::fs::read_to_string(run_dir.join(name))
            .ok()
            .map(|s| s.trim().to_string())
    };
    let start_time = read_trimmed(layout::START_TIME_TXT);
    let end_time = read_trimmed(layout::END_TIME_TXT);
    let exit_code = read_trimmed(layout::EXIT_CODE_TXT).and_then(|s| s.parse::<i32>().ok());
    let cmd = read_trimmed(layout::CMD_TXT);

    let outputs = layout::walk_outputs(&run_dir.join(layout::OUTPUTS_DIR));
    let output_refs: Vec<Value> = outputs
        .iter()
        .map(|rel| json!({ "@id": format!("outputs/{rel}") }))
        .collect();
    let output_entities: Vec<Value> = outputs
        .iter()
        .map(|rel| {
            let size = std::fs::metadata(run_dir.join(layout::OUTPUTS_DIR).join(rel))
                .map(|m| m.len())
                .unwrap_or(0);
            json!({
                "@id": format!("outputs/{rel}"),
                "@type": "File",
                "name": rel,
                "contentSize": size,
            })
        })
        .collect();

    let mut graph = vec![
        json!({
            "@id": "ro-crate-metadata.json",
            "@type": "CreativeWork",
            "conformsTo": { "@id": "https://w3id.org/ro/crate/1.1" },
            "about": { "@id": "./" },
        }),
        json!({
            "@id": "./",
            "@type": "Dataset",
            "name": format!("sapporo run {run_id}"),
            "hasPart": output_refs,
            "mentions": { "@id": "#run" },
        }),
        json!({
            "@id": "#run",
            "@type": "CreateAction",
            "name": request.workflow_url,
            "startTime": start_time,
            "endTime": end_time,
            "exitCode": exit_code,
            "instrument": { "@id": "#workflow-engine" },
            "object": { "@id": "exe/workflow_params.json" },
            "result": outputs
                .iter()
                .map(|rel| json!({ "@id": format!("outputs/{rel}") }))
                .collect::<Vec<_>>(),
        }),
        json!({
            "@id": "#workflow-engine",
            "@type": "SoftwareApplication",
            "name": request.workflow_engine.to_string(),
            "softwareVersion": request.workflow_engine_version,
            "description": cmd,
        }),
        json!({
            "@id": "exe/workflow_params.json",
            "@type": "File",
            "name": "workflow parameters",
        }),
    ];
    graph.extend(output_entities);

    Ok(json!({
        "@context": "https://w3id.org/ro/crate/1.1/context",
        "@graph": graph,
    }))
}

/// The run ID is the directory name; the helper only ever runs inside
/// a run directory the service created.
fn run_dir_name(run_dir: &Path) -> anyhow::Result<String> {
    run_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow::anyhow!("not a run directory: {}", run_dir.display()))
}

/// Links in the manifest use the base URL the run was submitted under,
/// captured in `sapporo_config.json`.
fn read_base_url(run_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(run_dir.join(layout::SAPPORO_CONFIG_JSON)).ok()?;
    let config: ServerConfig = serde_json::from_str(&raw).ok()?;
    Some(config.effective_base_url())
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
