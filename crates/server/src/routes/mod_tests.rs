// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

use super::*;
use crate::auth::{hash_password, Authenticator, LocalAuth};
use crate::indexer;
use crate::service::test_support::{install_run_sh, state_in, state_with};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use sapporo_core::auth::{AuthUser, LocalAuthConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn minimal_run_body() -> Value {
    json!({
        "workflow_type": "CWL",
        "workflow_type_version": "v1.2",
        "workflow_engine": "cwltool",
        "workflow_url": "https://example.com/wf.cwl",
        "workflow_params": {"threads": 2},
        "tags": {"env": "prod"},
    })
}

#[tokio::test]
async fn service_info_includes_state_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let router = router(state);

    let (status, body) = send(&router, get("/service-info")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["workflow_type_versions"]["CWL"].is_object());
    assert!(body["system_state_counts"].is_object());
    assert_eq!(body["auth_enabled"], json!(false));
}

#[tokio::test]
async fn tasks_endpoints_are_unsupported() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router(state_in(tmp.path()));
    let id = "11111111-1111-4111-8111-111111111111";

    let (status, body) = send(&router, get(&format!("/runs/{id}/tasks"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"msg": "unsupported in this implementation", "status_code": 400})
    );

    let (status, _) = send(&router, get(&format!("/runs/{id}/tasks/t1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_then_read_round_trips_request() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    let (status, body) = send(&router, post_json("/runs", minimal_run_body())).await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, detail) = send(&router, get(&format!("/runs/{run_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["request"]["workflow_type"], "CWL");
    assert_eq!(detail["request"]["workflow_url"], "https://example.com/wf.cwl");
    assert_eq!(detail["request"]["workflow_params"], json!({"threads": 2}));
    assert_eq!(detail["request"]["tags"]["env"], "prod");
    assert_eq!(detail["task_logs"], Value::Null);

    let (status, status_body) =
        send(&router, get(&format!("/runs/{run_id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["run_id"], run_id.as_str());
    assert!(status_body["state"].is_string());
}

#[tokio::test]
async fn listing_reflects_snapshot_with_ordering_and_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    let mut body = minimal_run_body();
    body["tags"] = json!({"env": "prod"});
    send(&router, post_json("/runs", body)).await;
    let mut body = minimal_run_body();
    body["tags"] = json!({"env": "test"});
    send(&router, post_json("/runs", body)).await;

    // Listing is served from the snapshot: empty until a pass runs.
    let (_, before) = send(&router, get("/runs")).await;
    assert_eq!(before["total_runs"], 0);

    indexer::run_pass(&state).unwrap();

    let (status, listing) = send(&router, get("/runs?sort_order=asc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total_runs"], 2);
    assert_eq!(listing["runs"].as_array().unwrap().len(), 2);
    assert_eq!(listing["next_page_token"], "");

    let (_, filtered) = send(&router, get("/runs?tags=env:prod")).await;
    assert_eq!(filtered["total_runs"], 1);
    assert_eq!(filtered["runs"][0]["tags"]["env"], "prod");

    let (_, by_state) = send(&router, get("/runs?state=COMPLETE")).await;
    assert_eq!(by_state["total_runs"], 0);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    let (_, body) = send(&router, post_json("/runs", minimal_run_body())).await;
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/runs/{run_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get(&format!("/runs/{run_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The tombstone shows up in the listing after the next pass.
    indexer::run_pass(&state).unwrap();
    let (_, listing) = send(&router, get(&format!("/runs?run_ids={run_id}"))).await;
    assert_eq!(listing["runs"][0]["state"], "DELETED");
}

#[tokio::test]
async fn bulk_delete_requires_run_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let router = router(state_in(tmp.path()));
    let delete = Request::builder()
        .method("DELETE")
        .uri("/runs")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, delete).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().contains("run_ids"));
}

#[tokio::test]
async fn whitelist_rejection_matches_wire_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut service = Arc::try_unwrap(state).unwrap_or_else(|_| unreachable!());
    service.executable_workflows = vec!["https://ex/wf.cwl".to_string()];
    let router = router(Arc::new(service));

    let mut body = minimal_run_body();
    body["workflow_url"] = json!("https://ex/other.cwl");
    let (status, body) = send(&router, post_json("/runs", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"msg": "workflow_url not in executable workflows", "status_code": 400})
    );
}

fn local_auth_state(dir: &std::path::Path) -> AppState {
    let config = LocalAuthConfig {
        secret_key: "9f2k:Qx7!mW3zR8@bN5vL1cT6yU4eH0s".to_string(),
        expires_delta_hours: Some(2),
        users: vec![
            AuthUser {
                username: "u1".to_string(),
                password_hash: hash_password("pw-one").unwrap(),
            },
            AuthUser {
                username: "u2".to_string(),
                password_hash: hash_password("pw-two").unwrap(),
            },
        ],
    };
    state_with(dir, Authenticator::Local(LocalAuth::new(config, false).unwrap()))
}

fn multipart_credentials(username: &str, password: &str) -> Request<Body> {
    let body = format!(
        "--B\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\n{username}\r\n\
         --B\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\n{password}\r\n\
         --B--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/token")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=B")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn token_flow_and_ownership() {
    let tmp = tempfile::tempdir().unwrap();
    let state = local_auth_state(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    // Unauthenticated requests are rejected outright.
    let (status, _) = send(&router, get("/runs")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, token1) = send(&router, multipart_credentials("u1", "pw-one")).await;
    assert_eq!(status, StatusCode::OK);
    let token1 = token1["access_token"].as_str().unwrap().to_string();
    let (_, token2) = send(&router, multipart_credentials("u2", "pw-two")).await;
    let token2 = token2["access_token"].as_str().unwrap().to_string();

    let (status, me) = send(&router, get_as("/me", &token1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, json!({"username": "u1"}));

    // u1 creates a run; u2 must get an opaque 403.
    let mut submit = post_json("/runs", minimal_run_body());
    submit.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token1}").parse().unwrap(),
    );
    let (status, body) = send(&router, submit).await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, _) = send(&router, get_as(&format!("/runs/{run_id}"), &token1)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, get_as(&format!("/runs/{run_id}"), &token2)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"msg": "forbidden", "status_code": 403}));

    let (status, _) = send(&router, multipart_credentials("u1", "wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn outputs_listing_and_download() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    let (_, body) = send(&router, post_json("/runs", minimal_run_body())).await;
    let run_id: sapporo_core::RunId = body["run_id"].as_str().unwrap().parse().unwrap();

    let outputs_dir = state.store.run_dir(run_id).outputs_dir();
    std::fs::write(outputs_dir.join("result.txt"), b"done").unwrap();

    let (status, listing) = send(&router, get(&format!("/runs/{run_id}/outputs"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["outputs"][0]["file_name"], "result.txt");
    let url = listing["outputs"][0]["file_url"].as_str().unwrap();
    assert!(url.ends_with(&format!("/runs/{run_id}/outputs/result.txt")));

    let response = router
        .clone()
        .oneshot(get(&format!("/runs/{run_id}/outputs/result.txt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"done");

    // Path escapes are rejected before touching the filesystem.
    let (status, _) = send(
        &router,
        get(&format!("/runs/{run_id}/outputs/..%2Frun_request.json")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = router
        .clone()
        .oneshot(get(&format!("/runs/{run_id}/outputs?download=true")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );
}

#[tokio::test]
async fn ro_crate_absent_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    install_run_sh(&state, "exit 0");
    let router = router(state.clone());

    let (_, body) = send(&router, post_json("/runs", minimal_run_body())).await;
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, _) = send(&router, get(&format!("/runs/{run_id}/ro-crate"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let run_id: sapporo_core::RunId = run_id.parse().unwrap();
    state
        .store
        .write_text(
            run_id,
            sapporo_storage::layout::RO_CRATE_METADATA_JSON,
            r#"{"@context": "https://w3id.org/ro/crate/1.1/context"}"#,
        )
        .unwrap();
    let (status, body) = send(&router, get(&format!("/runs/{run_id}/ro-crate"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["@context"], "https://w3id.org/ro/crate/1.1/context");
}

#[tokio::test]
async fn url_prefix_nests_the_surface() {
    let tmp = tempfile::tempdir().unwrap();
    let state = state_in(tmp.path());
    let mut service = Arc::try_unwrap(state).unwrap_or_else(|_| unreachable!());
    service.config.url_prefix = Some("/ga4gh/wes/v1".to_string());
    let router = router(Arc::new(service));

    let (status, _) = send(&router, get("/service-info")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get("/ga4gh/wes/v1/service-info")).await;
    assert_eq!(status, StatusCode::OK);
}
