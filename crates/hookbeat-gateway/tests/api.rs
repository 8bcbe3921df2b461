//! API round-trips over a real listener.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use hookbeat_core::HookbeatConfig;
use hookbeat_gateway::app::{build_router, AppState};
use hookbeat_scheduler::SchedulerEngine;
use hookbeat_storage::Repository;

/// Boot the full app (in-memory DB, engine started) on an ephemeral port.
async fn spawn_app() -> (String, Repository) {
    let repo = Repository::open_in_memory().unwrap();
    let scheduler = Arc::new(SchedulerEngine::new(repo.clone()));
    scheduler.start().await.unwrap();

    let state = Arc::new(AppState {
        config: HookbeatConfig::default(),
        repo: repo.clone(),
        scheduler,
    });
    let router = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    (format!("http://{addr}"), repo)
}

/// Minimal dispatch target: always answers 200 "ok".
async fn spawn_target() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut head = Vec::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, _repo) = spawn_app().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs_armed"], 0);
}

#[tokio::test]
async fn create_list_run_logs_round_trip() {
    let (base, _repo) = spawn_app().await;
    let target = spawn_target().await;
    let client = reqwest::Client::new();

    // create
    let created: Value = client
        .post(format!("{base}/api/jobs"))
        .json(&json!({
            "name": "ping",
            "cron_expr": "0 0 9 * * *",
            "url": target,
            "method": "GET",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(created["scheduling_error"].is_null());
    let id = created["job"]["id"].as_i64().unwrap();
    assert!(created["job"]["next_run_at"].is_string());

    // list
    let listed: Value = client
        .get(format!("{base}/api/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);

    // run now
    let run = client
        .post(format!("{base}/api/jobs/{id}/run"))
        .send()
        .await
        .unwrap();
    assert_eq!(run.status().as_u16(), 202);

    tokio::time::sleep(Duration::from_millis(500)).await;

    // logs
    let logs: Value = client
        .get(format!("{base}/api/jobs/{id}/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let logs = logs["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "SUCCESS");
    assert_eq!(logs[0]["http_code"], 200);
}

#[tokio::test]
async fn toggle_pauses_and_clears_next_run() {
    let (base, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{base}/api/jobs"))
        .json(&json!({
            "name": "pausable",
            "cron_expr": "0 0 9 * * *",
            "url": "http://127.0.0.1:1/",
            "method": "GET",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["job"]["id"].as_i64().unwrap();

    let toggled: Value = client
        .post(format!("{base}/api/jobs/{id}/toggle"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["job"]["is_active"], false);
    assert!(toggled["job"]["next_run_at"].is_null());
}

#[tokio::test]
async fn invalid_expression_is_saved_but_reported() {
    let (base, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/api/jobs"))
        .json(&json!({
            "name": "broken",
            "cron_expr": "every tuesday",
            "url": "http://127.0.0.1:1/",
            "method": "GET",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);
    let body: Value = created.json().await.unwrap();
    assert!(body["scheduling_error"].is_string());
    assert!(body["job"]["next_run_at"].is_null());
}

#[tokio::test]
async fn unknown_ids_return_not_found() {
    let (base, _repo) = spawn_app().await;
    let client = reqwest::Client::new();

    for (method, path) in [
        ("GET", format!("{base}/api/jobs/999")),
        ("POST", format!("{base}/api/jobs/999/run")),
        ("POST", format!("{base}/api/jobs/999/toggle")),
        ("DELETE", format!("{base}/api/jobs/999")),
        ("GET", format!("{base}/api/jobs/999/logs")),
    ] {
        let request = match method {
            "GET" => client.get(&path),
            "POST" => client.post(&path),
            _ => client.delete(&path),
        };
        let status = request.send().await.unwrap().status().as_u16();
        assert_eq!(status, 404, "{method} {path}");
    }
}
