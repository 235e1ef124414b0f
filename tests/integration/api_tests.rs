//! Integration tests for the HTTP control surface
//!
//! Each test binds the router on an ephemeral port and drives it with a
//! real HTTP client; crawl targets are wiremock servers.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::Config;
use sumi_harvest::embedding::HashingEmbedder;
use sumi_harvest::storage::{SqliteStore, Storage};
use sumi_harvest::Scheduler;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts the control surface and returns its address
async fn start_api() -> SocketAddr {
    let mut config = Config::default();
    config.crawler.concurrency = 2;
    config.crawler.idle_backoff_ms = 5;
    config.crawler.max_idle_backoff_ms = 20;
    config.transport.timeout_secs = 5;

    let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
    let scheduler = Arc::new(
        Scheduler::build(&config, store, Arc::new(HashingEmbedder::new(8))).unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(sumi_harvest::server::serve_listener(
        listener,
        scheduler,
        std::future::pending(),
    ));
    addr
}

/// Mounts a two-page site
async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                r#"<html><body><a href="/next">next</a></body></html>"#,
                "text/html",
            ),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body><p>the end</p></body></html>", "text/html"),
        )
        .mount(server)
        .await;
}

async fn post_crawl(addr: SocketAddr, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/crawl", addr))
        .json(&body)
        .send()
        .await
        .unwrap()
}

/// Polls `GET /jobs/:id` until the job reaches a terminal status
async fn wait_for_job(addr: SocketAddr, id: &str) -> Value {
    let url = format!("http://{}/jobs/{}", addr, id);
    for _ in 0..200 {
        let job: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        if matches!(
            job["status"].as_str(),
            Some("completed" | "failed" | "cancelled")
        ) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish", id);
}

#[tokio::test]
async fn test_health() {
    let addr = start_api().await;
    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_start_crawl_and_poll_job() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;
    let addr = start_api().await;

    let response = post_crawl(
        addr,
        json!({ "seeds": [format!("{}/", mock_server.uri())], "max_pages": 5 }),
    )
    .await;
    assert_eq!(response.status(), 202);

    let started: Value = response.json().await.unwrap();
    assert_eq!(started["status"], "pending");
    assert_eq!(started["max_pages"], 5);
    assert_eq!(started["dry_run"], false);
    assert_eq!(started["queued"], 1);
    assert!(started["created_at"].is_string());

    let id = started["job_id"].as_str().unwrap().to_string();
    let job = wait_for_job(addr, &id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["stats"]["fetched"], 2);
    assert_eq!(job["stats"]["errors"], 0);

    let stats: Value = reqwest::get(format!("http://{}/corpus/stats", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["pages"], 2);
    assert!(stats["bytes"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_camel_case_fields_accepted() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;
    let addr = start_api().await;

    let response = post_crawl(
        addr,
        json!({ "seeds": [mock_server.uri()], "maxPages": 1, "dryRun": true }),
    )
    .await;
    assert_eq!(response.status(), 202);

    let started: Value = response.json().await.unwrap();
    assert_eq!(started["max_pages"], 1);
    assert_eq!(started["dry_run"], true);

    let job = wait_for_job(addr, started["job_id"].as_str().unwrap()).await;
    assert_eq!(job["stats"]["fetched"], 1);
}

#[tokio::test]
async fn test_seeds_required() {
    let addr = start_api().await;

    for body in [json!({}), json!({ "seeds": [] }), json!({ "seeds": ["   "] })] {
        let response = post_crawl(addr, body).await;
        assert_eq!(response.status(), 400);

        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "seeds_required");
        assert!(error["message"].is_string());
    }
}

#[tokio::test]
async fn test_invalid_seed_and_budget() {
    let addr = start_api().await;

    let response = post_crawl(addr, json!({ "seeds": ["ftp://example.com/"] })).await;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "invalid_seed");

    let response = post_crawl(
        addr,
        json!({ "seeds": ["https://example.com/"], "max_pages": 0 }),
    )
    .await;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "invalid_max_pages");
}

#[tokio::test]
async fn test_malformed_body() {
    let addr = start_api().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/crawl", addr))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "invalid_body");
}

#[tokio::test]
async fn test_validate_only_creates_no_job() {
    let addr = start_api().await;

    let response = post_crawl(
        addr,
        json!({
            "seeds": ["HTTPS://Example.COM:443/a/../b#frag", "https://docs.example.com"],
            "validate_only": true
        }),
    )
    .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(
        body["seeds"],
        json!(["https://example.com/b", "https://docs.example.com/"])
    );
    assert_eq!(body["allowed_hosts"], json!(["docs.example.com", "example.com"]));
    assert!(body.get("job_id").is_none());
}

#[tokio::test]
async fn test_unknown_job() {
    let addr = start_api().await;

    for id in [uuid::Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let response = reqwest::get(format!("http://{}/jobs/{}", addr, id))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "job_not_found");
    }
}
