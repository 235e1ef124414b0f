//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and run full jobs
//! through the scheduler end-to-end.

use std::sync::Arc;
use sumi_harvest::config::Config;
use sumi_harvest::crawler::{JobStatus, ResourceMetadata, Scheduler};
use sumi_harvest::embedding::HashingEmbedder;
use sumi_harvest::storage::{SqliteStore, Storage};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration tuned for fast local runs
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.crawler.concurrency = 4;
    config.crawler.idle_backoff_ms = 5;
    config.crawler.max_idle_backoff_ms = 20;
    config.transport.timeout_secs = 5;
    config.storage.batch_size = 4;
    config.embeddings.batch_size = 2;
    config.embeddings.dimensions = 16;
    config
}

fn build_scheduler(config: &Config) -> Scheduler {
    let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory(config.storage.batch_size).unwrap());
    Scheduler::build(
        config,
        store,
        Arc::new(HashingEmbedder::new(config.embeddings.dimensions)),
    )
    .unwrap()
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

/// URL on the same server under a different hostname
fn other_host(server: &MockServer, p: &str) -> String {
    let port = Url::parse(&server.uri()).unwrap().port().unwrap();
    format!("http://localhost:{}{}", port, p)
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

/// Mounts `/` linking to one out-of-scope and two in-scope pages
async fn mount_budget_site(server: &MockServer) {
    mount_robots(server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><body>
                <a href="{}">Elsewhere</a>
                <a href="/one">One</a>
                <a href="/two">Two</a>
            </body></html>"#,
            other_host(server, "/outside")
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(html("<html><body><p>first page</p></body></html>"))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html("<html><body><p>second page</p></body></html>"))
        .expect(0)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/outside"))
        .respond_with(html("<p>out of scope</p>"))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_budget_limits_breadth_first_crawl() {
    let mock_server = MockServer::start().await;
    mount_budget_site(&mock_server).await;

    let scheduler = build_scheduler(&create_test_config());
    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed.clone()], Some(2), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.fetched, 2);
    assert_eq!(snapshot.stats.queued, 2, "seed plus the first in-scope link");
    assert_eq!(snapshot.stats.errors, 0);
    assert!(snapshot.finished_at.is_some());

    let pages = scheduler.store().pages_for_job(snapshot.id).unwrap();
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![seed.as_str(), &format!("{}/one", mock_server.uri())]);
    assert!(pages.iter().all(|p| p.status == 200 && p.content.is_some()));
    assert!(pages.iter().all(|p| p.content_hash.is_some()));

    let stored = scheduler.store().get_job(snapshot.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.stats.fetched, 2);
}

#[tokio::test]
async fn test_dry_run_stores_metadata_only() {
    let mock_server = MockServer::start().await;
    mount_budget_site(&mock_server).await;

    let mut config = create_test_config();
    config.embeddings.enabled = true;
    let scheduler = build_scheduler(&config);

    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed], Some(2), true).await.unwrap();

    assert_eq!(snapshot.stats.fetched, 2);
    assert!(snapshot.dry_run);

    let pages = scheduler.store().pages_for_job(snapshot.id).unwrap();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.content.is_none()));
    assert!(pages.iter().all(|p| p.content_length.unwrap_or(0) > 0));

    assert!(scheduler.store().embeddings_for_job(snapshot.id).unwrap().is_empty());
    assert_eq!(snapshot.stats.embeddings_queued, 0);
}

#[tokio::test]
async fn test_embeddings_written_for_text_pages() {
    let mock_server = MockServer::start().await;
    mount_budget_site(&mock_server).await;

    let mut config = create_test_config();
    config.embeddings.enabled = true;
    let scheduler = build_scheduler(&config);

    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed], Some(2), false).await.unwrap();

    let embeddings = scheduler.store().embeddings_for_job(snapshot.id).unwrap();
    assert_eq!(embeddings.len(), 2);
    assert!(embeddings.iter().all(|e| e.dims == 16 && e.vector.len() == 16));
    assert_eq!(snapshot.stats.embeddings_embedded, 2);
    assert_eq!(scheduler.corpus_stats().unwrap().embeddings, 2);
}

#[tokio::test]
async fn test_robots_disallow_is_a_skip() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /private/open\nDisallow: /private\n").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/private/secret">secret</a>
               <a href="/private/open/page">open</a>
               <a href="/public">public</a>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html("<p>hidden</p>"))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/open/page"))
        .respond_with(html("<p>open</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<p>public</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let scheduler = build_scheduler(&create_test_config());
    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed], Some(10), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.fetched, 3);
    assert_eq!(snapshot.stats.disallowed, 1);
    assert_eq!(snapshot.stats.skipped, 1);
    assert_eq!(snapshot.stats.errors, 0);
}

#[tokio::test]
async fn test_oversized_response_is_an_error() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/big">big</a>"#))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("x".repeat(8192), "text/html"),
        )
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.transport.max_bytes = 1024;
    let scheduler = build_scheduler(&config);

    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed], Some(10), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.fetched, 1);
    assert_eq!(snapshot.stats.errors, 1);

    let big = format!("{}/big", mock_server.uri());
    assert!(scheduler.store().get_page(snapshot.id, &big).unwrap().is_none());
    assert_eq!(scheduler.transport().stats().oversized, 1);
}

#[tokio::test]
async fn test_conditional_fetch_counts_not_modified() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&mock_server)
        .await;

    let scheduler = build_scheduler(&create_test_config());
    let seed = format!("{}/", mock_server.uri());
    scheduler.transport().remember(
        &Url::parse(&seed).unwrap(),
        ResourceMetadata {
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
        },
    );

    let snapshot = scheduler.crawl(&[seed.clone()], Some(5), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.not_modified, 1);
    assert_eq!(snapshot.stats.skipped, 1);
    assert_eq!(snapshot.stats.fetched, 0);
    assert_eq!(snapshot.stats.bytes, 0);
    assert!(scheduler.store().get_page(snapshot.id, &seed).unwrap().is_none());
}

#[tokio::test]
async fn test_second_job_revalidates_with_etag() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("if-none-match", "\"rev-7\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>fresh</p>").insert_header("etag", "\"rev-7\""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let scheduler = build_scheduler(&create_test_config());
    let seed = format!("{}/", mock_server.uri());

    let first = scheduler.crawl(&[seed.clone()], Some(5), false).await.unwrap();
    assert_eq!(first.stats.fetched, 1);

    let second = scheduler.crawl(&[seed], Some(5), false).await.unwrap();
    assert_eq!(second.stats.fetched, 0);
    assert_eq!(second.stats.not_modified, 1);
}

#[tokio::test]
async fn test_each_url_fetched_at_most_once() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    let links = r##"
        <a href="/">home</a>
        <a href="/a">a</a>
        <a href="/a#section">a again</a>
        <a href="/b">b</a>
    "##;
    for p in ["/", "/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(html(links))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let scheduler = build_scheduler(&create_test_config());
    let seed = mock_server.uri();
    let snapshot = scheduler.crawl(&[seed], Some(50), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.fetched, 3);
    assert_eq!(snapshot.stats.queued, 3);
    assert_eq!(scheduler.store().pages_for_job(snapshot.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_budget_reached_with_work_left_is_cancelled() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<p>a</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    for p in ["/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(html("<p>never</p>"))
            .expect(0)
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config();
    config.crawler.concurrency = 1;
    let scheduler = build_scheduler(&config);

    let seeds: Vec<String> = ["/a", "/b", "/c"]
        .iter()
        .map(|p| format!("{}{}", mock_server.uri(), p))
        .collect();
    let snapshot = scheduler.crawl(&seeds, Some(1), false).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.stats.fetched, 1);
    assert_eq!(snapshot.stats.queued, 3);
}

#[tokio::test]
async fn test_budget_never_exceeded_with_many_workers() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nAllow: /").await;

    let links: String = (0..20)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .respond_with(html(links))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.crawler.concurrency = 8;
    let scheduler = build_scheduler(&config);

    let seed = format!("{}/", mock_server.uri());
    let snapshot = scheduler.crawl(&[seed], Some(5), false).await.unwrap();

    assert!(snapshot.stats.fetched <= 5);
    assert_eq!(snapshot.stats.fetched, 5);
    assert_eq!(scheduler.store().pages_for_job(snapshot.id).unwrap().len(), 5);
}

#[tokio::test]
async fn test_persisted_on_disk() {
    let mock_server = MockServer::start().await;
    mount_budget_site(&mock_server).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config();
    config.storage.database_path = dir.path().join("harvest.db").display().to_string();
    config.storage.batch_size = 32;

    let seed = format!("{}/", mock_server.uri());
    let job_id = {
        let scheduler =
            Scheduler::open(&config, Arc::new(HashingEmbedder::new(16))).unwrap();
        scheduler.crawl(&[seed], Some(2), false).await.unwrap().id
    };

    let reopened = SqliteStore::open(dir.path().join("harvest.db").as_path(), 32).unwrap();
    assert_eq!(reopened.pages_for_job(job_id).unwrap().len(), 2);
    assert_eq!(reopened.corpus_stats().unwrap().pages, 2);
    assert_eq!(
        reopened.get_job(job_id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}
