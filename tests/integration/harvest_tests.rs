//! Whole runs: discovery, downloads, cache reuse and politeness

use super::{html_page, pdf_head, pdf_response, test_config, PDF_BODY};
use async_trait::async_trait;
use pdf_trawl::classifier::DiscoveredLink;
use pdf_trawl::crawler::{FetchError, Harvester, PageRenderer, RendererFactory};
use pdf_trawl::{OutcomeState, SeedGroup, StopReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const FAST: &str = "request-delay-ms = 0";

fn group(id: &str, seed: &str) -> String {
    format!("[[group]]\nid = \"{}\"\nseeds = [\"{}\"]\n", id, seed)
}

fn seed_groups(config: &pdf_trawl::Config) -> Vec<SeedGroup> {
    config
        .groups
        .iter()
        .map(|g| SeedGroup::from_config(g).unwrap())
        .collect()
}

#[tokio::test]
async fn test_download_then_repeat_run_skips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/a.pdf", "A")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/a.pdf"))
        .respond_with(pdf_head())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), FAST, "", &group("site", &format!("{}/", server.uri())));
    let groups = seed_groups(&config);

    let first = Harvester::new(config.clone())
        .unwrap()
        .run(&groups, "hash")
        .await
        .unwrap();

    assert_eq!(first.totals.downloaded, 1);
    assert_eq!(first.totals.total_bytes, PDF_BODY.len() as u64);
    let outcome = &first.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::Downloaded);
    assert_eq!(outcome.attempts, 1);
    let key = outcome.artifact_key.clone().unwrap();
    assert!(key.starts_with("site/a-"));
    let stored = std::fs::read(dir.path().join("downloads").join(&key)).unwrap();
    assert_eq!(stored, PDF_BODY);

    let harvester = Harvester::new(config).unwrap();
    let second = harvester.run(&groups, "hash").await.unwrap();

    assert_eq!(second.totals.downloaded, 0);
    assert_eq!(second.totals.skipped_duplicate, 1);
    assert_eq!(second.totals.pages_visited, 0);
    assert_eq!(second.totals.pages_from_cache, 1);
    assert_eq!(second.groups[0].outcomes[0].attempts, 0);
    assert_eq!(harvester.cache().stats().unwrap().runs, 2);
}

#[tokio::test]
async fn test_head_declaring_html_skips_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/report.pdf", "Annual")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(pdf_response())
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), FAST, "", &group("site", &format!("{}/", server.uri())));
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::SkippedInvalid);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.error.as_deref().unwrap().starts_with("invalid:"));
}

#[tokio::test]
async fn test_truncated_body_is_rejected_as_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/stub.pdf", "Stub")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/stub.pdf"))
        .respond_with(pdf_head())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stub.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4\n%%EOF\n".to_vec(), "application/pdf"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), FAST, "", &group("site", &format!("{}/", server.uri())));
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::SkippedInvalid);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.error.as_deref().unwrap().contains("body too small"));
    assert!(!dir.path().join("downloads").join("site").exists());
}

#[tokio::test]
async fn test_transient_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/c.pdf", "C")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/c.pdf"))
        .respond_with(pdf_head())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        FAST,
        "max-attempts = 3\nbase-delay-ms = 50\nmax-delay-ms = 500",
        &group("site", &format!("{}/", server.uri())),
    );
    let groups = seed_groups(&config);

    let started = Instant::now();
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::Downloaded);
    assert_eq!(outcome.attempts, 3);
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_permanent_error_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/gone.pdf", "Old")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        FAST,
        "max-attempts = 3\nbase-delay-ms = 10\nmax-delay-ms = 50",
        &group("site", &format!("{}/", server.uri())),
    );
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::Failed);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.error.as_deref().unwrap().starts_with("http-status"));
}

#[tokio::test]
async fn test_download_retries_stop_at_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/busy.pdf", "Busy")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/busy.pdf"))
        .respond_with(pdf_head())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        FAST,
        "max-attempts = 3\nbase-delay-ms = 10\nmax-delay-ms = 50",
        &group("site", &format!("{}/", server.uri())),
    );
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::Failed);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.error.as_deref().unwrap().starts_with("http-status"));
}

#[tokio::test]
async fn test_oversized_artifact_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/big.pdf", "Big")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/big.pdf"))
        .respond_with(pdf_head())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.pdf"))
        .respond_with(pdf_response())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        "request-delay-ms = 0\nmax-artifact-bytes = 16\nmin-artifact-bytes = 8",
        "",
        &group("site", &format!("{}/", server.uri())),
    );
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    let outcome = &summary.groups[0].outcomes[0];
    assert_eq!(outcome.state, OutcomeState::Failed);
    assert!(outcome.error.as_deref().unwrap().starts_with("too-large"));
    assert!(!dir.path().join("downloads").join("site").exists());
}

#[tokio::test]
async fn test_shared_document_downloaded_once_across_groups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(html_page(&[("/shared.pdf", "Shared")]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second"))
        .respond_with(html_page(&[("/shared.pdf", "Shared")]))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/shared.pdf"))
        .respond_with(pdf_head())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shared.pdf"))
        .respond_with(pdf_response())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let groups_toml = format!(
        "{}\n{}",
        group("first", &format!("{}/first", server.uri())),
        group("second", &format!("{}/second", server.uri()))
    );
    let config = test_config(dir.path(), FAST, "", &groups_toml);
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    assert_eq!(summary.groups.len(), 2);
    assert_eq!(summary.groups[0].group_id, "first");
    assert_eq!(summary.totals.downloaded, 1);
    assert_eq!(summary.totals.skipped_duplicate, 1);
}

#[tokio::test]
async fn test_run_deadline_stops_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(html_page(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        "request-delay-ms = 0\nrun-deadline-secs = 0",
        "",
        &group("site", &format!("{}/", server.uri())),
    );
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();

    assert_eq!(summary.groups[0].stopped_reason, StopReason::TimeLimit);
    assert_eq!(summary.totals.pages_visited, 0);
}

/// Renderer that never finishes a page within a test's patience
struct StalledRenderer {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl PageRenderer for StalledRenderer {
    async fn render_page(
        &self,
        _url: &Url,
        _timeout: Duration,
    ) -> Result<Vec<DiscoveredLink>, FetchError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct StalledFactory {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RendererFactory for StalledFactory {
    async fn launch(&self) -> Result<Arc<dyn PageRenderer>, FetchError> {
        Ok(Arc::new(StalledRenderer {
            closes: Arc::clone(&self.closes),
        }))
    }
}

#[tokio::test]
async fn test_dropped_run_releases_renderer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[]))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let groups_toml = format!(
        "{}render-all = true\n",
        group("site", &format!("{}/", server.uri()))
    );
    let config = test_config(
        dir.path(),
        "request-delay-ms = 0\nenable-rendering = true",
        "",
        &groups_toml,
    );
    let groups = seed_groups(&config);

    let closes = Arc::new(AtomicUsize::new(0));
    let harvester = Harvester::new(config)
        .unwrap()
        .with_renderer_factory(Arc::new(StalledFactory {
            closes: Arc::clone(&closes),
        }));

    let run = harvester.run(&groups, "hash");
    assert!(tokio::time::timeout(Duration::from_millis(500), run).await.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

/// Serves pages and PDFs while recording when each request arrived
struct RecordingSite {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for RecordingSite {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if let Ok(mut arrivals) = self.arrivals.lock() {
            arrivals.push(Instant::now());
        }

        let path = request.url.path();
        if path.ends_with(".xml") {
            return ResponseTemplate::new(404);
        }
        if !path.ends_with(".pdf") {
            let target = format!("{}-doc.pdf", path);
            return html_page(&[(target.as_str(), "Doc")]);
        }
        if request.method.to_string() == "HEAD" {
            pdf_head()
        } else {
            pdf_response()
        }
    }
}

#[tokio::test]
async fn test_same_host_requests_are_spaced_across_groups() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(any())
        .respond_with(RecordingSite {
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let groups_toml = format!(
        "{}\n{}",
        group("east", &format!("{}/east", server.uri())),
        group("west", &format!("{}/west", server.uri()))
    );
    let config = test_config(
        dir.path(),
        "request-delay-ms = 200\nmax-parallel-groups = 2",
        "",
        &groups_toml,
    );
    let groups = seed_groups(&config);
    let summary = Harvester::new(config).unwrap().run(&groups, "hash").await.unwrap();
    assert_eq!(summary.totals.downloaded, 2);

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    // Per group: sitemap, seed page, HEAD and GET of its document
    assert_eq!(arrivals.len(), 8);
    for pair in arrivals.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(150));
    }
}
