//! Discovery engine against mock sites

use super::{html_page, http_fetcher, memory_cache};
use async_trait::async_trait;
use pdf_trawl::classifier::DiscoveredLink;
use pdf_trawl::crawler::{
    DiscoveryEngine, FetchError, PageRenderer, RateLimiter, RenderSession, RendererFactory,
    RetryPolicy,
};
use pdf_trawl::robots::RobotsCache;
use pdf_trawl::{SeedGroup, StopReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(cache: pdf_trawl::cache::IncrementalCache) -> DiscoveryEngine {
    DiscoveryEngine::new(http_fetcher(), Arc::new(RateLimiter::new(Duration::ZERO)), cache)
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50)))
        .with_request_timeout(Duration::from_secs(5))
}

async fn mount_page(server: &MockServer, at: &str, links: &[(&str, &str)], hits: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(html_page(links))
        .expect(hits)
        .mount(server)
        .await;
}

fn candidate_paths(result: &pdf_trawl::crawler::DiscoveryResult) -> Vec<String> {
    let mut paths: Vec<String> = result
        .candidates
        .iter()
        .map(|c| c.url.path().to_string())
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn test_cycle_is_walked_once_and_candidates_deduplicated() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[("/section-b", "Section B"), ("/a.pdf", "A")], 1).await;
    mount_page(
        &server,
        "/section-b",
        &[("/", "Home"), ("/a.pdf", "A again"), ("/b.pdf", "B")],
        1,
    )
    .await;

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::Exhausted);
    assert_eq!(result.pages_visited, 2);
    assert_eq!(candidate_paths(&result), vec!["/a.pdf", "/b.pdf"]);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_depth_limit_stops_walk() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[("/level-one", "Next")], 1).await;
    mount_page(&server, "/level-one", &[("/level-two", "Deeper")], 1).await;
    mount_page(&server, "/level-two", &[], 0).await;

    let mut group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    group.max_depth = 1;
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::DepthLimit);
    assert_eq!(result.pages_visited, 2);
}

#[tokio::test]
async fn test_page_limit_keeps_seed_candidates() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        &[
            ("/one", "One"),
            ("/two", "Two"),
            ("/three", "Three"),
            ("/four", "Four"),
            ("/five", "Five"),
            ("/a.pdf", "A"),
        ],
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html_page(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let mut group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    group.max_pages = 1;
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::PageLimit);
    assert_eq!(result.pages_visited, 1);
    assert_eq!(candidate_paths(&result), vec!["/a.pdf"]);
}

#[tokio::test]
async fn test_time_limit_stops_walk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&[("/next", "Next"), ("/a.pdf", "A")]).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/next", &[], 0).await;

    let mut group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    group.time_limit = Duration::from_millis(200);
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::TimeLimit);
    assert_eq!(result.pages_visited, 1);
    assert_eq!(candidate_paths(&result), vec!["/a.pdf"]);
}

#[tokio::test]
async fn test_sitemap_entries_seed_the_walk() {
    let server = MockServer::start().await;
    let sitemap_index = format!(
        "<?xml version=\"1.0\"?>\n<sitemapindex xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n\
         <sitemap><loc>{0}/sitemap-pages.xml</loc></sitemap>\n\
         <sitemap><loc>https://elsewhere.example/sitemap.xml</loc></sitemap>\n</sitemapindex>",
        server.uri()
    );
    let sitemap_pages = format!(
        "<?xml version=\"1.0\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n\
         <url><loc>{0}/archive</loc></url>\n\
         <url><loc>{0}/files/listed.pdf</loc></url>\n\
         <url><loc>https://elsewhere.example/other</loc></url>\n</urlset>",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap_index, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap-pages.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap_pages, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", &[], 1).await;
    mount_page(&server, "/archive", &[("/old.pdf", "Old")], 1).await;

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::Exhausted);
    assert_eq!(result.pages_visited, 2);
    assert_eq!(candidate_paths(&result), vec!["/files/listed.pdf", "/old.pdf"]);
    assert!(result
        .visits
        .iter()
        .any(|v| v.url.path() == "/archive" && v.depth == 1));
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_sitemaps_can_be_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/", &[("/h.pdf", "H")], 1).await;

    let mut group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    group.use_sitemaps = false;
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(candidate_paths(&result), vec!["/h.pdf"]);
}

#[tokio::test]
async fn test_failed_page_abandons_only_its_branch() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[("/missing", "Gone"), ("/present", "Here")], 1).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/present", &[("/c.pdf", "C")], 1).await;

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.stopped_reason, StopReason::Exhausted);
    assert_eq!(candidate_paths(&result), vec!["/c.pdf"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, "http-status");
    assert_eq!(result.errors[0].attempts, 1);
}

#[tokio::test]
async fn test_other_hosts_are_not_walked() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        &[("https://elsewhere.example/start", "Partner"), ("/d.pdf", "D")],
        1,
    )
    .await;

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(result.pages_visited, 1);
    assert_eq!(candidate_paths(&result), vec!["/d.pdf"]);
}

#[tokio::test]
async fn test_document_type_filter() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        &[("/budget-2024.pdf", "Spending"), ("/minutes.pdf", "Minutes")],
        1,
    )
    .await;

    let mut group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    group.document_types = vec!["budget".to_string()];
    let result = engine(memory_cache()).discover(&group, None).await;

    assert_eq!(candidate_paths(&result), vec!["/budget-2024.pdf"]);
}

#[tokio::test]
async fn test_fresh_pages_are_replayed_from_cache() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[("/section-b", "Section B"), ("/a.pdf", "A")], 1).await;
    mount_page(&server, "/section-b", &[("/b.pdf", "B")], 1).await;

    let cache = memory_cache();
    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();

    let first = engine(cache.clone()).discover(&group, None).await;
    let second = engine(cache).discover(&group, None).await;

    assert_eq!(first.pages_visited, 2);
    assert_eq!(second.pages_visited, 0);
    assert_eq!(second.pages_from_cache, 2);
    assert_eq!(candidate_paths(&first), candidate_paths(&second));
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow: /private\n", "text/plain"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/", &[("/private/area", "Staff"), ("/e.pdf", "E")], 1).await;
    mount_page(&server, "/private/area", &[], 0).await;

    let fetcher = http_fetcher();
    let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
    let robots = RobotsCache::new(
        fetcher.clone(),
        Arc::clone(&limiter),
        "TestTrawler",
        Duration::from_secs(5),
    );
    let engine = DiscoveryEngine::new(fetcher, limiter, memory_cache()).with_robots(Arc::new(robots));

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine.discover(&group, None).await;

    assert_eq!(result.pages_visited, 1);
    assert_eq!(candidate_paths(&result), vec!["/e.pdf"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, "robots");
}

struct StaticRenderer {
    links: Vec<DiscoveredLink>,
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render_page(
        &self,
        _url: &Url,
        _timeout: Duration,
    ) -> Result<Vec<DiscoveredLink>, FetchError> {
        Ok(self.links.clone())
    }
}

struct CountingFactory {
    launches: AtomicUsize,
    links: Vec<DiscoveredLink>,
}

#[async_trait]
impl RendererFactory for CountingFactory {
    async fn launch(&self) -> Result<Arc<dyn PageRenderer>, FetchError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StaticRenderer {
            links: self.links.clone(),
        }))
    }
}

#[tokio::test]
async fn test_script_page_without_links_is_rendered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><script>loadDocuments();</script></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let factory = Arc::new(CountingFactory {
        launches: AtomicUsize::new(0),
        links: vec![DiscoveredLink::anchor(format!("{}/f.pdf", server.uri()), "F")],
    });
    let session = Arc::new(RenderSession::new(factory.clone()));
    let engine = engine(memory_cache()).with_renderer(Arc::clone(&session));

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine.discover(&group, None).await;
    session.close().await;

    assert_eq!(candidate_paths(&result), vec!["/f.pdf"]);
    assert_eq!(factory.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plain_pages_never_launch_renderer() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[("/g.pdf", "G")], 1).await;

    let factory = Arc::new(CountingFactory {
        launches: AtomicUsize::new(0),
        links: Vec::new(),
    });
    let session = Arc::new(RenderSession::new(factory.clone()));
    let engine = engine(memory_cache()).with_renderer(session);

    let group = SeedGroup::new("site", &[&format!("{}/", server.uri())]).unwrap();
    let result = engine.discover(&group, None).await;

    assert_eq!(candidate_paths(&result), vec!["/g.pdf"]);
    assert_eq!(factory.launches.load(Ordering::SeqCst), 0);
}
