// Tests for the crawl engine

use async_trait::async_trait;
use browsint_core::crawl::{CrawlEngine, CrawlMode, CrawlRequest};
use browsint_core::data::Database;
use browsint_core::error::CrawlError;
use browsint_core::osint::{OsintProfiler, ProfileError, ProfiledEntity, SocialProfile};
use browsint_scanner::error::{Result as ScanResult, ScanError};
use browsint_scanner::fetcher::charset_of;
use browsint_scanner::{
    FetchResponse, Fetcher, HtmlParser, HttpFetcher, MAX_CRAWL_DELAY_SECS, PolicyDecision,
    RobotsPolicy,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HTML: &str = "text/html; charset=utf-8";

/// In-memory fetcher: known URLs answer 200, everything else fails.
#[derive(Default)]
struct StubFetcher {
    pages: HashMap<String, (String, Vec<u8>)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubFetcher {
    fn page(mut self, url: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages
            .insert(url.to_string(), (content_type.to_string(), body.into()));
        self
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_raw(&self, url: &str) -> ScanResult<FetchResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        let Some((content_type, body)) = self.pages.get(url) else {
            return Err(ScanError::EmptyBody(url.to_string()));
        };
        Ok(FetchResponse {
            url: url.to_string(),
            status_code: 200,
            headers: HashMap::from([("content-type".to_string(), content_type.clone())]),
            encoding: charset_of(content_type),
            body: body.clone(),
        })
    }
}

#[derive(Default)]
struct StubProfiler {
    email_calls: Arc<AtomicUsize>,
    brands: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl OsintProfiler for StubProfiler {
    async fn profile_email(&self, email: &str) -> Result<serde_json::Value, ProfileError> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "checked": email }))
    }

    async fn profile_username(&self, username: &str) -> Result<serde_json::Value, ProfileError> {
        Ok(json!({ "username": username }))
    }

    async fn profile_domain(&self, domain: &str) -> Result<serde_json::Value, ProfileError> {
        Ok(json!({ "domain": domain }))
    }

    async fn find_brand_profiles(&self, brand: &str) -> Result<Vec<SocialProfile>, ProfileError> {
        self.brands.lock().unwrap().push(brand.to_string());
        Ok(vec![SocialProfile {
            platform: "GitHub".to_string(),
            url: format!("https://github.com/{}", brand),
            username: brand.to_string(),
            confidence: 1.0,
        }])
    }
}

fn http_fetcher() -> HttpFetcher {
    HttpFetcher::new().unwrap()
}

fn engine(fetcher: impl Fetcher + 'static) -> CrawlEngine {
    CrawlEngine::new(Box::new(fetcher), Box::new(HtmlParser::new().unwrap()))
}

fn download_engine(fetcher: impl Fetcher + 'static, temp: &TempDir) -> CrawlEngine {
    let db = Database::new(&temp.path().join("browsint.db")).unwrap();
    engine(fetcher)
        .with_database(db)
        .with_downloads_dir(temp.path().join("downloads"))
}

fn html_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect();
    format!("<html><head><title>Page</title></head><body>{}</body></html>", anchors)
}

async fn mount_html(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, HTML))
        .expect(expected)
        .mount(server)
        .await;
}

// ============================================================================
// Traversal Tests
// ============================================================================

#[tokio::test]
async fn test_depth_one_visits_root_and_internal_links() {
    let server = MockServer::start().await;
    let root = html_page(&["/a", "/b", "/a#team", "/b/", "https://external.example/x"]);
    mount_html(&server, "/", root, 1).await;
    mount_html(&server, "/a", html_page(&["/c"]), 1).await;
    mount_html(&server, "/b", html_page(&["/c"]), 1).await;
    mount_html(&server, "/c", html_page(&[]), 0).await;

    let temp = TempDir::new().unwrap();
    let engine = download_engine(http_fetcher(), &temp);
    let request = CrawlRequest::new(format!("{}/", server.uri()))
        .with_depth_limit(1)
        .with_delay(0.0);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 3);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.pages_saved, 3);
    assert_eq!(stats.restricted_paths_crawled, 0);
    assert!(stats.robots_txt.is_none());
    assert!(stats.osint_summary.is_none());

    let db = engine.database().unwrap();
    let website = db.get_website("127.0.0.1").unwrap().unwrap();
    assert_eq!(db.count_pages(website.id).unwrap(), 3);

    let root_page = db
        .get_page(website.id, &format!("{}/", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(root_page.title.as_deref(), Some("Page"));
    assert_eq!(root_page.status_code, Some(200));

    let links = db.get_links(root_page.id).unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links.iter().filter(|l| l.is_internal).count(), 2);
    assert!(links.iter().any(|l| l.href == "https://external.example/x" && !l.is_internal));
}

#[tokio::test]
async fn test_duplicate_links_fetched_once() {
    let server = MockServer::start().await;
    mount_html(&server, "/", html_page(&["/x", "/x/", "/x#top", "./x"]), 1).await;
    mount_html(&server, "/x", html_page(&["/", "/x"]), 1).await;

    let temp = TempDir::new().unwrap();
    let engine = download_engine(http_fetcher(), &temp);
    let request = CrawlRequest::new(server.uri())
        .with_depth_limit(3)
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert_eq!(stats.pages_saved, 0);
    assert!(stats.download_path.is_none());

    let db = engine.database().unwrap();
    let website = db.get_website("127.0.0.1").unwrap().unwrap();
    assert_eq!(db.count_pages(website.id).unwrap(), 2);
}

#[tokio::test]
async fn test_depth_zero_fetches_only_start() {
    let server = MockServer::start().await;
    mount_html(&server, "/", html_page(&["/next"]), 1).await;
    mount_html(&server, "/next", html_page(&[]), 0).await;

    let engine = engine(http_fetcher()).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new(server.uri())
        .with_depth_limit(0)
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();
    assert_eq!(stats.urls_visited, 1);
}

#[tokio::test]
async fn test_frontier_is_bounded() {
    let links: Vec<String> = (0..2500).map(|i| format!("/item/{}", i)).collect();
    let hrefs: Vec<&str> = links.iter().map(String::as_str).collect();
    let fetcher = StubFetcher::default().page("https://big.example/", HTML, html_page(&hrefs));
    let calls = fetcher.calls.clone();

    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://big.example/")
        .with_depth_limit(1)
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();

    // Root plus the 2000 tasks that fit; every item fetch fails in the stub
    assert_eq!(stats.urls_visited, 2001);
    assert_eq!(stats.errors, 2000);

    let calls = calls.lock().unwrap();
    assert!(calls.contains(&"https://big.example/item/1999".to_string()));
    assert!(!calls.contains(&"https://big.example/item/2000".to_string()));
}

#[tokio::test]
async fn test_fetch_failures_are_counted() {
    let fetcher = StubFetcher::default().page(
        "https://shop.example/",
        HTML,
        html_page(&["/missing", "/gone"]),
    );
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://shop.example/")
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();
    assert_eq!(stats.urls_visited, 3);
    assert_eq!(stats.errors, 2);
}

#[tokio::test]
async fn test_progress_callback_per_fetch() {
    let fetcher = StubFetcher::default()
        .page("https://shop.example/", HTML, html_page(&["/a"]))
        .page("https://shop.example/a", HTML, html_page(&[]));
    let seen: Arc<Mutex<Vec<(usize, String, usize)>>> = Arc::default();
    let sink = seen.clone();

    let engine = engine(fetcher)
        .with_database(Database::open_in_memory().unwrap())
        .with_progress_callback(Arc::new(move |count: usize, url: &str, depth: usize| {
            sink.lock().unwrap().push((count, url.to_string(), depth));
        }));
    let request = CrawlRequest::new("https://shop.example/")
        .with_delay(0.0)
        .with_save_to_disk(false);

    engine.start_crawl(request).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (1, "https://shop.example/".to_string(), 0),
            (2, "https://shop.example/a".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn test_fetch_order_is_breadth_first() {
    let fetcher = StubFetcher::default()
        .page("https://bfs.example/robots.txt", "text/plain", "User-agent: *\nDisallow: /hidden\n")
        .page("https://bfs.example/", HTML, html_page(&["/a", "/b"]))
        .page("https://bfs.example/hidden", HTML, html_page(&["/h1"]))
        .page("https://bfs.example/a", HTML, html_page(&["/a1", "/a2"]))
        .page("https://bfs.example/b", HTML, html_page(&["/b1", "/a"]))
        .page("https://bfs.example/h1", HTML, html_page(&[]))
        .page("https://bfs.example/a1", HTML, html_page(&["/deep"]))
        .page("https://bfs.example/a2", HTML, html_page(&[]))
        .page("https://bfs.example/b1", HTML, html_page(&[]))
        .page("https://bfs.example/deep", HTML, html_page(&[]));
    let calls = fetcher.calls.clone();
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://bfs.example/")
        .with_depth_limit(3)
        .with_delay(0.0)
        .with_save_to_disk(false)
        .with_policy_decision(PolicyDecision::Override);

    let stats = engine.start_crawl(request).await.unwrap();
    assert_eq!(stats.urls_visited, 9);
    assert_eq!(stats.errors, 0);

    let depth_of = HashMap::from([
        ("/", 0),
        ("/hidden", 0),
        ("/a", 1),
        ("/b", 1),
        ("/h1", 1),
        ("/a1", 2),
        ("/a2", 2),
        ("/b1", 2),
        ("/deep", 3),
    ]);
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], "https://bfs.example/robots.txt");
    assert_eq!(calls[1], "https://bfs.example/");
    assert_eq!(calls[2], "https://bfs.example/hidden");

    let depths: Vec<usize> = calls[1..]
        .iter()
        .map(|url| depth_of[url.trim_start_matches("https://bfs.example")])
        .collect();
    assert_eq!(depths, vec![0, 0, 1, 1, 1, 2, 2, 2, 3]);
}

#[tokio::test]
async fn test_failing_page_writes_count_as_errors() {
    let fetcher = StubFetcher::default()
        .page("https://broken.example/", HTML, html_page(&["/a", "/b"]))
        .page("https://broken.example/a", HTML, html_page(&[]))
        .page("https://broken.example/b", HTML, html_page(&[]));
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    engine
        .database()
        .unwrap()
        .get_connection()
        .execute_batch("DROP TABLE pages;")
        .unwrap();
    let request = CrawlRequest::new("https://broken.example/")
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 3);
    assert_eq!(stats.errors, 3);
}

// ============================================================================
// Download Tests
// ============================================================================

#[tokio::test]
async fn test_pdf_saved_under_documents() {
    let server = MockServer::start().await;
    mount_html(&server, "/", html_page(&["/docs/report"]), 1).await;
    Mock::given(method("GET"))
        .and(path("/docs/report"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let engine = download_engine(http_fetcher(), &temp);
    let request = CrawlRequest::new(server.uri()).with_delay(0.0);

    let stats = engine.start_crawl(request).await.unwrap();
    assert_eq!(stats.pages_saved, 2);
    assert_eq!(stats.errors, 0);

    let run_dir = stats.download_path.unwrap();
    assert!(run_dir.starts_with(temp.path().join("downloads")));
    assert!(run_dir.join("html").join("index.html").is_file());
    let pdf = run_dir.join("documents").join("docs").join("report.pdf");
    assert_eq!(std::fs::read(pdf).unwrap(), b"%PDF-1.4");

    let db = engine.database().unwrap();
    let website = db.get_website("127.0.0.1").unwrap().unwrap();
    let report = db
        .get_page(website.id, &format!("{}/docs/report", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(report.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(report.content_length, Some(8));
    assert_eq!(report.title, None);
}

#[tokio::test]
async fn test_undecodable_page_is_saved_but_not_parsed() {
    let mut body = html_page(&["/never"]).into_bytes();
    body.extend_from_slice(&[0xff, 0xfe, 0xc3]);
    let fetcher = StubFetcher::default().page("https://legacy.example/", HTML, body);
    let calls = fetcher.calls.clone();
    let temp = TempDir::new().unwrap();
    let engine = download_engine(fetcher, &temp);
    let request = CrawlRequest::new("https://legacy.example/").with_delay(0.0);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 1);
    assert_eq!(stats.pages_saved, 1);
    assert_eq!(stats.errors, 1);
    assert!(!calls.lock().unwrap().contains(&"https://legacy.example/never".to_string()));

    let db = engine.database().unwrap();
    let website = db.get_website("legacy.example").unwrap().unwrap();
    let page = db
        .get_page(website.id, "https://legacy.example/")
        .unwrap()
        .unwrap();
    assert_eq!(page.title, None);
    assert!(db.get_links(page.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_legacy_charset_page_is_parsed_and_followed() {
    let mut root = b"<html><head><title>Caf\xe9</title></head><body>".to_vec();
    root.extend_from_slice(b"<a href=\"/next\">Men\xf9</a></body></html>");
    let fetcher = StubFetcher::default()
        .page("https://w.example/", "text/html; charset=windows-1252", root)
        .page("https://w.example/next", HTML, html_page(&[]));
    let calls = fetcher.calls.clone();
    let temp = TempDir::new().unwrap();
    let engine = download_engine(fetcher, &temp);
    let request = CrawlRequest::new("https://w.example/").with_delay(0.0);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert_eq!(stats.errors, 0);
    assert!(calls.lock().unwrap().contains(&"https://w.example/next".to_string()));

    let db = engine.database().unwrap();
    let website = db.get_website("w.example").unwrap().unwrap();
    let page = db.get_page(website.id, "https://w.example/").unwrap().unwrap();
    assert_eq!(page.title.as_deref(), Some("Café"));
    let links = db.get_links(page.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].anchor_text.as_deref(), Some("Menù"));
}

#[tokio::test]
async fn test_metadata_persisted() {
    let html = r#"<html><head><title>Acme</title>
        <meta name="description" content="Tools for everyone">
        <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
        </head><body></body></html>"#;
    let fetcher = StubFetcher::default().page("https://acme.example/", HTML, html);
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://acme.example/")
        .with_delay(0.0)
        .with_save_to_disk(false);

    engine.start_crawl(request).await.unwrap();

    let db = engine.database().unwrap();
    let website = db.get_website("acme.example").unwrap().unwrap();
    let page = db.get_page(website.id, "https://acme.example/").unwrap().unwrap();
    let metadata = db.get_metadata(page.id).unwrap();
    assert!(metadata
        .iter()
        .any(|m| m.name == "description" && m.content.as_deref() == Some("Tools for everyone")));
    assert!(metadata.iter().any(|m| m.name == "structured_data"));
}

// ============================================================================
// Robots Tests
// ============================================================================

const ROBOTS: &str = "User-agent: *\nDisallow: /private\nDisallow: /admin\nDisallow: /*.php\nSitemap: /sitemap.xml\n";

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/plain"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_respect_mode_skips_disallowed_paths() {
    let server = MockServer::start().await;
    mount_robots(&server, ROBOTS).await;
    mount_html(&server, "/", html_page(&["/private", "/public"]), 1).await;
    mount_html(&server, "/private", html_page(&[]), 0).await;
    mount_html(&server, "/public", html_page(&[]), 1).await;

    let temp = TempDir::new().unwrap();
    let engine = download_engine(http_fetcher(), &temp);
    let request = CrawlRequest::new(server.uri())
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert_eq!(stats.restricted_paths_crawled, 0);
    let policy = stats.robots_txt.unwrap();
    assert_eq!(policy.rules.len(), 3);
    assert!(policy.sensitive_paths.contains("/admin"));

    let db = engine.database().unwrap();
    let website = db.get_website("127.0.0.1").unwrap().unwrap();
    let record = db.get_robots(website.id).unwrap().unwrap();
    assert_eq!(record.content.as_deref(), Some(ROBOTS));
    assert_eq!(record.rules.len(), 3);
    assert_eq!(record.sitemaps, vec!["/sitemap.xml"]);
}

#[tokio::test]
async fn test_override_mode_seeds_disallowed_paths() {
    let server = MockServer::start().await;
    mount_robots(&server, ROBOTS).await;
    mount_html(&server, "/", html_page(&[]), 1).await;
    mount_html(&server, "/private", html_page(&["/private/deeper"]), 1).await;
    mount_html(&server, "/admin", html_page(&[]), 1).await;
    mount_html(&server, "/private/deeper", html_page(&[]), 0).await;

    let temp = TempDir::new().unwrap();
    let engine = download_engine(http_fetcher(), &temp);
    // Depth 0: seeds are queued at depth 0, so they are fetched but not expanded
    let request = CrawlRequest::new(server.uri())
        .with_depth_limit(0)
        .with_delay(0.0)
        .with_save_to_disk(false)
        .with_policy_decision(PolicyDecision::Override);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 3);
    assert_eq!(stats.restricted_paths_crawled, 2);
    assert_eq!(stats.errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_crawl_delay_raises_politeness_delay() {
    let fetcher = StubFetcher::default()
        .page("https://slow.example/robots.txt", "text/plain", "User-agent: *\nCrawl-delay: 5\n")
        .page("https://slow.example/", HTML, html_page(&["/next"]))
        .page("https://slow.example/next", HTML, html_page(&[]));
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://slow.example/")
        .with_delay(0.5)
        .with_save_to_disk(false);

    let started = tokio::time::Instant::now();
    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert!(started.elapsed() >= std::time::Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_crawl_delay_does_not_abort_run() {
    let fetcher = StubFetcher::default()
        .page(
            "https://huge.example/robots.txt",
            "text/plain",
            "User-agent: *\nCrawl-delay: 100000000000000000000\n",
        )
        .page("https://huge.example/", HTML, html_page(&[]));
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://huge.example/")
        .with_delay(0.0)
        .with_save_to_disk(false);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(
        stats.robots_txt.unwrap().crawl_delay,
        Some(MAX_CRAWL_DELAY_SECS)
    );
}

#[tokio::test]
async fn test_previewed_robots_is_enforced_without_refetch() {
    let fetcher = StubFetcher::default()
        .page("https://pre.example/robots.txt", "text/plain", "User-agent: *\nDisallow: /a\n")
        .page("https://pre.example/", HTML, html_page(&["/a", "/b"]))
        .page("https://pre.example/a", HTML, html_page(&[]))
        .page("https://pre.example/b", HTML, html_page(&[]));
    let calls = fetcher.calls.clone();
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());

    let reviewed = "User-agent: *\nDisallow: /b\n";
    let request = CrawlRequest::new("https://pre.example/")
        .with_delay(0.0)
        .with_save_to_disk(false)
        .with_previewed_robots(Some((RobotsPolicy::parse(reviewed), reviewed.to_string())));

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["https://pre.example/", "https://pre.example/a"]
    );

    let db = engine.database().unwrap();
    let website = db.get_website("pre.example").unwrap().unwrap();
    let record = db.get_robots(website.id).unwrap().unwrap();
    assert_eq!(record.content.as_deref(), Some(reviewed));
}

#[tokio::test]
async fn test_previewed_absence_of_robots_allows_all() {
    let fetcher = StubFetcher::default()
        .page("https://pre.example/robots.txt", "text/plain", "User-agent: *\nDisallow: /\n")
        .page("https://pre.example/", HTML, html_page(&[]));
    let calls = fetcher.calls.clone();
    let engine = engine(fetcher).with_database(Database::open_in_memory().unwrap());
    let request = CrawlRequest::new("https://pre.example/")
        .with_delay(0.0)
        .with_save_to_disk(false)
        .with_previewed_robots(None);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 1);
    assert!(stats.robots_txt.is_none());
    assert_eq!(*calls.lock().unwrap(), vec!["https://pre.example/"]);
}

// ============================================================================
// Setup Error Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_start_url_is_setup_error() {
    let engine = engine(StubFetcher::default()).with_database(Database::open_in_memory().unwrap());

    let err = engine
        .start_crawl(CrawlRequest::new("not a url"))
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Setup { .. }));
    let partial = err.partial_stats().unwrap();
    assert_eq!(partial.urls_visited, 0);
    assert!(!partial.run_id.is_empty());

    let err = engine
        .start_crawl(CrawlRequest::new("mailto:someone@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Setup { .. }));
}

#[tokio::test]
async fn test_download_mode_requires_database() {
    let fetcher = StubFetcher::default().page("https://acme.example/", HTML, html_page(&[]));
    let calls = fetcher.calls.clone();
    let engine = engine(fetcher);

    let err = engine
        .start_crawl(CrawlRequest::new("https://acme.example/").with_delay(0.0))
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Setup { .. }));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unwritable_output_directory_is_setup_error() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let fetcher = StubFetcher::default().page("https://acme.example/", HTML, html_page(&[]));
    let engine = engine(fetcher)
        .with_database(Database::open_in_memory().unwrap())
        .with_downloads_dir(blocker.join("downloads"));

    let err = engine
        .start_crawl(CrawlRequest::new("https://acme.example/").with_delay(0.0))
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Setup { .. }));
    assert_eq!(err.partial_stats().unwrap().urls_visited, 0);
}

// ============================================================================
// OSINT Survey Tests
// ============================================================================

#[tokio::test]
async fn test_osint_survey_collects_entities() {
    let root = r#"<html><head><script src="/js/jquery.min.js"></script></head><body>
        <p>Write to info@acme.example or call +39 06 1234 5678</p>
        <a href="/contact">Contact</a></body></html>"#;
    let contact = "<html><body><p>Again: info@acme.example, sales@acme.example</p></body></html>";
    let fetcher = StubFetcher::default()
        .page("https://www.acme.example/", HTML, root)
        .page("https://www.acme.example/contact", HTML, contact);

    let profiler = StubProfiler::default();
    let email_calls = profiler.email_calls.clone();
    let brands = profiler.brands.clone();

    let temp = TempDir::new().unwrap();
    let engine = engine(fetcher)
        .with_profiler(Box::new(profiler))
        .with_downloads_dir(temp.path().join("downloads"));
    let request = CrawlRequest::new("https://www.acme.example/")
        .with_delay(0.0)
        .with_mode(CrawlMode::OsintSurvey);

    let stats = engine.start_crawl(request).await.unwrap();

    assert_eq!(stats.urls_visited, 2);
    assert_eq!(stats.pages_saved, 0);
    assert!(stats.download_path.is_none());
    assert!(!temp.path().join("downloads").exists());

    let summary = stats.osint_summary.unwrap();
    let mut emails: Vec<&str> = summary.emails().collect();
    emails.sort();
    assert_eq!(emails, vec!["info@acme.example", "sales@acme.example"]);
    assert_eq!(email_calls.load(Ordering::SeqCst), 2);

    assert!(summary.entities_profiled.iter().any(|e| matches!(
        e,
        ProfiledEntity::PhoneNumbers { page_url, entity }
            if page_url == "https://www.acme.example/" && entity.contains(&"+390612345678".to_string())
    )));

    let technologies = &summary.page_technologies["https://www.acme.example/"];
    assert!(technologies.js_libraries.contains(&"jQuery".to_string()));

    assert_eq!(*brands.lock().unwrap(), vec!["acme".to_string()]);
    let socials: Vec<_> = summary.social_profiles().collect();
    assert_eq!(socials.len(), 1);
    assert_eq!(socials[0].url, "https://github.com/acme");
}

#[tokio::test]
async fn test_osint_survey_without_profiler() {
    let fetcher = StubFetcher::default().page(
        "https://acme.example/",
        HTML,
        "<html><body>contact@acme.example</body></html>",
    );
    let engine = engine(fetcher);
    let request = CrawlRequest::new("https://acme.example/")
        .with_delay(0.0)
        .with_mode(CrawlMode::OsintSurvey);

    let stats = engine.start_crawl(request).await.unwrap();
    let summary = stats.osint_summary.unwrap();

    match &summary.entities_profiled[..] {
        [ProfiledEntity::Email {
            entity,
            profile_details,
            ..
        }] => {
            assert_eq!(entity, "contact@acme.example");
            assert!(profile_details.is_null());
        }
        other => panic!("unexpected entities: {:?}", other),
    }
    assert_eq!(summary.social_profiles().count(), 0);
}
