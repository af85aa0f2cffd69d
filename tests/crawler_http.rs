//! Crawler integration tests against a local mock HTTP server.

use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use parking_lot::Mutex;

use citeweave::config::CrawlConfig;
use citeweave::crawler::{Crawler, ProgressSink};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn test_config(max_pages: usize, max_depth: usize) -> CrawlConfig {
    init_tracing();
    CrawlConfig {
        max_pages,
        max_depth,
        request_timeout: Duration::from_secs(5),
        max_retries: 1,
        crawl_delay: Duration::ZERO,
        user_agent: "citeweave-test/0".to_string(),
    }
}

fn html_page(title: &str, body: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{href}\">link</a>"))
        .collect();
    format!("<html><head><title>{title}</title></head><body><p>{body}</p>{anchors}</body></html>")
}

struct RecordingSink {
    reports: Mutex<Vec<(usize, usize)>>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, pages_processed: usize, total_estimate: usize) {
        self.reports.lock().push((pages_processed, total_estimate));
    }
}

#[tokio::test]
async fn crawl_follows_links_and_skips_failures() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Root", "root body", &["/a", "/b", "/missing", "/plain"]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/a");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("A", "unique body a", &[]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/b");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("B", "unique body b", &[]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/plain");
        then.status(200)
            .header("content-type", "text/plain")
            .body("not html");
    });

    let crawler = Crawler::new(test_config(10, 2), None).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], None).await;

    let urls: Vec<&str> = report.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(report.pages.len(), 3, "root, a, b: {urls:?}");
    assert_eq!(report.pages[0].title, "Root");
    assert_eq!(report.failed_urls.len(), 2);
    assert!(report.failed_urls.iter().any(|u| u.ends_with("/missing")));
    assert!(report.failed_urls.iter().any(|u| u.ends_with("/plain")));
}

#[tokio::test]
async fn page_budget_bounds_results() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Root", "root", &["/p1", "/p2", "/p3"]));
    });
    for i in 1..=3 {
        let body = html_page(&format!("P{i}"), &format!("distinct body {i}"), &[]);
        server.mock(move |when, then| {
            when.method(GET).path(format!("/p{i}"));
            then.status(200).header("content-type", "text/html").body(body.clone());
        });
    }

    let crawler = Crawler::new(test_config(2, 3), None).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], None).await;
    assert_eq!(report.pages.len(), 2);
}

#[tokio::test]
async fn depth_limit_stops_traversal() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Root", "depth zero", &["/d1"]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/d1");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("D1", "depth one", &["/d2"]));
    });
    let deep = server.mock(|when, then| {
        when.method(GET).path("/d2");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("D2", "depth two", &[]));
    });

    let crawler = Crawler::new(test_config(10, 1), None).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], None).await;

    assert_eq!(report.pages.len(), 2);
    deep.assert_hits(0);
}

#[tokio::test]
async fn duplicate_content_is_discarded() {
    let server = MockServer::start_async().await;
    let same_body = html_page("Same", "identical body text", &[]);
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Root", "root body", &["/copy1", "/copy2"]));
    });
    for path in ["/copy1", "/copy2"] {
        let body = same_body.clone();
        server.mock(move |when, then| {
            when.method(GET).path(path);
            then.status(200).header("content-type", "text/html").body(body.clone());
        });
    }

    let crawler = Crawler::new(test_config(10, 1), None).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], None).await;

    let duplicates = report
        .pages
        .iter()
        .filter(|p| p.title == "Same")
        .count();
    assert_eq!(duplicates, 1, "identical content must appear once");
    assert_eq!(report.pages.len(), 2);
}

#[tokio::test]
async fn allowlist_filters_offsite_links() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page(
                "Root",
                "root body",
                &["/local", "https://offsite.example/page"],
            ));
    });
    server.mock(|when, then| {
        when.method(GET).path("/local");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Local", "local body", &[]));
    });

    // The mock server binds to 127.0.0.1, so allowlist that host.
    let crawler = Crawler::new(test_config(10, 1), Some(vec!["127.0.0.1".to_string()])).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], None).await;

    assert_eq!(report.pages.len(), 2);
    assert!(report.pages.iter().all(|p| p.url.contains("127.0.0.1")));
}

#[tokio::test]
async fn progress_reports_after_each_accepted_page() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("Root", "root body", &["/a"]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/a");
        then.status(200)
            .header("content-type", "text/html")
            .body(html_page("A", "body a", &[]));
    });

    let sink = RecordingSink {
        reports: Mutex::new(Vec::new()),
    };
    let crawler = Crawler::new(test_config(5, 1), None).expect("crawler");
    let report = crawler.crawl(&[server.url("/")], Some(&sink)).await;

    let reports = sink.reports.lock();
    assert_eq!(reports.len(), report.pages.len());
    for (i, (processed, estimate)) in reports.iter().enumerate() {
        assert_eq!(*processed, i + 1);
        assert!(*estimate <= 5);
        assert!(*estimate >= *processed);
    }
}

#[tokio::test]
async fn retries_exhausted_lands_in_failed_set() {
    let server = MockServer::start_async().await;
    let flaky = server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(500);
    });

    let mut config = test_config(5, 0);
    config.max_retries = 2;
    let crawler = Crawler::new(config, None).expect("crawler");
    let report = crawler.crawl(&[server.url("/flaky")], None).await;

    assert!(report.pages.is_empty());
    assert_eq!(report.failed_urls.len(), 1);
    flaky.assert_hits(2);
}
