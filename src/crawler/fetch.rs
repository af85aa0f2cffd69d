//! Single-page fetching with bounded retries and exponential backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::CrawlConfig;
use crate::crawler::normalize::resolve_link;

/// Base unit for exponential backoff between fetch attempts.
const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Raw material extracted from one successful fetch, before the crawl loop
/// applies duplicate suppression and link scheduling.
#[derive(Clone, Debug)]
pub(crate) struct FetchedPage {
    pub title: String,
    pub raw_content: String,
    pub content_hash: String,
    pub outbound_links: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Fetches `url` with up to `config.max_retries` attempts.
///
/// A non-200 status, a non-HTML content type, or a network/timeout error all
/// count as a failed attempt; attempts are separated by `2^attempt` backoff
/// units. Returns `None` once every attempt has failed; the caller records
/// the URL in its failed set.
pub(crate) async fn fetch_page(client: &Client, url: &str, config: &CrawlConfig) -> Option<FetchedPage> {
    for attempt in 0..config.max_retries {
        match try_fetch(client, url, config).await {
            Ok(page) => return Some(page),
            Err(reason) => {
                tracing::warn!(
                    url,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    %reason,
                    "fetch attempt failed"
                );
            }
        }
        if attempt + 1 < config.max_retries {
            tokio::time::sleep(BACKOFF_UNIT * (1 << attempt)).await;
        }
    }
    None
}

async fn try_fetch(client: &Client, url: &str, config: &CrawlConfig) -> Result<FetchedPage, String> {
    let response = client
        .get(url)
        .header("User-Agent", &config.user_agent)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .timeout(config.request_timeout)
        .send()
        .await
        .map_err(|err| err.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("http status {status}"));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.contains("text/html") {
        return Err(format!("non-html content type '{content_type}'"));
    }

    let body = response.text().await.map_err(|err| err.to_string())?;
    let (title, outbound_links) = extract_title_and_links(url, &body);

    Ok(FetchedPage {
        title,
        content_hash: content_hash(&body),
        raw_content: body,
        outbound_links,
        fetched_at: Utc::now(),
    })
}

/// Parses the document once, pulling the title and every resolvable anchor.
///
/// Kept synchronous so the non-`Send` parse tree never lives across an await.
fn extract_title_and_links(url: &str, html: &str) -> (String, Vec<String>) {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("static selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| url.to_string());

    let base = match Url::parse(url) {
        Ok(base) => base,
        Err(_) => return (title, Vec::new()),
    };
    let anchor_selector = Selector::parse("a[href]").expect("static selector");
    let links = document
        .select(&anchor_selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_link(&base, href))
        .collect();

    (title, links)
}

/// Content-addressed digest of the raw body, used for duplicate suppression.
pub(crate) fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}
