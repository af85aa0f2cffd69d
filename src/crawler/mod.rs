//! Bounded breadth-first web crawler.
//!
//! The crawler walks a link graph from seed URLs through a FIFO frontier of
//! `(url, depth)` pairs, respecting domain, depth, and page-count limits.
//! Individual URL failures are recorded, never fatal: a crawl always returns
//! whatever it collected plus the failed-URL set for diagnostics.
//!
//! All traversal state (visited set, frontier, seen content hashes) lives
//! inside one [`Crawler::crawl`] call and dies with it.

pub mod fetch;
pub mod normalize;

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use reqwest::Client;

use crate::config::CrawlConfig;
use crate::types::{PageRecord, PipelineError};

pub use normalize::{is_allowed_domain, normalize_url};

/// Receives `(pages_processed, total_pages_estimate)` after each accepted
/// page. The estimate is `min(frontier_size + results_so_far, max_pages)`.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, pages_processed: usize, total_estimate: usize);
}

/// What one crawl call produced.
#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Accepted pages, in acceptance order.
    pub pages: Vec<PageRecord>,
    /// Normalized URLs that exhausted their fetch retries.
    pub failed_urls: HashSet<String>,
}

/// Breadth-first crawler bounded by `max_pages` and `max_depth`.
pub struct Crawler {
    config: CrawlConfig,
    domain_allowlist: Option<Vec<String>>,
    client: Client,
}

impl Crawler {
    /// Builds a crawler with its own HTTP client.
    ///
    /// Fails when the client cannot be constructed with the configured
    /// timeout and redirect policy; a client without those limits is not an
    /// acceptable fallback.
    pub fn new(
        config: CrawlConfig,
        domain_allowlist: Option<Vec<String>>,
    ) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            config,
            domain_allowlist,
            client,
        })
    }

    /// Crawls from `seed_urls` until the page budget is reached or the
    /// frontier is exhausted.
    ///
    /// A candidate is skipped without fetching when it was already visited
    /// (by normalized URL), sits beyond `max_depth`, or falls outside the
    /// domain allowlist. Fetched pages whose content hash was already seen
    /// in this crawl are discarded as duplicates: counted as visited, not as
    /// results.
    pub async fn crawl(
        &self,
        seed_urls: &[String],
        progress: Option<&dyn ProgressSink>,
    ) -> CrawlReport {
        let mut frontier: VecDeque<(String, usize)> =
            seed_urls.iter().map(|url| (url.clone(), 0)).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut report = CrawlReport::default();

        while let Some((candidate, depth)) = frontier.pop_front() {
            if report.pages.len() >= self.config.max_pages {
                break;
            }

            let Ok(url) = normalize_url(&candidate) else {
                tracing::debug!(url = %candidate, "skipping unparseable url");
                continue;
            };
            if visited.contains(&url) || depth > self.config.max_depth {
                continue;
            }
            if !is_allowed_domain(&url, self.domain_allowlist.as_deref()) {
                continue;
            }
            visited.insert(url.clone());

            tracing::info!(%url, depth, "fetching");
            let Some(page) = fetch::fetch_page(&self.client, &url, &self.config).await else {
                report.failed_urls.insert(url);
                self.polite_delay().await;
                continue;
            };

            if !seen_hashes.insert(page.content_hash.clone()) {
                tracing::info!(%url, "duplicate content, discarding");
                self.polite_delay().await;
                continue;
            }

            if depth < self.config.max_depth && report.pages.len() + 1 < self.config.max_pages {
                for link in &page.outbound_links {
                    if !visited.contains(link) {
                        frontier.push_back((link.clone(), depth + 1));
                    }
                }
            }

            report.pages.push(PageRecord {
                url,
                title: page.title,
                raw_content: page.raw_content,
                content_hash: page.content_hash,
                fetched_at: page.fetched_at,
                outbound_links: page.outbound_links,
            });

            if let Some(sink) = progress {
                let estimate =
                    (frontier.len() + report.pages.len()).min(self.config.max_pages);
                sink.report(report.pages.len(), estimate).await;
            }

            self.polite_delay().await;
        }

        tracing::info!(
            pages = report.pages.len(),
            failed = report.failed_urls.len(),
            "crawl finished"
        );
        report
    }

    async fn polite_delay(&self) {
        if !self.config.crawl_delay.is_zero() {
            tokio::time::sleep(self.config.crawl_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_surfaces_client_build_errors() {
        // The configured limits must reach the client or fail loudly; a
        // default client is never substituted.
        let crawler = Crawler::new(CrawlConfig::default(), None);
        assert!(crawler.is_ok());
    }
}
