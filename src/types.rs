//! Shared record types and the crate-wide error enum.
//!
//! Every pipeline stage hands one of these records to the next stage:
//! the crawler produces [`PageRecord`]s, the segmenter turns each page into
//! [`Chunk`]s, the similarity index returns [`SearchHit`]s, and the grounding
//! engine materializes [`Citation`]s inside a [`GroundedAnswer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by pipeline components.
///
/// Component-level failures are contained at their component boundary
/// (a failed fetch becomes a failed-URL entry, a failed provider call becomes
/// zero vectors or an apology answer); only [`PipelineError::Job`] crosses an
/// orchestration boundary, and it does so by mutating job state rather than
/// being raised to an external caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Timeout, network failure, non-200 status, or non-HTML content.
    #[error("fetch error: {0}")]
    Fetch(String),
    /// Malformed content while cleaning or chunking a single page.
    #[error("segmentation error: {0}")]
    Segmentation(String),
    /// Embedding or completion provider failure.
    #[error("provider error: {0}")]
    Provider(String),
    /// Similarity-index storage or persistence failure.
    #[error("index error: {0}")]
    Index(String),
    /// Unrecovered failure during job orchestration.
    #[error("job error: {0}")]
    Job(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// A successfully fetched, HTML, non-duplicate page.
///
/// Immutable after creation; consumed by the text segmenter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageRecord {
    /// Normalized URL the page was fetched from.
    pub url: String,
    /// Document title, falling back to the URL when absent.
    pub title: String,
    /// Raw HTML body as returned by the server.
    pub raw_content: String,
    /// Hex digest of the raw body, used for per-crawl duplicate suppression.
    pub content_hash: String,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// Outbound links resolved against the fetch URL and normalized.
    pub outbound_links: Vec<String>,
}

/// A bounded, overlap-joined span of page text; the atomic retrieval unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from `(url, index)` so re-ingestion of the
    /// same page position is idempotent.
    pub id: String,
    /// Page record this chunk belongs to, stamped by the orchestrator once
    /// the page document has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    /// Source URL.
    pub url: String,
    /// Source page title.
    pub title: String,
    /// The chunk text.
    pub content: String,
    /// Zero-based position within the page, counting only emitted chunks.
    pub index: usize,
    /// Number of whitespace-separated words in `content`.
    pub word_count: usize,
}

/// A chunk returned from a similarity search, paired with its score.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity against the query vector, in `[-1, 1]`.
    pub score: f32,
}

/// A verified source reference extracted from a generated answer.
///
/// Derived per answer and never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    /// Leading words of the cited chunk, capped at the configured excerpt
    /// length with a trailing ellipsis when truncated.
    pub excerpt: String,
    pub chunk_id: String,
    pub relevance_score: f32,
}

/// Final answer with verified citations and a confidence score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Weighted combination of citation count, retrieval relevance, and
    /// answer length, rounded to two decimals; always in `[0, 1]`.
    pub confidence: f32,
    /// Present only when confidence fell below the caller's threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_information: Option<Vec<String>>,
}
