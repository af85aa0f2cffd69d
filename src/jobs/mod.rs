//! Ingestion job lifecycle and pipeline orchestration.
//!
//! One [`IngestJob`] tracks one asynchronous ingestion run through
//! `pending → running → {completed, failed}`. The [`Pipeline`] owns the
//! sequencing: crawl the full batch, segment every page independently,
//! embed all chunks in provider-sized batches, bulk-add into the similarity
//! index, persist it, then mark the job terminal. Failed and completed jobs
//! are never mutated again.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{CrawlConfig, PipelineConfig};
use crate::crawler::{Crawler, ProgressSink};
use crate::grounding::GroundingEngine;
use crate::index::SimilarityIndex;
use crate::providers::{CompletionProvider, EmbeddingClient, EmbeddingProvider};
use crate::segmenter::TextSegmenter;
use crate::types::{GroundedAnswer, PipelineError};

pub use store::{DocumentStore, InMemoryStore, StoredPage};

/// Lifecycle states of an ingestion job.
///
/// `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Durable record of one ingestion run; mutated only by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: String,
    pub status: JobStatus,
    pub seed_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_allowlist: Option<Vec<String>>,
    pub max_pages: usize,
    pub max_depth: usize,
    pub pages_processed: usize,
    pub total_pages: usize,
    /// Fraction of the crawl estimate processed so far; forced to 1.0 on
    /// completion.
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for one ingestion request.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    pub seed_urls: Vec<String>,
    pub domain_allowlist: Option<Vec<String>>,
    pub max_pages: usize,
    pub max_depth: usize,
}

/// Everything the ingestion and retrieval pipelines need, injected once at
/// construction. No ambient globals.
pub struct Pipeline {
    embedder: EmbeddingClient,
    grounding: GroundingEngine,
    index: Arc<SimilarityIndex>,
    store: Arc<dyn DocumentStore>,
    config: PipelineConfig,
    /// Join handles for in-flight jobs, retained for observability and a
    /// future cancel operation.
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        completion_provider: Arc<dyn CompletionProvider>,
        index: Arc<SimilarityIndex>,
        store: Arc<dyn DocumentStore>,
        config: PipelineConfig,
    ) -> Self {
        let embedder = EmbeddingClient::new(embedding_provider, config.embed_batch_size());
        let grounding = GroundingEngine::new(completion_provider, config.grounding.clone());
        Self {
            embedder,
            grounding,
            index,
            store,
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a job in `pending` state and detaches the ingestion run.
    ///
    /// Returns the job id as soon as the record is durably created, before
    /// any crawling begins. At most one run exists per job id.
    pub async fn start_ingestion(
        self: &Arc<Self>,
        request: IngestRequest,
    ) -> Result<String, PipelineError> {
        let now = Utc::now();
        let job = IngestJob {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            seed_urls: request.seed_urls,
            domain_allowlist: request.domain_allowlist,
            max_pages: request.max_pages,
            max_depth: request.max_depth,
            pages_processed: 0,
            total_pages: request.max_pages,
            progress: 0.0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let job_id = job.id.clone();
        self.store.create_job(job).await?;

        let pipeline = Arc::clone(self);
        let task_id = job_id.clone();
        let handle = tokio::spawn(async move {
            pipeline.process_job(&task_id).await;
        });
        self.handles.lock().insert(job_id.clone(), handle);

        Ok(job_id)
    }

    /// Current job record, for status polling.
    pub async fn job_status(&self, job_id: &str) -> Result<Option<IngestJob>, PipelineError> {
        self.store.load_job(job_id).await
    }

    /// Awaits a job's background task, consuming its handle.
    pub async fn wait_for_job(&self, job_id: &str) {
        let handle = self.handles.lock().remove(job_id);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(job_id, error = %err, "ingestion task panicked");
            }
        }
    }

    /// Answers a question against the indexed corpus. A `top_k` of zero
    /// falls back to the configured retrieval depth.
    ///
    /// The empty-index precondition is reported before any retrieval work;
    /// all later failures degrade inside the grounding engine instead of
    /// erroring.
    pub async fn ask(&self, question: &str, top_k: usize) -> Result<GroundedAnswer, PipelineError> {
        if self.index.stats().await.count == 0 {
            return Err(PipelineError::Index(
                "similarity index is empty; ingest content first".to_string(),
            ));
        }
        let top_k = if top_k == 0 {
            self.config.grounding.top_k
        } else {
            top_k
        };
        let query = self.embedder.embed_query(question).await;
        let hits = self.index.search(&query, top_k).await;
        Ok(self
            .grounding
            .answer(question, &hits, self.config.grounding.min_confidence)
            .await)
    }

    /// Runs the full ingestion sequence for one job; every failure path ends
    /// in a terminal state transition rather than a propagated error.
    async fn process_job(&self, job_id: &str) {
        let job = match self.store.load_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::error!(job_id, "job not found");
                return;
            }
            Err(err) => {
                tracing::error!(job_id, error = %err, "failed to load job");
                return;
            }
        };

        match self.run_stages(&job).await {
            Ok(()) => {
                let mut job = job;
                job.status = JobStatus::Completed;
                job.progress = 1.0;
                // Keep the progress-callback counts; only the terminal
                // fields change here.
                if let Ok(Some(current)) = self.store.load_job(job_id).await {
                    job.pages_processed = current.pages_processed;
                    job.total_pages = current.total_pages;
                }
                let now = Utc::now();
                job.updated_at = now;
                job.completed_at = Some(now);
                if let Err(err) = self.store.update_job(&job).await {
                    tracing::error!(job_id, error = %err, "failed to persist completed state");
                }
                tracing::info!(job_id, "ingestion completed");
            }
            Err(err) => {
                tracing::error!(job_id, error = %err, "ingestion failed");
                let mut job = job;
                if let Ok(Some(current)) = self.store.load_job(job_id).await {
                    job = current;
                }
                job.status = JobStatus::Failed;
                job.error_message = Some(err.to_string());
                job.updated_at = Utc::now();
                if let Err(err) = self.store.update_job(&job).await {
                    tracing::error!(job_id, error = %err, "failed to persist failed state");
                }
            }
        }
    }

    async fn run_stages(&self, job: &IngestJob) -> Result<(), PipelineError> {
        self.transition_running(job).await?;

        // Stage 1: crawl the full batch.
        let crawl_config = CrawlConfig {
            max_pages: job.max_pages,
            max_depth: job.max_depth,
            ..self.config.crawl.clone()
        };
        let crawler = Crawler::new(crawl_config, job.domain_allowlist.clone())?;
        let sink = JobProgressSink {
            store: Arc::clone(&self.store),
            job_id: job.id.clone(),
        };
        let report = crawler.crawl(&job.seed_urls, Some(&sink)).await;
        tracing::info!(
            job_id = %job.id,
            pages = report.pages.len(),
            failed = report.failed_urls.len(),
            "crawl stage done"
        );

        // Stage 2: segment every page independently; per-page failures skip
        // the page, never the job.
        let segmenter = TextSegmenter::new(self.config.segmenter.clone());
        let mut all_chunks = Vec::new();
        for page in &report.pages {
            let Some(mut chunks) = segmenter.segment_page(page) else {
                continue;
            };
            let page_doc = StoredPage {
                id: Uuid::new_v4().to_string(),
                job_id: job.id.clone(),
                url: page.url.clone(),
                title: page.title.clone(),
                content_hash: page.content_hash.clone(),
                fetched_at: page.fetched_at,
                word_count: chunks.iter().map(|c| c.word_count).sum(),
                chunk_count: chunks.len(),
                is_indexed: false,
            };
            for chunk in &mut chunks {
                chunk.page_id = Some(page_doc.id.clone());
            }
            self.store.insert_page(page_doc).await?;
            self.store.insert_chunks(&chunks).await?;
            all_chunks.extend(chunks);
        }
        tracing::info!(job_id = %job.id, chunks = all_chunks.len(), "segmentation stage done");

        // Stage 3+4: embed in batches, then one bulk add and one save.
        // Zero chunks is a valid, empty ingestion.
        if !all_chunks.is_empty() {
            let texts: Vec<String> = all_chunks.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_texts(&texts).await;
            self.index.add(vectors, all_chunks).await?;
            self.index.save().await?;
            self.store.mark_pages_indexed(&job.id).await?;
        }

        Ok(())
    }

    async fn transition_running(&self, job: &IngestJob) -> Result<(), PipelineError> {
        let mut job = job.clone();
        job.status = JobStatus::Running;
        job.updated_at = Utc::now();
        self.store.update_job(&job).await
    }
}

/// Mirrors crawler progress into the job record after each accepted page.
struct JobProgressSink {
    store: Arc<dyn DocumentStore>,
    job_id: String,
}

#[async_trait]
impl ProgressSink for JobProgressSink {
    async fn report(&self, pages_processed: usize, total_estimate: usize) {
        let job = match self.store.load_job(&self.job_id).await {
            Ok(Some(job)) => job,
            _ => return,
        };
        let mut job = job;
        job.pages_processed = pages_processed;
        job.total_pages = total_estimate;
        job.progress = if total_estimate > 0 {
            pages_processed as f32 / total_estimate as f32
        } else {
            0.0
        };
        job.updated_at = Utc::now();
        if let Err(err) = self.store.update_job(&job).await {
            tracing::warn!(job_id = %self.job_id, error = %err, "progress update failed");
        }
    }
}
