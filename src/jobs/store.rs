//! Durable-store seam for jobs, pages, and chunks.
//!
//! The production store is an external document database; the core only
//! needs single-document create/read/update semantics, expressed by
//! [`DocumentStore`]. [`InMemoryStore`] backs tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{Chunk, PipelineError};

use super::IngestJob;

/// Page document persisted once per accepted, segmentable page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredPage {
    pub id: String,
    pub job_id: String,
    pub url: String,
    pub title: String,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
    pub word_count: usize,
    pub chunk_count: usize,
    pub is_indexed: bool,
}

/// Single-document durable operations the orchestrator relies on.
///
/// Assumed strongly consistent per document; no cross-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_job(&self, job: IngestJob) -> Result<(), PipelineError>;

    async fn load_job(&self, id: &str) -> Result<Option<IngestJob>, PipelineError>;

    async fn update_job(&self, job: &IngestJob) -> Result<(), PipelineError>;

    async fn insert_page(&self, page: StoredPage) -> Result<(), PipelineError>;

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), PipelineError>;

    /// Flips `is_indexed` on every page belonging to `job_id`.
    async fn mark_pages_indexed(&self, job_id: &str) -> Result<(), PipelineError>;
}

/// Map-backed store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<String, IngestJob>>,
    pages: RwLock<HashMap<String, StoredPage>>,
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages stored for a job, unordered.
    pub fn pages_for_job(&self, job_id: &str) -> Vec<StoredPage> {
        self.pages
            .read()
            .values()
            .filter(|page| page.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_job(&self, job: IngestJob) -> Result<(), PipelineError> {
        self.jobs.write().insert(job.id.clone(), job);
        Ok(())
    }

    async fn load_job(&self, id: &str) -> Result<Option<IngestJob>, PipelineError> {
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update_job(&self, job: &IngestJob) -> Result<(), PipelineError> {
        self.jobs.write().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn insert_page(&self, page: StoredPage) -> Result<(), PipelineError> {
        self.pages.write().insert(page.id.clone(), page);
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), PipelineError> {
        let mut guard = self.chunks.write();
        for chunk in chunks {
            guard.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn mark_pages_indexed(&self, job_id: &str) -> Result<(), PipelineError> {
        for page in self.pages.write().values_mut() {
            if page.job_id == job_id {
                page.is_indexed = true;
            }
        }
        Ok(())
    }
}
