//! Deterministic in-process provider for tests and offline runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::types::PipelineError;

use super::{CompletionProvider, EmbeddingProvider};

const DEFAULT_DIMENSION: usize = 64;

/// Hash-bucketed bag-of-words embeddings plus scripted completions.
///
/// Embeddings are deterministic and vocabulary-sensitive: texts sharing words
/// land in overlapping buckets, so cosine ranking behaves plausibly in tests.
/// Completions pop from a scripted queue, falling back to a canned answer
/// that cites `[Source 1]`.
pub struct MockProvider {
    dimension: usize,
    responses: Mutex<VecDeque<String>>,
    fail_embeddings: bool,
    fail_completions: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            responses: Mutex::new(VecDeque::new()),
            fail_embeddings: false,
            fail_completions: false,
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Queues a completion to return before the canned fallback.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().push_back(response.into());
        self
    }

    /// Makes every embedding call fail, for degrade-path tests.
    #[must_use]
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Makes every completion call fail, for degrade-path tests.
    #[must_use]
    pub fn failing_completions(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let digest = Sha256::digest(word.as_bytes());
            let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % self.dimension;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if self.fail_embeddings {
            return Err(PipelineError::Provider("mock embedding failure".into()));
        }
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        if self.fail_embeddings {
            return Err(PipelineError::Provider("mock embedding failure".into()));
        }
        Ok(self.embed_text(text))
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, PipelineError> {
        if self.fail_completions {
            return Err(PipelineError::Provider("mock completion failure".into()));
        }
        if let Some(scripted) = self.responses.lock().pop_front() {
            return Ok(scripted);
        }
        Ok("Based on the available sources, the answer follows. [Source 1]".to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
