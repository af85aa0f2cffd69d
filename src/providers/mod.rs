//! Embedding and completion provider seams.
//!
//! Providers are polymorphic: construct an [`OpenAiProvider`],
//! [`GeminiProvider`], or [`MockProvider`] once at process start and inject
//! it wherever embeddings or completions are needed. The
//! [`EmbeddingClient`] wrapper adds batching and the degrade-to-zero-vectors
//! policy so the similarity index always receives well-formed input.

pub mod gemini;
pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::PipelineError;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

/// Turns text into fixed-dimension embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider-declared vector dimension.
    fn dimension(&self) -> usize;

    /// Embeds a batch of document texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// Produces a text completion from a prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;

    fn name(&self) -> &'static str;
}

/// Batching front for an [`EmbeddingProvider`] that never fails the caller.
///
/// Texts are embedded in provider-sized batches; a failed batch degrades to
/// zero vectors for every text in it, logged as an error, so downstream
/// consumers always receive one well-formed vector per input.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embeds all `texts`, batch by batch, degrading failed batches to zero
    /// vectors.
    pub async fn embed_texts(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let dimension = self.provider.dimension();
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            match self.provider.embed(batch).await {
                Ok(vectors) if vectors.len() == batch.len() => all.extend(vectors),
                Ok(vectors) => {
                    tracing::error!(
                        expected = batch.len(),
                        got = vectors.len(),
                        "embedding batch size mismatch, substituting zero vectors"
                    );
                    all.extend(std::iter::repeat_with(|| vec![0.0; dimension]).take(batch.len()));
                }
                Err(err) => {
                    tracing::error!(error = %err, "embedding batch failed, substituting zero vectors");
                    all.extend(std::iter::repeat_with(|| vec![0.0; dimension]).take(batch.len()));
                }
            }
        }
        all
    }

    /// Embeds a query, degrading a provider failure to the zero vector.
    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        match self.provider.embed_query(text).await {
            Ok(vector) if vector.len() == self.provider.dimension() => vector,
            Ok(vector) => {
                tracing::error!(
                    got = vector.len(),
                    expected = self.provider.dimension(),
                    "query embedding has wrong dimension, substituting zero vector"
                );
                vec![0.0; self.provider.dimension()]
            }
            Err(err) => {
                tracing::error!(error = %err, "query embedding failed, substituting zero vector");
                vec![0.0; self.provider.dimension()]
            }
        }
    }
}
