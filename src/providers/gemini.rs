//! Google Gemini-backed embedding and completion provider.
//!
//! The embedding endpoint accepts one text per request, so batch embedding
//! loops over the inputs; the batching wrapper above this provider keeps
//! request sizes bounded either way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::PipelineError;

use super::{CompletionProvider, EmbeddingProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_CHAT_MODEL: &str = "gemini-pro";
const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
const DEFAULT_DIMENSION: usize = 768;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Overrides the API base URL, mainly for mock servers in tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    async fn post_json<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<R, PipelineError> {
        let response = self
            .client
            .post(format!("{}{path}?key={}", self.base_url, self.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, body = %text, "gemini request failed");
            return Err(PipelineError::Provider(format!(
                "gemini request failed with status {status}"
            )));
        }
        serde_json::from_str(&text).map_err(|err| PipelineError::Provider(err.to_string()))
    }

    async fn embed_one(&self, text: &str, task_type: &str) -> Result<Vec<f32>, PipelineError> {
        let body = json!({
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type,
        });
        let response: EmbedContentResponse = self
            .post_json(
                &format!("/models/{}:embedContent", self.embedding_model),
                &body,
            )
            .await?;
        Ok(response.embedding.values)
    }
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Serialize)]
struct CandidatePart {
    text: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text, "RETRIEVAL_DOCUMENT").await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.embed_one(text, "RETRIEVAL_QUERY").await
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.3, "maxOutputTokens": 1000 },
        });
        let response: GenerateContentResponse = self
            .post_json(&format!("/models/{}:generateContent", self.chat_model), &body)
            .await?;
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| PipelineError::Provider("gemini returned no candidates".into()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
