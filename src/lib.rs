//! Citeweave ingests web content into a searchable, citation-grounded
//! knowledge base and answers natural-language questions against it.
//!
//! ```text
//! Seed URLs ──► crawler ──► PageRecord batch
//!                              │
//!                              ▼
//!                    segmenter (clean + chunk)
//!                              │
//!                              ▼
//!            providers::EmbeddingClient (batched, degrading)
//!                              │
//!                              ▼
//!                  index::SimilarityIndex ──► save()/load()
//!                              │
//! Question ──► embed query ──► top-k search ──► grounding::GroundingEngine
//!                                                  │
//!                                                  ▼
//!                               answer + verified citations + confidence
//! ```
//!
//! The [`jobs::Pipeline`] orchestrates ingestion as detached background
//! jobs tracked through a `pending → running → {completed, failed}` state
//! machine; retrieval composes query embedding, vector search, and grounded
//! answer construction. All collaborators (providers, index, store) are
//! injected at construction.

pub mod config;
pub mod crawler;
pub mod grounding;
pub mod index;
pub mod jobs;
pub mod providers;
pub mod segmenter;
pub mod types;

pub use config::{CrawlConfig, GroundingConfig, PipelineConfig, SegmenterConfig};
pub use crawler::{CrawlReport, Crawler, ProgressSink};
pub use grounding::GroundingEngine;
pub use index::{IndexStats, SimilarityIndex};
pub use jobs::{DocumentStore, InMemoryStore, IngestJob, IngestRequest, JobStatus, Pipeline};
pub use providers::{
    CompletionProvider, EmbeddingClient, EmbeddingProvider, GeminiProvider, MockProvider,
    OpenAiProvider,
};
pub use segmenter::TextSegmenter;
pub use types::{Chunk, Citation, GroundedAnswer, PageRecord, PipelineError, SearchHit};
