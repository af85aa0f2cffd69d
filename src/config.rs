//! Pipeline configuration with environment-variable overrides.
//!
//! Every knob has a sensible default so tests and examples can run with
//! `PipelineConfig::default()`; [`PipelineConfig::from_env`] layers overrides
//! from the process environment (and a `.env` file when present).

use std::time::Duration;

/// Crawler limits and politeness settings.
#[derive(Clone, Debug)]
pub struct CrawlConfig {
    /// Hard cap on pages returned from one crawl.
    pub max_pages: usize,
    /// Maximum link depth relative to the seed URLs.
    pub max_depth: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Fetch attempts per URL before it is recorded as failed.
    pub max_retries: u32,
    /// Fixed delay between fetches to bound request rate.
    pub crawl_delay: Duration,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 2,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            crawl_delay: Duration::from_secs(1),
            user_agent: "citeweave/0.1".to_string(),
        }
    }
}

/// Text cleaning and chunking thresholds.
#[derive(Clone, Debug)]
pub struct SegmenterConfig {
    /// Target chunk size in words.
    pub chunk_size: usize,
    /// Trailing-sentence overlap budget in words.
    pub chunk_overlap: usize,
    /// Minimum emitted chunk length in characters; shorter chunks are dropped.
    pub min_chunk_length: usize,
    /// Pages whose cleaned word count falls below this floor are skipped.
    pub min_page_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_length: 100,
            min_page_words: 50,
        }
    }
}

/// Retrieval and answer-construction settings.
#[derive(Clone, Debug)]
pub struct GroundingConfig {
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Confidence threshold below which missing-information detection runs.
    pub min_confidence: f32,
    /// Word cap for citation excerpts.
    pub max_excerpt_words: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_confidence: 0.7,
            max_excerpt_words: 25,
        }
    }
}

/// Umbrella configuration injected into the ingestion pipeline.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub crawl: CrawlConfig,
    pub segmenter: SegmenterConfig,
    pub grounding: GroundingConfig,
    /// Texts per embedding-provider request.
    pub embed_batch_size: usize,
}

impl PipelineConfig {
    /// Builds a config from defaults plus environment overrides.
    ///
    /// Recognized variables: `CITEWEAVE_MAX_PAGES`, `CITEWEAVE_MAX_DEPTH`,
    /// `CITEWEAVE_REQUEST_TIMEOUT_SECS`, `CITEWEAVE_MAX_RETRIES`,
    /// `CITEWEAVE_CRAWL_DELAY_MS`, `CITEWEAVE_CHUNK_SIZE`,
    /// `CITEWEAVE_CHUNK_OVERLAP`, `CITEWEAVE_MIN_CHUNK_LENGTH`,
    /// `CITEWEAVE_TOP_K`, `CITEWEAVE_MIN_CONFIDENCE`,
    /// `CITEWEAVE_EMBED_BATCH_SIZE`. Unparseable values fall back to the
    /// default rather than erroring.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(v) = env_parse::<usize>("CITEWEAVE_MAX_PAGES") {
            config.crawl.max_pages = v;
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_MAX_DEPTH") {
            config.crawl.max_depth = v;
        }
        if let Some(v) = env_parse::<u64>("CITEWEAVE_REQUEST_TIMEOUT_SECS") {
            config.crawl.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("CITEWEAVE_MAX_RETRIES") {
            config.crawl.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("CITEWEAVE_CRAWL_DELAY_MS") {
            config.crawl.crawl_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_CHUNK_SIZE") {
            config.segmenter.chunk_size = v;
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_CHUNK_OVERLAP") {
            config.segmenter.chunk_overlap = v;
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_MIN_CHUNK_LENGTH") {
            config.segmenter.min_chunk_length = v;
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_TOP_K") {
            config.grounding.top_k = v;
        }
        if let Some(v) = env_parse::<f32>("CITEWEAVE_MIN_CONFIDENCE") {
            config.grounding.min_confidence = v;
        }
        if let Some(v) = env_parse::<usize>("CITEWEAVE_EMBED_BATCH_SIZE") {
            config.embed_batch_size = v;
        }
        config
    }

    /// Effective embedding batch size (defaults to 100 when unset).
    pub fn embed_batch_size(&self) -> usize {
        if self.embed_batch_size == 0 {
            100
        } else {
            self.embed_batch_size
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
