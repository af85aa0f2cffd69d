//! HTML cleaning and sentence-granular chunking with overlap.
//!
//! Cleaning strips non-content markup (script, style, nav, chrome elements)
//! and yields plain text. Chunking splits the text into sentences and greedily
//! packs them into word-bounded chunks, seeding each new chunk with trailing
//! sentences from the previous one so adjacent chunks share context.

use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};

use crate::config::SegmenterConfig;
use crate::types::{Chunk, PageRecord};

/// Elements whose text never reaches the cleaned output.
const EXCLUDED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "head"];

fn sentence_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s+").expect("static regex"))
}

/// Cleans markup and splits pages into overlapping chunks.
#[derive(Clone, Debug)]
pub struct TextSegmenter {
    config: SegmenterConfig,
}

impl TextSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Cleans a page and chunks it, or skips it entirely when the cleaned
    /// text falls below the word floor. Skips are logged, never fatal.
    pub fn segment_page(&self, page: &PageRecord) -> Option<Vec<Chunk>> {
        let text = self.clean(&page.raw_content);
        let word_count = text.split_whitespace().count();
        if word_count < self.config.min_page_words {
            tracing::warn!(url = %page.url, word_count, "page below word floor, skipping");
            return None;
        }
        Some(self.chunk(&text, &page.url, &page.title))
    }

    /// Extracts visible text from raw markup.
    ///
    /// Drops script/style/nav/footer/header/aside subtrees, trims each line,
    /// and joins the survivors so no blank-line runs remain.
    pub fn clean(&self, raw_markup: &str) -> String {
        let document = Html::parse_document(raw_markup);
        let mut lines: Vec<String> = Vec::new();
        for node in document.tree.nodes() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let excluded = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| EXCLUDED_ELEMENTS.contains(&el.name()))
            });
            if excluded {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
            }
        }
        lines.join("\n")
    }

    /// Splits plain text into overlapping chunks of at most `chunk_size`
    /// words.
    ///
    /// Sentences accumulate greedily; when the next sentence would overflow
    /// the budget, the accumulation is emitted (if it meets the minimum
    /// character length) and the next chunk is seeded with whole trailing
    /// sentences whose running word count stays within `chunk_overlap`.
    /// Chunk indices count only emitted chunks, and ids derive from
    /// `(url, index)` so re-segmenting the same page is idempotent.
    pub fn chunk(&self, plain_text: &str, url: &str, title: &str) -> Vec<Chunk> {
        let sentences = self.split_sentences(plain_text);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0usize;
        let mut index = 0usize;

        for sentence in sentences {
            let sentence_words = sentence.split_whitespace().count();

            if current_words + sentence_words > self.config.chunk_size && !current.is_empty() {
                if let Some(chunk) = self.emit(&current, current_words, url, title, index) {
                    chunks.push(chunk);
                    index += 1;
                }

                let (overlap, overlap_words) = self.trailing_overlap(&current);
                current = overlap;
                current_words = overlap_words;
            }

            current_words += sentence_words;
            current.push(sentence);
        }

        if !current.is_empty() {
            if let Some(chunk) = self.emit(&current, current_words, url, title, index) {
                chunks.push(chunk);
            }
        }

        chunks
    }

    /// Sentence boundary: `.`, `!`, or `?` followed by whitespace.
    ///
    /// Sentences longer than `chunk_size` words can never be divided by the
    /// accumulator, so they are pre-split into word-granular windows that
    /// carry `chunk_overlap` words between them.
    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut last = 0;
        for boundary in sentence_boundary().find_iter(text) {
            let end = boundary.start() + 1;
            let sentence = text[last..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            last = boundary.end();
        }
        let tail = text[last..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }

        let mut expanded = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            if words.len() <= self.config.chunk_size {
                expanded.push(sentence);
                continue;
            }
            let stride = self
                .config
                .chunk_size
                .saturating_sub(self.config.chunk_overlap)
                .max(1);
            let mut start = 0;
            while start < words.len() {
                let end = (start + self.config.chunk_size).min(words.len());
                expanded.push(words[start..end].join(" "));
                if end == words.len() {
                    break;
                }
                start += stride;
            }
        }
        expanded
    }

    /// Whole trailing sentences from the just-closed chunk whose running
    /// word count stays within the overlap budget, in original order.
    fn trailing_overlap(&self, closed: &[String]) -> (Vec<String>, usize) {
        let mut overlap: Vec<String> = Vec::new();
        let mut words = 0usize;
        for sentence in closed.iter().rev() {
            let sentence_words = sentence.split_whitespace().count();
            if words + sentence_words > self.config.chunk_overlap {
                break;
            }
            words += sentence_words;
            overlap.insert(0, sentence.clone());
        }
        (overlap, words)
    }

    fn emit(
        &self,
        sentences: &[String],
        word_count: usize,
        url: &str,
        title: &str,
        index: usize,
    ) -> Option<Chunk> {
        let content = sentences.join(" ");
        if content.len() < self.config.min_chunk_length {
            return None;
        }
        Some(Chunk {
            id: chunk_id(url, index),
            page_id: None,
            url: url.to_string(),
            title: title.to_string(),
            content,
            index,
            word_count,
        })
    }
}

/// Deterministic chunk id from `(url, index)`.
pub fn chunk_id(url: &str, index: usize) -> String {
    let digest = Sha256::digest(format!("{url}_{index}").as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn segmenter(chunk_size: usize, overlap: usize, min_len: usize) -> TextSegmenter {
        TextSegmenter::new(SegmenterConfig {
            chunk_size,
            chunk_overlap: overlap,
            min_chunk_length: min_len,
            min_page_words: 50,
        })
    }

    fn word_set(chunk: &Chunk) -> std::collections::HashSet<&str> {
        chunk.content.split_whitespace().collect()
    }

    #[test]
    fn clean_strips_non_content_markup() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head>
            <body><nav>menu</nav><p>Visible   text here.</p>
            <script>var x = 1;</script><footer>foot</footer></body></html>"#;
        let text = segmenter(500, 50, 100).clean(html);
        assert_eq!(text, "Visible text here.");
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let seg = segmenter(500, 50, 100);
        let sentences = seg.split_sentences("First one. Second one! Third one? Tail without end");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third one?", "Tail without end"]
        );
    }

    #[test]
    fn consecutive_chunks_share_overlap_words() {
        let seg = segmenter(20, 8, 10);
        let text = (0..12)
            .map(|i| format!("sentence number {i} has exactly six words."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = seg.chunk(&text, "https://x.com/p", "T");
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let shared: Vec<_> = word_set(&pair[0])
                .intersection(&word_set(&pair[1]))
                .copied()
                .collect();
            assert!(!shared.is_empty(), "adjacent chunks must overlap");
        }
        for chunk in &chunks {
            assert!(chunk.content.len() >= 10);
        }
    }

    #[test]
    fn short_chunks_are_dropped_and_indices_stay_dense() {
        // A minimum length high enough to drop every chunk.
        let seg = segmenter(5, 0, 10_000);
        let chunks = seg.chunk("One two three four five six. Seven eight.", "u", "t");
        assert!(chunks.is_empty());

        let seg = segmenter(500, 50, 10);
        let chunks = seg.chunk("A single modest sentence of words.", "u", "t");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let seg = segmenter(20, 5, 10);
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        let first: Vec<String> = seg.chunk(text, "https://x.com/a", "T").iter().map(|c| c.id.clone()).collect();
        let second: Vec<String> = seg.chunk(text, "https://x.com/a", "T").iter().map(|c| c.id.clone()).collect();
        assert_eq!(first, second);
        let other: Vec<String> = seg.chunk(text, "https://x.com/b", "T").iter().map(|c| c.id.clone()).collect();
        assert_ne!(first, other);
    }

    #[test]
    fn punctuation_free_block_still_chunks_with_overlap() {
        let seg = segmenter(50, 10, 10);
        let text = (0..100).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = seg.chunk(&text, "u", "t");
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.word_count <= 50);
        }
        for pair in chunks.windows(2) {
            let shared: Vec<_> = word_set(&pair[0])
                .intersection(&word_set(&pair[1]))
                .copied()
                .collect();
            assert!(!shared.is_empty());
        }
    }

    #[test]
    fn thin_pages_are_skipped() {
        let seg = segmenter(500, 50, 100);
        let page = PageRecord {
            url: "https://example.com".into(),
            title: "Example Domain".into(),
            raw_content: "<html><body><p>Too few words here.</p></body></html>".into(),
            content_hash: "h".into(),
            fetched_at: Utc::now(),
            outbound_links: vec![],
        };
        assert!(seg.segment_page(&page).is_none());
    }
}
