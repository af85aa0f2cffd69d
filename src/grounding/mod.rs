//! Citation-grounded answer construction.
//!
//! Given a question and retrieved chunks, the engine builds a numbered
//! source block, asks the completion provider for an answer constrained to
//! those sources, verifies every `[Source N]` marker against the retrieved
//! chunks, and scores its own confidence. Provider failures degrade to a
//! fixed apology answer; they never reach the caller.

pub mod citations;

use std::sync::Arc;

use crate::config::GroundingConfig;
use crate::providers::CompletionProvider;
use crate::types::{GroundedAnswer, SearchHit};

pub use citations::{extract_citations, scan_markers};

const INSUFFICIENT_ANSWER: &str = "I don't have enough information to answer this question.";
const ERROR_ANSWER: &str = "An error occurred while generating the answer.";

/// Phrases that mark the model acknowledging a gap in its sources.
const UNCERTAINTY_PHRASES: &[&str] = &[
    "i don't have",
    "insufficient",
    "unclear",
    "not enough",
    "missing",
    "cannot determine",
    "unable to",
];

pub struct GroundingEngine {
    completer: Arc<dyn CompletionProvider>,
    config: GroundingConfig,
}

impl GroundingEngine {
    pub fn new(completer: Arc<dyn CompletionProvider>, config: GroundingConfig) -> Self {
        Self { completer, config }
    }

    /// Produces a grounded answer for `question` from `ranked` chunks.
    ///
    /// With no chunks at all this short-circuits to the fixed insufficient-
    /// information answer at confidence 0.0 without calling the provider.
    pub async fn answer(
        &self,
        question: &str,
        ranked: &[SearchHit],
        min_confidence: f32,
    ) -> GroundedAnswer {
        if ranked.is_empty() {
            return GroundedAnswer {
                answer: INSUFFICIENT_ANSWER.to_string(),
                citations: Vec::new(),
                confidence: 0.0,
                missing_information: Some(vec!["No relevant sources found".to_string()]),
            };
        }

        let prompt = build_prompt(question, ranked, self.config.max_excerpt_words);
        let answer_text = match self.completer.complete(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(provider = self.completer.name(), error = %err, "completion failed");
                return GroundedAnswer {
                    answer: ERROR_ANSWER.to_string(),
                    citations: Vec::new(),
                    confidence: 0.0,
                    missing_information: Some(vec!["Generation error".to_string()]),
                };
            }
        };

        let citations = extract_citations(&answer_text, ranked, self.config.max_excerpt_words);
        let confidence = confidence_score(&answer_text, citations.len(), ranked);
        let missing_information = if confidence < min_confidence {
            Some(missing_information(&answer_text))
        } else {
            None
        };

        GroundedAnswer {
            answer: answer_text,
            citations,
            confidence,
            missing_information,
        }
    }
}

/// Numbered source block plus the fixed grounding instructions.
fn build_prompt(question: &str, ranked: &[SearchHit], max_excerpt_words: usize) -> String {
    let mut context = String::new();
    for (i, hit) in ranked.iter().enumerate() {
        context.push_str(&format!(
            "[Source {}] (URL: {}, Title: {})\n{}\n\n",
            i + 1,
            hit.chunk.url,
            hit.chunk.title,
            hit.chunk.content
        ));
    }

    format!(
        "You are a research assistant that provides evidence-based answers.\n\n\
         STRICT RULES:\n\
         1. Answer ONLY based on the provided sources below\n\
         2. Include at least one citation [Source N] per paragraph\n\
         3. If information is insufficient, explicitly state what's missing\n\
         4. Never fabricate or assume information not in the sources\n\
         5. Keep citations concise (max {max_excerpt_words} words from source)\n\n\
         SOURCES:\n{context}\n\
         QUESTION: {question}\n\n\
         Provide a well-structured answer with inline citations [Source N]. \
         If you cannot fully answer the question, explain what information is missing."
    )
}

/// Weighted confidence in `[0, 1]`, rounded to two decimals.
///
/// `0.4 * min(citations/3, 1) + 0.4 * avg(top-3 retrieval scores) +
/// 0.2 * min(answer_words/100, 1)`; each factor saturates so none dominates.
fn confidence_score(answer: &str, citation_count: usize, ranked: &[SearchHit]) -> f32 {
    let citation_score = (citation_count as f32 / 3.0).min(1.0);

    let top = ranked.len().min(3);
    let avg_relevance = ranked[..top].iter().map(|hit| hit.score).sum::<f32>() / top as f32;

    let word_count = answer.split_whitespace().count();
    let length_score = (word_count as f32 / 100.0).min(1.0);

    let confidence = 0.4 * citation_score + 0.4 * avg_relevance + 0.2 * length_score;
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Sentences containing the first matching uncertainty phrase, or a generic
/// incompleteness notice when the answer never acknowledges a gap.
fn missing_information(answer: &str) -> Vec<String> {
    let lowered = answer.to_lowercase();
    for phrase in UNCERTAINTY_PHRASES {
        if !lowered.contains(phrase) {
            continue;
        }
        let sentences: Vec<String> = answer
            .split('.')
            .filter(|sentence| sentence.to_lowercase().contains(phrase))
            .map(|sentence| sentence.trim().to_string())
            .filter(|sentence| !sentence.is_empty())
            .collect();
        if !sentences.is_empty() {
            return sentences;
        }
    }
    vec!["Coverage appears incomplete based on available sources".to_string()]
}
