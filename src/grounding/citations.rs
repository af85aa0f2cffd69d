//! Deterministic parser for `[Source N]` citation markers.
//!
//! Grammar: `'[' "Source" ' ' digits ']'`, 1-indexed into the ranked chunk
//! list. Anything that does not match the grammar exactly is ignored, as are
//! out-of-range or repeated source numbers.

use crate::types::{Citation, SearchHit};

const MARKER_PREFIX: &str = "[Source ";

/// Scans `text` for well-formed markers, returning every source number in
/// occurrence order (duplicates included).
pub fn scan_markers(text: &str) -> Vec<usize> {
    let mut numbers = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(MARKER_PREFIX) {
        let after_prefix = &rest[start + MARKER_PREFIX.len()..];
        match parse_number(after_prefix) {
            Some((number, consumed)) => {
                numbers.push(number);
                rest = &after_prefix[consumed..];
            }
            None => {
                // Malformed marker; resume scanning after the bracket.
                rest = &rest[start + 1..];
            }
        }
    }
    numbers
}

/// Parses `digits ']'` at the start of `input`, returning the number and how
/// many bytes were consumed.
fn parse_number(input: &str) -> Option<(usize, usize)> {
    let digits_len = input.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 || !input[digits_len..].starts_with(']') {
        return None;
    }
    let number = input[..digits_len].parse().ok()?;
    Some((number, digits_len + 1))
}

/// Materializes one [`Citation`] per distinct, in-range marker, in
/// first-occurrence order.
///
/// Excerpts are the first `max_excerpt_words` words of the cited chunk, with
/// an ellipsis appended when truncated.
pub fn extract_citations(
    answer: &str,
    ranked: &[SearchHit],
    max_excerpt_words: usize,
) -> Vec<Citation> {
    let mut cited = std::collections::HashSet::new();
    let mut citations = Vec::new();
    for number in scan_markers(answer) {
        if number == 0 || number > ranked.len() || !cited.insert(number) {
            continue;
        }
        let hit = &ranked[number - 1];
        citations.push(Citation {
            url: hit.chunk.url.clone(),
            title: hit.chunk.title.clone(),
            excerpt: excerpt(&hit.chunk.content, max_excerpt_words),
            chunk_id: hit.chunk.id.clone(),
            relevance_score: hit.score,
        });
    }
    citations
}

fn excerpt(content: &str, max_words: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut excerpt = words[..max_words].join(" ");
    excerpt.push_str("...");
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn hit(id: &str, content: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: id.to_string(),
                page_id: None,
                url: format!("https://x.com/{id}"),
                title: format!("Title {id}"),
                content: content.to_string(),
                index: 0,
                word_count: content.split_whitespace().count(),
            },
            score,
        }
    }

    #[test]
    fn markers_scan_in_occurrence_order() {
        let text = "First [Source 2], then [Source 1], then [Source 2] again.";
        assert_eq!(scan_markers(text), vec![2, 1, 2]);
    }

    #[test]
    fn malformed_markers_are_ignored() {
        let text = "[Source] [Source x] [Source 12 [Source 3] [source 4]";
        assert_eq!(scan_markers(text), vec![3]);
    }

    #[test]
    fn out_of_range_and_duplicate_markers_produce_no_citation() {
        let ranked = vec![hit("a", "alpha content", 0.9), hit("b", "beta content", 0.8)];
        let answer = "See [Source 1] and [Source 5] and [Source 1] and [Source 0].";
        let citations = extract_citations(answer, &ranked, 25);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].chunk_id, "a");
    }

    #[test]
    fn every_citation_maps_to_a_ranked_chunk() {
        let ranked = vec![hit("a", "alpha", 0.9), hit("b", "beta", 0.8)];
        let citations = extract_citations("[Source 2] then [Source 1]", &ranked, 25);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].chunk_id, "b");
        assert_eq!(citations[1].chunk_id, "a");
        for citation in &citations {
            assert!(ranked.iter().any(|h| h.chunk.id == citation.chunk_id));
        }
    }

    #[test]
    fn long_excerpts_truncate_with_ellipsis() {
        let content = (0..40).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let ranked = vec![hit("a", &content, 0.5)];
        let citations = extract_citations("[Source 1]", &ranked, 25);
        assert!(citations[0].excerpt.ends_with("..."));
        assert_eq!(citations[0].excerpt.split_whitespace().count(), 25);
    }
}
