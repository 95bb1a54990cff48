//! Lexical fallback ranker.
//!
//! Keyword/title/type heuristic scoring used whenever vector search is
//! unavailable (no provider configured, quota exhausted, or any embedding
//! failure). Scores are integers, unbounded during accumulation, clamped
//! to 100 only for display.
//!
//! Documentation-typed documents get a flat boost so architectural
//! guidance outranks raw source when both are textually relevant. All
//! weights are configuration ([`LexicalWeights`]), not semantics.

use crate::config::LexicalWeights;
use crate::models::{DocType, Document};

/// Snippet window: chars kept before and after the first query-word hit.
const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

/// A document with its lexical score. Documents scoring 0 are excluded
/// before this type is produced.
#[derive(Debug, Clone)]
pub struct LexicalScore {
    pub document: Document,
    pub score: i64,
    pub snippet: String,
}

/// Score and rank documents against a query. Deterministic: equal scores
/// tie-break on document id.
pub fn rank(query: &str, documents: &[Document], weights: &LexicalWeights) -> Vec<LexicalScore> {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower.split_whitespace().collect();
    if query_words.is_empty() {
        return Vec::new();
    }

    let tech_terms = technology_terms(&query_words);
    let query_mentions_error = query_words
        .iter()
        .any(|w| w.contains("exception") || w.contains("error"));
    let query_mentions_component = query_words
        .iter()
        .any(|w| w.contains("controller") || w.contains("service"));

    let mut scored: Vec<LexicalScore> = documents
        .iter()
        .filter(|doc| doc.is_active)
        .filter_map(|doc| {
            let title_lower = doc.title.to_lowercase();
            let content_lower = doc.content.to_lowercase();
            let mut score = 0i64;

            for word in &query_words {
                if title_lower.contains(word) {
                    score += weights.title_word;
                }
                score += weights.body_occurrence * count_occurrences(&content_lower, word);
            }

            if doc.doc_type == DocType::Code {
                for term in &tech_terms {
                    score += weights.tech_term * count_occurrences(&content_lower, term);
                }
            }

            // Type boosts only apply to documents that matched at all,
            // otherwise every documentation doc would surface for every
            // query.
            if score > 0 && doc.doc_type == DocType::Documentation {
                score += weights.documentation_boost;
                if query_mentions_error {
                    score += weights.error_query_boost;
                }
                if query_mentions_component {
                    score += weights.component_query_boost;
                }
            }

            if score == 0 {
                return None;
            }

            let snippet = extract_snippet(&doc.content, &query_words);
            Some(LexicalScore {
                document: doc.clone(),
                score,
                snippet,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.document.id.cmp(&b.document.id)));
    scored
}

/// Clamp a raw lexical score to the 0–100 display range.
pub fn display_score(score: i64) -> f64 {
    score.clamp(0, 100) as f64
}

/// Technology-specific terms derived from query keywords, matched only
/// against `code`-typed documents.
fn technology_terms(query_words: &[&str]) -> Vec<&'static str> {
    let mut terms = Vec::new();
    for word in query_words {
        match *word {
            w if w.contains("spring") => terms.extend_from_slice(&[
                "spring",
                "@controller",
                "@restcontroller",
                "@service",
                "@autowired",
            ]),
            w if w.contains("regex") || w.contains("pattern") => {
                terms.extend_from_slice(&["pattern.compile", "regex", "matcher"])
            }
            w if w.contains("sql") || w.contains("database") || w.contains("jpa") => {
                terms.extend_from_slice(&["select", "jdbctemplate", "datasource", "@entity"])
            }
            w if w.contains("null") => terms.extend_from_slice(&["null", "optional"]),
            w if w.contains("valid") => {
                terms.extend_from_slice(&["@valid", "@notnull", "constraint"])
            }
            _ => {}
        }
    }
    terms.sort_unstable();
    terms.dedup();
    terms
}

fn count_occurrences(haystack: &str, needle: &str) -> i64 {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0i64;
    let mut pos = 0;
    while let Some(found) = haystack[pos..].find(needle) {
        count += 1;
        pos += found + needle.len();
    }
    count
}

/// Byte offset in `haystack` of the first case-insensitive occurrence of
/// `needle_lower` (already lowercased). Offsets refer to the original
/// string, so the snippet window stays aligned even when lowercasing
/// changes a character's byte length.
fn find_ci(haystack: &str, needle_lower: &str) -> Option<usize> {
    if needle_lower.is_empty() {
        return None;
    }
    let needle: Vec<char> = needle_lower.chars().collect();
    for (pos, _) in haystack.char_indices() {
        let mut stream = haystack[pos..].chars().flat_map(char::to_lowercase);
        if needle.iter().all(|&c| stream.next() == Some(c)) {
            return Some(pos);
        }
    }
    None
}

/// 100 chars before and 200 after the first hit of any matched query word.
fn extract_snippet(content: &str, query_words: &[&str]) -> String {
    let hit = query_words
        .iter()
        .filter_map(|w| find_ci(content, w))
        .min();

    let Some(hit) = hit else {
        return content.chars().take(SNIPPET_AFTER).collect();
    };

    let mut start = hit.saturating_sub(SNIPPET_BEFORE);
    let mut end = (hit + SNIPPET_AFTER).min(content.len());
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }

    content[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexicalWeights;

    fn doc(id: &str, title: &str, content: &str, doc_type: DocType) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            doc_type,
            file_path: None,
            repository: None,
            tags: Vec::new(),
            is_active: true,
            last_updated: 0,
        }
    }

    #[test]
    fn test_zero_score_excluded() {
        let docs = vec![doc("d1", "unrelated", "nothing in common", DocType::Code)];
        let ranked = rank("kafka rebalance", &docs, &LexicalWeights::default());
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_documentation_outranks_identical_code() {
        let body = "connection timeout while talking to the database pool";
        let docs = vec![
            doc("code", "timeout notes", body, DocType::Code),
            doc("docs", "timeout notes", body, DocType::Documentation),
        ];
        let ranked = rank("database connection timeout", &docs, &LexicalWeights::default());
        assert_eq!(ranked[0].document.id, "docs");
        // Flat boost: at least 50 points ahead of the identical code doc.
        assert!(ranked[0].score - ranked[1].score >= 50);
    }

    #[test]
    fn test_error_query_boost_applies_to_documentation() {
        let docs = vec![doc(
            "d1",
            "handler guide",
            "how to handle failures",
            DocType::Documentation,
        )];
        let plain = rank("handle failures", &docs, &LexicalWeights::default());
        let with_error = rank("handle failures exception", &docs, &LexicalWeights::default());
        assert!(with_error[0].score >= plain[0].score + 30);
    }

    #[test]
    fn test_tech_terms_only_boost_code() {
        let body = "@Controller annotated entry point using spring mvc";
        let code = vec![doc("c", "entry", body, DocType::Code)];
        let other = vec![doc("o", "entry", body, DocType::Other)];
        let w = LexicalWeights::default();
        let code_score = rank("spring request mapping", &code, &w)[0].score;
        let other_score = rank("spring request mapping", &other, &w)[0].score;
        assert!(code_score > other_score);
    }

    #[test]
    fn test_deterministic_ordering() {
        let docs = vec![
            doc("b", "timeout", "timeout timeout", DocType::Code),
            doc("a", "timeout", "timeout timeout", DocType::Code),
            doc("c", "timeout runbook", "timeout timeout timeout", DocType::Runbook),
        ];
        let w = LexicalWeights::default();
        let first = rank("timeout", &docs, &w);
        for _ in 0..5 {
            let again = rank("timeout", &docs, &w);
            let ids: Vec<&str> = again.iter().map(|r| r.document.id.as_str()).collect();
            let first_ids: Vec<&str> = first.iter().map(|r| r.document.id.as_str()).collect();
            assert_eq!(ids, first_ids);
        }
        // Equal scores break ties on id.
        let pos_a = first.iter().position(|r| r.document.id == "a").unwrap();
        let pos_b = first.iter().position(|r| r.document.id == "b").unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn test_snippet_window() {
        let padding = "x".repeat(300);
        let content = format!("{} needle and some trailing context here", padding);
        let docs = vec![doc("d1", "t", &content, DocType::Other)];
        let ranked = rank("needle", &docs, &LexicalWeights::default());
        let snippet = &ranked[0].snippet;
        assert!(snippet.contains("needle"));
        // 100 before + 200 after, not the whole padding.
        assert!(snippet.len() <= SNIPPET_BEFORE + SNIPPET_AFTER + 1);
    }

    #[test]
    fn test_snippet_aligned_after_case_folding() {
        // 'İ' (U+0130) lowercases to two code points and grows by a byte,
        // so offsets found in a lowercased copy would not line up with
        // the original text.
        let padding = "İ".repeat(120);
        let content = format!("{} needle and some trailing context here", padding);
        let docs = vec![doc("d1", "t", &content, DocType::Other)];
        let ranked = rank("needle", &docs, &LexicalWeights::default());
        assert!(ranked[0].snippet.contains("needle"));
    }

    #[test]
    fn test_inactive_documents_ignored() {
        let mut d = doc("d1", "timeout", "timeout", DocType::Documentation);
        d.is_active = false;
        assert!(rank("timeout", &[d], &LexicalWeights::default()).is_empty());
    }

    #[test]
    fn test_display_score_clamped() {
        assert_eq!(display_score(250), 100.0);
        assert_eq!(display_score(70), 70.0);
    }
}
