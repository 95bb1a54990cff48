//! Retrieval assembler (RAG composer).
//!
//! Tries the similarity index first; any embedding failure (quota,
//! disabled provider, transport) falls back transparently to the lexical
//! ranker — the caller sees the same [`RagResponse`] shape either way.
//! Results are partitioned by document type into internal knowledge and
//! code context, and every surfaced match is recorded to the search log
//! in the background, keyed by the originating incident.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::lexical;
use crate::models::{MatchCategory, RagResponse, SearchMatch};
use crate::store::{SearchLogEntry, Store};

/// Search the knowledge base and compose a partitioned RAG response.
///
/// `limit` is applied per category. Returns an error only for malformed
/// input (empty query); retrieval failures degrade to the lexical path.
pub async fn search(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    query: &str,
    incident_id: Option<&str>,
    limit: Option<usize>,
) -> Result<RagResponse> {
    if query.trim().is_empty() {
        bail!("search query must not be empty");
    }

    let limit = limit.unwrap_or(retrieval.default_limit);

    let matches = match vector_matches(store.as_ref(), embedder, retrieval, query).await {
        Ok(matches) => {
            debug!(count = matches.len(), "similarity search produced matches");
            matches
        }
        Err(e) => {
            // Quota and generic failures degrade identically: same
            // response shape, lexical scoring underneath.
            warn!(error = %e, "embedding unavailable, using lexical fallback");
            lexical_matches(store.as_ref(), retrieval, query).await?
        }
    };

    let (internal, code) = partition(matches, limit);
    let response = RagResponse::new(query.to_string(), internal, code);

    log_matches(store, incident_id, &response);

    Ok(response)
}

/// Primary path: embed the query, score every active chunk vector, keep
/// similarities above the threshold, aggregate per document by best chunk.
async fn vector_matches(
    store: &dyn Store,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    query: &str,
) -> Result<Vec<SearchMatch>, crate::error::EmbedError> {
    let query_vec = embed_query(embedder, query).await?;

    let chunk_vectors = store
        .active_chunk_vectors()
        .await
        .map_err(|e| crate::error::EmbedError::Provider(e.to_string()))?;

    struct Best {
        similarity: f64,
        snippet: String,
    }

    let mut best_per_doc: std::collections::HashMap<String, Best> = std::collections::HashMap::new();

    for cv in &chunk_vectors {
        let similarity = cosine_similarity(&query_vec, &cv.vector) as f64;
        if similarity <= retrieval.similarity_threshold {
            continue;
        }

        let entry = best_per_doc.entry(cv.document_id.clone()).or_insert(Best {
            similarity: f64::NEG_INFINITY,
            snippet: String::new(),
        });
        if similarity > entry.similarity {
            entry.similarity = similarity;
            entry.snippet = cv.text.chars().take(240).collect();
        }
    }

    let mut matches = Vec::with_capacity(best_per_doc.len());
    for (doc_id, best) in best_per_doc {
        let doc = store
            .get_document(&doc_id)
            .await
            .map_err(|e| crate::error::EmbedError::Provider(e.to_string()))?;
        let Some(doc) = doc else { continue };
        if !doc.is_active {
            continue;
        }
        let category = doc.doc_type.category();
        matches.push(SearchMatch {
            relevance_score: (best.similarity * 100.0).clamp(0.0, 100.0),
            snippet: best.snippet,
            category,
            document: doc,
        });
    }

    matches.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });

    Ok(matches)
}

/// Fallback path: keyword/title/type heuristics over active documents.
async fn lexical_matches(
    store: &dyn Store,
    retrieval: &RetrievalConfig,
    query: &str,
) -> Result<Vec<SearchMatch>> {
    let documents = store.list_active_documents().await?;
    let ranked = lexical::rank(query, &documents, &retrieval.lexical);

    Ok(ranked
        .into_iter()
        .map(|r| {
            let category = r.document.doc_type.category();
            SearchMatch {
                relevance_score: lexical::display_score(r.score),
                snippet: r.snippet,
                category,
                document: r.document,
            }
        })
        .collect())
}

/// Partition by category and apply the per-category limit. Input order
/// is preserved: both ranking paths hand over matches already sorted on
/// their raw score, which the display score collapses above the
/// 100-point cap.
fn partition(matches: Vec<SearchMatch>, limit: usize) -> (Vec<SearchMatch>, Vec<SearchMatch>) {
    let mut internal = Vec::new();
    let mut code = Vec::new();

    for m in matches {
        match m.category {
            MatchCategory::Internal => internal.push(m),
            MatchCategory::Code => code.push(m),
        }
    }

    internal.truncate(limit);
    code.truncate(limit);

    (internal, code)
}

/// Record surfaced matches in the background. Must never block or fail
/// the search response.
fn log_matches(store: Arc<dyn Store>, incident_id: Option<&str>, response: &RagResponse) {
    let entries: Vec<SearchLogEntry> = response
        .internal_matches
        .iter()
        .chain(response.code_matches.iter())
        .map(|m| SearchLogEntry {
            incident_id: incident_id.map(str::to_string),
            query: response.query.clone(),
            document_id: m.document.id.clone(),
            relevance_score: m.relevance_score,
            category: m.category,
            created_at: chrono::Utc::now().timestamp(),
        })
        .collect();

    if entries.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for entry in entries {
            if let Err(e) = store.log_search_result(&entry).await {
                debug!(error = %e, "search log write failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::error::EmbedError;
    use crate::models::{DocType, Document};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Embedder that returns pre-registered vectors by exact text.
    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .ok_or_else(|| EmbedError::Provider(format!("no vector for {:?}", t)))
                })
                .collect()
        }
    }

    /// Embedder that always reports quota exhaustion.
    struct QuotaEmbedder;

    #[async_trait]
    impl Embedder for QuotaEmbedder {
        fn model_name(&self) -> &str {
            "quota"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::Quota("simulated".to_string()))
        }
    }

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

    async fn seed(store: &InMemoryStore, d: &Document, vector: Option<&[f32]>) {
        store.upsert_document(d).await.unwrap();
        let chunks = crate::chunk::chunk_document(&d.id, &d.content, 2000);
        store.replace_chunks(&d.id, &chunks).await.unwrap();
        if let Some(v) = vector {
            store
                .upsert_chunk_vector(&chunks[0].id, &d.id, v, "fixed", &chunks[0].hash)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_identical_embedding_scores_100() {
        let store = Arc::new(InMemoryStore::new());
        let d = doc("d1", "Pool sizing", "database pool sizing guidance", DocType::Documentation);
        seed(&store, &d, Some(&[0.6, 0.8, 0.0])).await;

        let embedder = FixedEmbedder {
            vectors: HashMap::from([("pool sizing".to_string(), vec![0.6, 0.8, 0.0])]),
        };

        let resp = search(
            store.clone() as Arc<dyn Store>,
            &embedder,
            &RetrievalConfig::default(),
            "pool sizing",
            None,
            None,
        )
        .await
        .unwrap();

        assert!(resp.has_internal_content);
        assert_eq!(resp.internal_matches.len(), 1);
        assert!((resp.internal_matches[0].relevance_score - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_below_threshold_excluded() {
        let store = Arc::new(InMemoryStore::new());
        let d = doc("d1", "unrelated", "unrelated body text", DocType::Documentation);
        // Nearly orthogonal to the query vector.
        seed(&store, &d, Some(&[0.0, 1.0, 0.0])).await;

        let embedder = FixedEmbedder {
            vectors: HashMap::from([("query".to_string(), vec![1.0, 0.1, 0.0])]),
        };

        let resp = search(
            store.clone() as Arc<dyn Store>,
            &embedder,
            &RetrievalConfig::default(),
            "query",
            None,
            None,
        )
        .await
        .unwrap();

        assert!(!resp.has_internal_content);
        assert_eq!(resp.total_matches, 0);
    }

    #[tokio::test]
    async fn test_quota_falls_back_to_lexical_transparently() {
        let store = Arc::new(InMemoryStore::new());
        let d = doc(
            "d1",
            "DB Timeout Runbook",
            "what to do on connection timeout",
            DocType::Documentation,
        );
        seed(&store, &d, None).await;

        let resp = search(
            store.clone() as Arc<dyn Store>,
            &QuotaEmbedder,
            &RetrievalConfig::default(),
            "database connection timeout",
            None,
            None,
        )
        .await
        .unwrap();

        assert!(resp.has_internal_content);
        assert_eq!(resp.internal_matches[0].document.id, "d1");
    }

    #[tokio::test]
    async fn test_ranking_survives_display_clamp() {
        let store = Arc::new(InMemoryStore::new());
        // Both documents score well past 100 raw; the display score
        // collapses them to 100, but the stronger match must still rank
        // first despite the weaker one's smaller id.
        let weak = doc(
            "a-weak",
            "timeout",
            &"timeout ".repeat(5),
            DocType::Documentation,
        );
        let strong = doc(
            "b-strong",
            "timeout",
            &"timeout ".repeat(30),
            DocType::Documentation,
        );
        seed(&store, &weak, None).await;
        seed(&store, &strong, None).await;

        let resp = search(
            store.clone() as Arc<dyn Store>,
            &QuotaEmbedder,
            &RetrievalConfig::default(),
            "timeout",
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(resp.internal_matches.len(), 2);
        assert_eq!(resp.internal_matches[0].document.id, "b-strong");
        assert_eq!(resp.internal_matches[0].relevance_score, 100.0);
        assert_eq!(resp.internal_matches[1].relevance_score, 100.0);
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let store = Arc::new(InMemoryStore::new());
        let result = search(
            store.clone() as Arc<dyn Store>,
            &QuotaEmbedder,
            &RetrievalConfig::default(),
            "   ",
            None,
            None,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_partition_respects_per_category_limit() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..4 {
            let d = doc(
                &format!("doc{}", i),
                "timeout guide",
                "timeout handling",
                DocType::Documentation,
            );
            seed(&store, &d, None).await;
        }
        for i in 0..4 {
            let d = doc(
                &format!("code{}", i),
                "timeout handler",
                "fn handle_timeout() {}",
                DocType::Code,
            );
            seed(&store, &d, None).await;
        }

        let resp = search(
            store.clone() as Arc<dyn Store>,
            &QuotaEmbedder,
            &RetrievalConfig::default(),
            "timeout",
            None,
            Some(2),
        )
        .await
        .unwrap();

        assert_eq!(resp.internal_matches.len(), 2);
        assert_eq!(resp.code_matches.len(), 2);
        assert_eq!(resp.total_matches, 4);
    }

    #[tokio::test]
    async fn test_search_log_records_incident() {
        let store = Arc::new(InMemoryStore::new());
        let d = doc("d1", "timeout guide", "timeout handling", DocType::Documentation);
        seed(&store, &d, None).await;

        search(
            store.clone() as Arc<dyn Store>,
            &QuotaEmbedder,
            &RetrievalConfig::default(),
            "timeout",
            Some("INC-42"),
            None,
        )
        .await
        .unwrap();

        // Logging is fire-and-forget; give the spawned task a beat.
        for _ in 0..50 {
            if !store.search_log_for_incident("INC-42").await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let entries = store.search_log_for_incident("INC-42").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].document_id, "d1");
    }
}
