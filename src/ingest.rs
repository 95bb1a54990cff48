//! Document ingestion: create, update, and soft-delete knowledge
//! documents, with chunking and best-effort embedding as side effects.
//!
//! Embedding is sequential per chunk and never blocks document creation:
//! a chunk whose embedding fails is stored without a vector and the rest
//! of the batch continues. A content update invalidates and regenerates
//! every chunk for the document.

use std::sync::Arc;

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::embedding::Embedder;
use crate::error::EmbedError;
use crate::models::{DocType, Document};
use crate::store::Store;

/// Input for a new document.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    pub file_path: Option<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,
}

/// Partial update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub doc_type: Option<DocType>,
    pub tags: Option<Vec<String>>,
}

/// Create a document and index it.
pub async fn add_document(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    max_chunk_chars: usize,
    input: DocumentInput,
) -> Result<Document> {
    if input.title.trim().is_empty() {
        bail!("document title cannot be empty");
    }
    if input.content.trim().is_empty() {
        bail!("document content cannot be empty");
    }

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        title: input.title,
        content: input.content,
        doc_type: input.doc_type,
        file_path: input.file_path,
        repository: input.repository,
        tags: input.tags,
        is_active: true,
        last_updated: chrono::Utc::now().timestamp(),
    };

    store.upsert_document(&doc).await?;
    index_document(store, embedder, max_chunk_chars, &doc).await?;
    Ok(doc)
}

/// Apply a patch to a document. A content change regenerates all chunks
/// and vectors; other changes leave the index untouched.
pub async fn update_document(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    max_chunk_chars: usize,
    id: &str,
    patch: DocumentPatch,
) -> Result<Document> {
    let Some(mut doc) = store.get_document(id).await? else {
        bail!("document not found: {}", id);
    };
    if !doc.is_active {
        bail!("document is deleted: {}", id);
    }

    let mut content_changed = false;
    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            bail!("document title cannot be empty");
        }
        doc.title = title;
    }
    if let Some(content) = patch.content {
        if content.trim().is_empty() {
            bail!("document content cannot be empty");
        }
        content_changed = content != doc.content;
        doc.content = content;
    }
    if let Some(doc_type) = patch.doc_type {
        doc.doc_type = doc_type;
    }
    if let Some(tags) = patch.tags {
        doc.tags = tags;
    }
    doc.last_updated = chrono::Utc::now().timestamp();

    store.upsert_document(&doc).await?;
    if content_changed {
        index_document(store, embedder, max_chunk_chars, &doc).await?;
    }
    Ok(doc)
}

/// Soft-delete a document: marks it inactive and hard-deletes its chunks.
pub async fn delete_document(store: Arc<dyn Store>, id: &str) -> Result<()> {
    if !store.deactivate_document(id).await? {
        bail!("document not found: {}", id);
    }
    Ok(())
}

/// Chunk the document and embed each chunk sequentially, best effort.
pub async fn index_document(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    max_chunk_chars: usize,
    doc: &Document,
) -> Result<()> {
    let chunks = chunk_document(&doc.id, &doc.content, max_chunk_chars);
    store.replace_chunks(&doc.id, &chunks).await?;

    for chunk in &chunks {
        match embedder.embed(&[chunk.text.clone()]).await {
            Ok(mut vectors) if !vectors.is_empty() => {
                let vector = vectors.remove(0);
                store
                    .upsert_chunk_vector(
                        &chunk.id,
                        &doc.id,
                        &vector,
                        embedder.model_name(),
                        &chunk.hash,
                    )
                    .await?;
            }
            Ok(_) => {
                tracing::warn!(chunk = %chunk.id, "empty embedding response, chunk stored without vector");
            }
            Err(EmbedError::Disabled) => {
                // No provider configured; no chunk in this batch will embed.
                break;
            }
            Err(e) => {
                // Skip the failed chunk, keep going with the rest.
                tracing::warn!(chunk = %chunk.id, error = %e, "embedding failed, chunk stored without vector");
            }
        }
    }

    tracing::debug!(document = %doc.id, chunks = chunks.len(), "document indexed");
    Ok(())
}
