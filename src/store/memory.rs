//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! The vector scan is brute force over all stored vectors, which matches
//! the engine's similarity search exactly.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document};

use super::{ChunkVector, RepositoryRecord, SearchLogEntry, Store};

struct StoredChunk {
    chunk: Chunk,
    vector: Option<Vec<f32>>,
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
    search_log: RwLock<Vec<SearchLogEntry>>,
    repositories: RwLock<HashMap<String, RepositoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live chunks for a document. Test helper for the
    /// soft-delete invariant.
    pub fn chunk_count(&self, document_id: &str) -> usize {
        self.chunks
            .read()
            .unwrap()
            .iter()
            .filter(|sc| sc.chunk.document_id == document_id)
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc.id.clone())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn find_document_by_path(
        &self,
        repository: &str,
        file_path: &str,
    ) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .values()
            .find(|d| {
                d.is_active
                    && d.repository.as_deref() == Some(repository)
                    && d.file_path.as_deref() == Some(file_path)
            })
            .cloned())
    }

    async fn list_active_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .docs
            .read()
            .unwrap()
            .values()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn deactivate_document(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        let Some(doc) = docs.get_mut(id) else {
            return Ok(false);
        };
        doc.is_active = false;
        drop(docs);

        self.chunks
            .write()
            .unwrap()
            .retain(|sc| sc.chunk.document_id != id);
        Ok(true)
    }

    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        stored.retain(|sc| sc.chunk.document_id != document_id);
        for c in chunks {
            stored.push(StoredChunk {
                chunk: c.clone(),
                vector: None,
            });
        }
        Ok(())
    }

    async fn upsert_chunk_vector(
        &self,
        chunk_id: &str,
        _document_id: &str,
        vector: &[f32],
        _model: &str,
        _content_hash: &str,
    ) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        if let Some(sc) = stored.iter_mut().find(|sc| sc.chunk.id == chunk_id) {
            sc.vector = Some(vector.to_vec());
        }
        Ok(())
    }

    async fn active_chunk_vectors(&self) -> Result<Vec<ChunkVector>> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|sc| {
                sc.vector.is_some()
                    && docs
                        .get(&sc.chunk.document_id)
                        .map(|d| d.is_active)
                        .unwrap_or(false)
            })
            .map(|sc| ChunkVector {
                chunk_id: sc.chunk.id.clone(),
                document_id: sc.chunk.document_id.clone(),
                text: sc.chunk.text.clone(),
                start_line: sc.chunk.start_line,
                end_line: sc.chunk.end_line,
                vector: sc.vector.clone().unwrap(),
            })
            .collect())
    }

    async fn log_search_result(&self, entry: &SearchLogEntry) -> Result<()> {
        self.search_log.write().unwrap().push(entry.clone());
        Ok(())
    }

    async fn search_log_for_incident(&self, incident_id: &str) -> Result<Vec<SearchLogEntry>> {
        Ok(self
            .search_log
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.incident_id.as_deref() == Some(incident_id))
            .cloned()
            .collect())
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryRecord>> {
        Ok(self.repositories.read().unwrap().get(name).cloned())
    }

    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<()> {
        self.repositories
            .write()
            .unwrap()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let mut records: Vec<RepositoryRecord> =
            self.repositories.read().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}
