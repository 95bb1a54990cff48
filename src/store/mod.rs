//! Storage abstraction for the triage engine.
//!
//! The [`Store`] trait defines every persistence operation the retrieval
//! and analysis pipeline needs, so the engine never depends on
//! process-lifetime state or a concrete database. Backends: SQLite
//! ([`sqlite::SqliteStore`]) and in-memory ([`memory::InMemoryStore`]) for
//! tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, Document, MatchCategory, SyncState};

/// A chunk together with its stored embedding vector, as fed to the
/// similarity scan.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub start_line: i64,
    pub end_line: i64,
    pub vector: Vec<f32>,
}

/// One surfaced search match, recorded for later "was this match actually
/// used" analytics. Keyed by the originating incident when known.
#[derive(Debug, Clone, Serialize)]
pub struct SearchLogEntry {
    pub incident_id: Option<String>,
    pub query: String,
    pub document_id: String,
    pub relevance_score: f64,
    pub category: MatchCategory,
    pub created_at: i64,
}

/// Persisted sync state for a configured repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub state: SyncState,
    /// Human-readable failure detail for classified sync errors.
    pub message: Option<String>,
    pub last_synced: Option<i64>,
}

/// Abstract storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a document. Returns the document id.
    async fn upsert_document(&self, doc: &Document) -> Result<String>;

    /// Retrieve a document by id, active or not.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Find an active document by repository name and file path.
    async fn find_document_by_path(
        &self,
        repository: &str,
        file_path: &str,
    ) -> Result<Option<Document>>;

    /// All active documents.
    async fn list_active_documents(&self) -> Result<Vec<Document>>;

    /// Soft-delete a document and hard-delete its chunks and vectors.
    /// Returns false when the id does not exist.
    async fn deactivate_document(&self, id: &str) -> Result<bool>;

    /// Replace all chunks (and their vectors) for a document.
    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Store or update the embedding vector for a chunk.
    async fn upsert_chunk_vector(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()>;

    /// All chunks of active documents that have a stored vector.
    async fn active_chunk_vectors(&self) -> Result<Vec<ChunkVector>>;

    /// Append a search-result log entry. Callers treat this as
    /// fire-and-forget; failures must not affect search responses.
    async fn log_search_result(&self, entry: &SearchLogEntry) -> Result<()>;

    /// Log entries recorded for one incident, oldest first.
    async fn search_log_for_incident(&self, incident_id: &str) -> Result<Vec<SearchLogEntry>>;

    /// Persisted repository sync record, by configured name.
    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryRecord>>;

    /// Insert or update a repository sync record.
    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<()>;

    /// All repository sync records, ordered by name.
    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>>;
}
