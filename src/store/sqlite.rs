//! SQLite [`Store`] implementation.
//!
//! One WAL-mode pool per process. Schema creation is idempotent; `triage
//! init` may be run any number of times.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, DocType, Document, MatchCategory, SyncState};

use super::{ChunkVector, RepositoryRecord, SearchLogEntry, Store};

/// Open (creating if missing) the SQLite database at `db_path`.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create all tables and indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            file_path TEXT,
            repository TEXT,
            tags_json TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            last_updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            incident_id TEXT,
            query TEXT NOT NULL,
            document_id TEXT NOT NULL,
            relevance_score REAL NOT NULL,
            category TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            branch TEXT NOT NULL,
            state TEXT NOT NULL,
            message TEXT,
            last_synced INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_repository ON documents(repository)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_search_log_incident ON search_log(incident_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let doc_type_str: String = row.get("doc_type");
    let tags_json: String = row.get("tags_json");
    let is_active: i64 = row.get("is_active");

    Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        doc_type: DocType::parse(&doc_type_str).unwrap_or(DocType::Other),
        file_path: row.get("file_path"),
        repository: row.get("repository"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        is_active: is_active != 0,
        last_updated: row.get("last_updated"),
    }
}

fn row_to_repository(row: &sqlx::sqlite::SqliteRow) -> RepositoryRecord {
    let state_str: String = row.get("state");
    RepositoryRecord {
        name: row.get("name"),
        owner: row.get("owner"),
        repo: row.get("repo"),
        branch: row.get("branch"),
        state: SyncState::parse(&state_str).unwrap_or(SyncState::Failed),
        message: row.get("message"),
        last_synced: row.get("last_synced"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<String> {
        let tags_json = serde_json::to_string(&doc.tags)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, doc_type, file_path, repository, tags_json, is_active, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                doc_type = excluded.doc_type,
                file_path = excluded.file_path,
                repository = excluded.repository,
                tags_json = excluded.tags_json,
                is_active = excluded.is_active,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(doc.doc_type.as_str())
        .bind(&doc.file_path)
        .bind(&doc.repository)
        .bind(&tags_json)
        .bind(doc.is_active as i64)
        .bind(doc.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(doc.id.clone())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn find_document_by_path(
        &self,
        repository: &str,
        file_path: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE repository = ? AND file_path = ? AND is_active = 1",
        )
        .bind(repository)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_active_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn deactivate_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE documents SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, start_line, end_line, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_chunk_vector(
        &self,
        chunk_id: &str,
        document_id: &str,
        vector: &[f32],
        model: &str,
        content_hash: &str,
    ) -> Result<()> {
        let blob = vec_to_blob(vector);

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, embedding, model, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                embedding = excluded.embedding,
                model = excluded.model,
                hash = excluded.hash
            "#,
        )
        .bind(chunk_id)
        .bind(document_id)
        .bind(&blob)
        .bind(model)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_chunk_vectors(&self) -> Result<Vec<ChunkVector>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding,
                   c.text, c.start_line, c.end_line
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            WHERE d.is_active = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkVector {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    text: row.get("text"),
                    start_line: row.get("start_line"),
                    end_line: row.get("end_line"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn log_search_result(&self, entry: &SearchLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_log (incident_id, query, document_id, relevance_score, category, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.incident_id)
        .bind(&entry.query)
        .bind(&entry.document_id)
        .bind(entry.relevance_score)
        .bind(entry.category.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search_log_for_incident(&self, incident_id: &str) -> Result<Vec<SearchLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM search_log WHERE incident_id = ? ORDER BY id",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let category: String = row.get("category");
                SearchLogEntry {
                    incident_id: row.get("incident_id"),
                    query: row.get("query"),
                    document_id: row.get("document_id"),
                    relevance_score: row.get("relevance_score"),
                    category: if category == "internal" {
                        MatchCategory::Internal
                    } else {
                        MatchCategory::Code
                    },
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryRecord>> {
        let row = sqlx::query("SELECT * FROM repositories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_repository))
    }

    async fn upsert_repository(&self, record: &RepositoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repositories (name, owner, repo, branch, state, message, last_synced)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                owner = excluded.owner,
                repo = excluded.repo,
                branch = excluded.branch,
                state = excluded.state,
                message = excluded.message,
                last_synced = excluded.last_synced
            "#,
        )
        .bind(&record.name)
        .bind(&record.owner)
        .bind(&record.repo)
        .bind(&record.branch)
        .bind(record.state.as_str())
        .bind(&record.message)
        .bind(record.last_synced)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let rows = sqlx::query("SELECT * FROM repositories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_repository).collect())
    }
}
