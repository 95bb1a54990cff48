//! Repository content sync via a GitHub-style contents API.
//!
//! Walks the remote tree with an explicit work queue of `(path, depth)`
//! items, capped at depth 10 to bound the number of outbound calls.
//! Fetches are serial; one file's failure is isolated and never aborts
//! the sync. A repository configured for `main` that only has `master`
//! falls back transparently, persisting the corrected branch.
//!
//! Every attempt starts from `Syncing` and ends in a terminal state on
//! the repository record: `Completed`, or a classified failure
//! (`AuthError`, `AccessDenied`, `NotFound`, `RateLimited`, `Failed`)
//! with a human-readable message.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::RepositoryConfig;
use crate::embedding::Embedder;
use crate::error::SyncError;
use crate::ingest::index_document;
use crate::models::{DocType, Document, SyncState};
use crate::store::{RepositoryRecord, Store};

/// Hard bound on remote tree recursion.
pub const MAX_SYNC_DEPTH: u32 = 10;

/// One entry of a remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

/// Source-hosting contents API: list a directory, fetch a file. The
/// GitHub implementation is [`GitHubContentsApi`]; tests substitute a
/// fake tree.
#[async_trait]
pub trait ContentsApi: Send + Sync {
    async fn list_dir(&self, path: &str, branch: &str) -> Result<Vec<RemoteEntry>, SyncError>;

    /// Fetch a file's decoded text content.
    async fn fetch_file(&self, path: &str, branch: &str) -> Result<String, SyncError>;
}

/// Sync one configured repository into the document store. Returns the
/// terminal state, which is also persisted on the repository record.
pub async fn sync_repository(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    max_chunk_chars: usize,
    name: &str,
    config: &RepositoryConfig,
    api: &dyn ContentsApi,
) -> Result<SyncState> {
    // A re-sync keeps a previously corrected branch.
    let branch = match store.get_repository(name).await? {
        Some(record) => record.branch,
        None => config.branch.clone(),
    };

    let mut record = RepositoryRecord {
        name: name.to_string(),
        owner: config.owner.clone(),
        repo: config.repo.clone(),
        branch,
        state: SyncState::Syncing,
        message: None,
        last_synced: None,
    };
    store.upsert_repository(&record).await?;

    let root_listing = match api.list_dir(&config.root, &record.branch).await {
        Ok(listing) => listing,
        Err(SyncError::NotFound(_)) if record.branch == "main" => {
            // The default branch may be the older convention.
            match api.list_dir(&config.root, "master").await {
                Ok(listing) => {
                    tracing::info!(repository = name, "branch main not found, using master");
                    record.branch = "master".to_string();
                    listing
                }
                Err(e) => return finish_failed(store, record, e).await,
            }
        }
        Err(e) => return finish_failed(store, record, e).await,
    };

    let mut queue: VecDeque<(Vec<RemoteEntry>, u32)> = VecDeque::new();
    queue.push_back((root_listing, 0));
    let mut synced_files = 0usize;

    while let Some((entries, depth)) = queue.pop_front() {
        for entry in entries {
            if entry.is_dir {
                if depth + 1 > MAX_SYNC_DEPTH {
                    tracing::warn!(path = %entry.path, "depth limit reached, skipping subtree");
                    continue;
                }
                match api.list_dir(&entry.path, &record.branch).await {
                    Ok(listing) => queue.push_back((listing, depth + 1)),
                    // Credential problems will fail every remaining call.
                    Err(e @ (SyncError::Auth(_) | SyncError::RateLimited(_))) => {
                        return finish_failed(store, record, e).await;
                    }
                    Err(e) => {
                        tracing::warn!(path = %entry.path, error = %e, "directory listing failed, skipping subtree");
                    }
                }
                continue;
            }

            let Some(doc_type) = classify_file(&entry.name) else {
                continue;
            };

            let content = match api.fetch_file(&entry.path, &record.branch).await {
                Ok(content) => content,
                Err(e @ (SyncError::Auth(_) | SyncError::RateLimited(_))) => {
                    return finish_failed(store, record, e).await;
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "file fetch failed, skipping");
                    continue;
                }
            };

            if let Err(e) = upsert_file(
                store.clone(),
                embedder,
                max_chunk_chars,
                name,
                &entry,
                doc_type,
                content,
            )
            .await
            {
                tracing::warn!(path = %entry.path, error = %e, "file ingest failed, skipping");
                continue;
            }
            synced_files += 1;
        }
    }

    record.state = SyncState::Completed;
    record.message = None;
    record.last_synced = Some(chrono::Utc::now().timestamp());
    store.upsert_repository(&record).await?;
    tracing::info!(repository = name, files = synced_files, branch = %record.branch, "sync completed");
    Ok(SyncState::Completed)
}

async fn finish_failed(
    store: Arc<dyn Store>,
    mut record: RepositoryRecord,
    err: SyncError,
) -> Result<SyncState> {
    let state = match &err {
        SyncError::Auth(_) => SyncState::AuthError,
        SyncError::AccessDenied(_) => SyncState::AccessDenied,
        SyncError::NotFound(_) => SyncState::NotFound,
        SyncError::RateLimited(_) => SyncState::RateLimited,
        SyncError::Other(_) => SyncState::Failed,
    };
    record.state = state;
    record.message = Some(err.to_string());
    record.last_synced = Some(chrono::Utc::now().timestamp());
    store.upsert_repository(&record).await?;
    tracing::warn!(repository = %record.name, state = state.as_str(), "sync failed");
    Ok(state)
}

/// Create or update the document backing one synced file. Unchanged
/// content (by hash) skips re-chunking entirely.
async fn upsert_file(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    max_chunk_chars: usize,
    repository: &str,
    entry: &RemoteEntry,
    doc_type: DocType,
    content: String,
) -> Result<()> {
    if content.trim().is_empty() {
        return Ok(());
    }

    let new_hash = content_hash(&content);

    if let Some(mut existing) = store.find_document_by_path(repository, &entry.path).await? {
        if content_hash(&existing.content) == new_hash {
            return Ok(());
        }
        existing.content = content;
        existing.doc_type = doc_type;
        existing.last_updated = chrono::Utc::now().timestamp();
        store.upsert_document(&existing).await?;
        index_document(store, embedder, max_chunk_chars, &existing).await?;
        return Ok(());
    }

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        title: entry.name.clone(),
        content,
        doc_type,
        file_path: Some(entry.path.clone()),
        repository: Some(repository.to_string()),
        tags: Vec::new(),
        is_active: true,
        last_updated: chrono::Utc::now().timestamp(),
    };
    store.upsert_document(&doc).await?;
    index_document(store, embedder, max_chunk_chars, &doc).await?;
    Ok(())
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Document type for a synced file, by name and extension. `None` means
/// the file is skipped (binaries, lockfiles, unknown formats).
pub fn classify_file(name: &str) -> Option<DocType> {
    let lower = name.to_lowercase();
    if lower.starts_with("readme") {
        return Some(DocType::Readme);
    }
    let ext = lower.rsplit('.').next()?;
    match ext {
        "md" | "markdown" | "rst" | "adoc" | "txt" => Some(DocType::Documentation),
        "java" | "kt" | "scala" | "groovy" | "rs" | "go" | "py" | "rb" | "js" | "jsx" | "ts"
        | "tsx" | "c" | "h" | "cpp" | "cs" | "php" | "sql" | "sh" => Some(DocType::Code),
        "yml" | "yaml" | "toml" | "json" | "xml" | "properties" | "ini" | "env" | "conf" => {
            Some(DocType::Config)
        }
        _ => None,
    }
}

// ============ GitHub implementation ============

/// Contents API client for GitHub (or a GitHub-compatible host via
/// `api_base`). Token is read from the configured environment variable
/// when present; anonymous access works for public repositories.
pub struct GitHubContentsApi {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GitHubContentsApi {
    pub fn new(config: &RepositoryConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("triage-engine")
            .build()
            .map_err(|e| SyncError::Other(e.to_string()))?;

        let token = config
            .token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok());

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            format!(
                "{}/repos/{}/{}/contents",
                self.api_base, self.owner, self.repo
            )
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}",
                self.api_base, self.owner, self.repo, trimmed
            )
        }
    }

    async fn get(&self, path: &str, branch: &str) -> Result<serde_json::Value, SyncError> {
        let mut request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", branch)])
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Other(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SyncError::Other(e.to_string()));
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false);
        let body = response.text().await.unwrap_or_default();
        let detail = format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        );

        Err(match status.as_u16() {
            401 => SyncError::Auth(detail),
            403 if rate_limited || body.to_lowercase().contains("rate limit") => {
                SyncError::RateLimited(detail)
            }
            403 => SyncError::AccessDenied(detail),
            404 => SyncError::NotFound(detail),
            _ => SyncError::Other(detail),
        })
    }
}

#[async_trait]
impl ContentsApi for GitHubContentsApi {
    async fn list_dir(&self, path: &str, branch: &str) -> Result<Vec<RemoteEntry>, SyncError> {
        let json = self.get(path, branch).await?;
        let entries = json
            .as_array()
            .ok_or_else(|| SyncError::Other(format!("{} is not a directory", path)))?;

        Ok(entries
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?.to_string();
                let path = item.get("path")?.as_str()?.to_string();
                let kind = item.get("type")?.as_str()?;
                Some(RemoteEntry {
                    name,
                    path,
                    is_dir: kind == "dir",
                })
            })
            .collect())
    }

    async fn fetch_file(&self, path: &str, branch: &str) -> Result<String, SyncError> {
        let json = self.get(path, branch).await?;
        let encoded = json
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| SyncError::Other(format!("{}: no content field", path)))?;

        // GitHub wraps base64 content at 60 columns.
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| SyncError::Other(format!("{}: invalid base64: {}", path, e)))?;

        String::from_utf8(bytes).map_err(|e| SyncError::Other(format!("{}: not utf-8: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbedder;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashMap;

    /// Fake contents API over an in-memory tree, keyed by branch.
    #[derive(Default)]
    struct FakeApi {
        // branch -> dir path -> entries
        dirs: HashMap<String, HashMap<String, Vec<RemoteEntry>>>,
        // branch -> file path -> content (Err marks a failing fetch)
        files: HashMap<String, HashMap<String, Result<String, ()>>>,
    }

    impl FakeApi {
        fn add_dir(&mut self, branch: &str, path: &str, entries: Vec<RemoteEntry>) {
            self.dirs
                .entry(branch.to_string())
                .or_default()
                .insert(path.to_string(), entries);
        }

        fn add_file(&mut self, branch: &str, path: &str, content: &str) {
            self.files
                .entry(branch.to_string())
                .or_default()
                .insert(path.to_string(), Ok(content.to_string()));
        }

        fn add_broken_file(&mut self, branch: &str, path: &str) {
            self.files
                .entry(branch.to_string())
                .or_default()
                .insert(path.to_string(), Err(()));
        }
    }

    fn file(name: &str, path: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            path: path.to_string(),
            is_dir: false,
        }
    }

    fn dir(name: &str, path: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            path: path.to_string(),
            is_dir: true,
        }
    }

    #[async_trait]
    impl ContentsApi for FakeApi {
        async fn list_dir(&self, path: &str, branch: &str) -> Result<Vec<RemoteEntry>, SyncError> {
            self.dirs
                .get(branch)
                .and_then(|d| d.get(path))
                .cloned()
                .ok_or_else(|| SyncError::NotFound(format!("{}@{}", path, branch)))
        }

        async fn fetch_file(&self, path: &str, branch: &str) -> Result<String, SyncError> {
            match self.files.get(branch).and_then(|f| f.get(path)) {
                Some(Ok(content)) => Ok(content.clone()),
                Some(Err(())) => Err(SyncError::Other("corrupt".to_string())),
                None => Err(SyncError::NotFound(format!("{}@{}", path, branch))),
            }
        }
    }

    struct AuthFailApi;

    #[async_trait]
    impl ContentsApi for AuthFailApi {
        async fn list_dir(&self, _: &str, _: &str) -> Result<Vec<RemoteEntry>, SyncError> {
            Err(SyncError::Auth("HTTP 401: bad credentials".to_string()))
        }

        async fn fetch_file(&self, _: &str, _: &str) -> Result<String, SyncError> {
            Err(SyncError::Auth("HTTP 401: bad credentials".to_string()))
        }
    }

    fn config() -> RepositoryConfig {
        RepositoryConfig {
            api_base: "https://api.github.com".to_string(),
            owner: "acme".to_string(),
            repo: "orders".to_string(),
            branch: "main".to_string(),
            token_env: None,
            root: "".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_sync_ingests_tree() {
        let mut api = FakeApi::default();
        api.add_dir(
            "main",
            "",
            vec![file("README.md", "README.md"), dir("src", "src")],
        );
        api.add_dir("main", "src", vec![file("OrderService.java", "src/OrderService.java")]);
        api.add_file("main", "README.md", "# Orders service");
        api.add_file("main", "src/OrderService.java", "public class OrderService {}");

        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        assert_eq!(state, SyncState::Completed);
        let docs = store.list_active_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        let readme = store
            .find_document_by_path("backend", "README.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(readme.doc_type, DocType::Readme);
        let code = store
            .find_document_by_path("backend", "src/OrderService.java")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.doc_type, DocType::Code);
    }

    #[tokio::test]
    async fn test_missing_main_falls_back_to_master() {
        let mut api = FakeApi::default();
        api.add_dir("master", "", vec![file("README.md", "README.md")]);
        api.add_file("master", "README.md", "# legacy layout");

        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        assert_eq!(state, SyncState::Completed);
        let record = store.get_repository("backend").await.unwrap().unwrap();
        assert_eq!(record.state, SyncState::Completed);
        assert_eq!(record.branch, "master");
        assert!(record.message.is_none());
    }

    #[tokio::test]
    async fn test_missing_on_both_branches_is_not_found() {
        let api = FakeApi::default();
        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        assert_eq!(state, SyncState::NotFound);
        let record = store.get_repository("backend").await.unwrap().unwrap();
        assert_eq!(record.state, SyncState::NotFound);
        assert!(record.message.is_some());
    }

    #[tokio::test]
    async fn test_auth_failure_is_classified_and_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(
            store.clone(),
            &DisabledEmbedder,
            2000,
            "backend",
            &config(),
            &AuthFailApi,
        )
        .await
        .unwrap();

        assert_eq!(state, SyncState::AuthError);
        let record = store.get_repository("backend").await.unwrap().unwrap();
        assert_eq!(record.state, SyncState::AuthError);
        assert!(record.message.as_deref().unwrap().contains("bad credentials"));
    }

    #[tokio::test]
    async fn test_one_bad_file_does_not_abort_sync() {
        let mut api = FakeApi::default();
        api.add_dir(
            "main",
            "",
            vec![file("good.md", "good.md"), file("bad.md", "bad.md")],
        );
        api.add_file("main", "good.md", "fine");
        api.add_broken_file("main", "bad.md");

        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        assert_eq!(state, SyncState::Completed);
        assert_eq!(store.list_active_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_depth_limit_bounds_recursion() {
        let mut api = FakeApi::default();
        // A chain of nested directories, one file at each level.
        let mut parent = String::new();
        for depth in 0..15 {
            let dir_path = if parent.is_empty() {
                format!("d{}", depth)
            } else {
                format!("{}/d{}", parent, depth)
            };
            let file_path = if parent.is_empty() {
                format!("f{}.md", depth)
            } else {
                format!("{}/f{}.md", parent, depth)
            };
            api.add_dir(
                "main",
                &parent,
                vec![
                    file(&format!("f{}.md", depth), &file_path),
                    dir(&format!("d{}", depth), &dir_path),
                ],
            );
            api.add_file("main", &file_path, "content");
            parent = dir_path;
        }
        api.add_dir("main", &parent, vec![]);

        let store = Arc::new(InMemoryStore::new());
        let state = sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        assert_eq!(state, SyncState::Completed);
        // Files at depth 0..=10 were reached; deeper levels were cut off.
        let docs = store.list_active_documents().await.unwrap();
        assert_eq!(docs.len(), (MAX_SYNC_DEPTH + 1) as usize);
    }

    #[tokio::test]
    async fn test_unchanged_content_skips_rechunk() {
        let mut api = FakeApi::default();
        api.add_dir("main", "", vec![file("guide.md", "guide.md")]);
        api.add_file("main", "guide.md", "stable content");

        let store = Arc::new(InMemoryStore::new());
        sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        let doc = store
            .find_document_by_path("backend", "guide.md")
            .await
            .unwrap()
            .unwrap();
        let first_updated = doc.last_updated;

        sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        let doc = store
            .find_document_by_path("backend", "guide.md")
            .await
            .unwrap()
            .unwrap();
        // Untouched: the document record was not rewritten.
        assert_eq!(doc.last_updated, first_updated);
        assert_eq!(store.list_active_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_content_reingested() {
        let mut api = FakeApi::default();
        api.add_dir("main", "", vec![file("guide.md", "guide.md")]);
        api.add_file("main", "guide.md", "version one");

        let store = Arc::new(InMemoryStore::new());
        sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        api.add_file("main", "guide.md", "version two");
        sync_repository(store.clone(), &DisabledEmbedder, 2000, "backend", &config(), &api)
            .await
            .unwrap();

        let doc = store
            .find_document_by_path("backend", "guide.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.content, "version two");
        // Still one document, updated in place.
        assert_eq!(store.list_active_documents().await.unwrap().len(), 1);
    }

    #[test]
    fn test_file_classification() {
        assert_eq!(classify_file("README.md"), Some(DocType::Readme));
        assert_eq!(classify_file("guide.md"), Some(DocType::Documentation));
        assert_eq!(classify_file("OrderService.java"), Some(DocType::Code));
        assert_eq!(classify_file("application.yml"), Some(DocType::Config));
        assert_eq!(classify_file("logo.png"), None);
        assert_eq!(classify_file("binary"), None);
    }
}
