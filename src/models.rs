//! Core data models for the triage engine.
//!
//! These types represent the documents, chunks, search results, exception
//! facts, and remediation actions that flow through the retrieval and
//! analysis pipeline.

use serde::{Deserialize, Serialize};

/// Kind of knowledge document. Drives the internal/code partition in
/// search results and the type boosts in the lexical ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Documentation,
    Runbook,
    Troubleshooting,
    Code,
    Config,
    Readme,
    Other,
}

impl DocType {
    /// Derived match category. Never stored independently.
    pub fn category(&self) -> MatchCategory {
        match self {
            DocType::Documentation | DocType::Runbook | DocType::Troubleshooting => {
                MatchCategory::Internal
            }
            DocType::Code | DocType::Config | DocType::Readme | DocType::Other => {
                MatchCategory::Code
            }
        }
    }

    pub fn parse(s: &str) -> Option<DocType> {
        match s.to_lowercase().as_str() {
            "documentation" => Some(DocType::Documentation),
            "runbook" => Some(DocType::Runbook),
            "troubleshooting" => Some(DocType::Troubleshooting),
            "code" => Some(DocType::Code),
            "config" => Some(DocType::Config),
            "readme" => Some(DocType::Readme),
            "other" => Some(DocType::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Documentation => "documentation",
            DocType::Runbook => "runbook",
            DocType::Troubleshooting => "troubleshooting",
            DocType::Code => "code",
            DocType::Config => "config",
            DocType::Readme => "readme",
            DocType::Other => "other",
        }
    }
}

/// Which side of the RAG partition a match lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchCategory {
    Internal,
    Code,
}

impl MatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCategory::Internal => "internal",
            MatchCategory::Code => "code",
        }
    }
}

/// A knowledge document: uploaded text, a runbook, or a source file
/// ingested from a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    pub file_path: Option<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,
    /// Soft-delete flag. An inactive document has no live chunks.
    pub is_active: bool,
    pub last_updated: i64,
}

/// A line-bounded chunk of a document's content, the unit of embedding.
///
/// `start_line`/`end_line` are 1-based and inclusive; chunks for a document
/// are contiguous and non-overlapping.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start_line: i64,
    pub end_line: i64,
    pub hash: String,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub document: Document,
    /// Clamped to `[0, 100]` for display.
    pub relevance_score: f64,
    pub snippet: String,
    pub category: MatchCategory,
}

/// Composed retrieval response, partitioned by match category.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub internal_matches: Vec<SearchMatch>,
    pub code_matches: Vec<SearchMatch>,
    pub has_internal_content: bool,
    pub query: String,
    pub total_matches: usize,
}

impl RagResponse {
    pub fn new(
        query: String,
        internal_matches: Vec<SearchMatch>,
        code_matches: Vec<SearchMatch>,
    ) -> Self {
        let has_internal_content = !internal_matches.is_empty() || !code_matches.is_empty();
        let total_matches = internal_matches.len() + code_matches.len();
        Self {
            internal_matches,
            code_matches,
            has_internal_content,
            query,
            total_matches,
        }
    }

    pub fn empty(query: String) -> Self {
        Self::new(query, Vec::new(), Vec::new())
    }
}

/// Constraint kind recognized in validation failures. Only uniqueness is
/// inferred specifically; everything else is the generic bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintType {
    Unique,
    Generic,
}

/// Parsed detail of a constraint-violation message of the form
/// `<package>.<Entity>.<field>: <message>`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    pub entity_class: String,
    pub field_name: String,
    pub violation_message: String,
    pub constraint_type: ConstraintType,
}

/// Structured record extracted from one exception signature in a log.
///
/// Ephemeral: produced by the extractor and consumed immediately by the
/// remediation synthesizer, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionFact {
    pub exception_type: String,
    pub message: String,
    pub affected_class: Option<String>,
    pub affected_method: Option<String>,
    pub line_number: Option<u32>,
    pub file_path: Option<String>,
    pub is_validation_error: bool,
    pub validation: Option<ValidationDetail>,
}

/// Priority of a remediation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Closed set of remediation action kinds, so the synthesizer's
/// type-specific branches stay exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NullCheck,
    DefensiveOptional,
    ExceptionHandler,
    RegexRepair,
    DuplicateGuard,
    CentralErrorHandler,
    ValidationFix,
    RequestBodyFix,
    UploadContext,
    Suggested,
}

/// A prioritized, source-attributed suggested fix.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationAction {
    pub action_type: ActionType,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub estimated_time: String,
    /// Id of the document the fix points into, where resolved.
    pub source_document: Option<String>,
    pub source_type: Option<DocType>,
    /// `File.java:123`-style location, where known.
    pub source_location: Option<String>,
}

/// Incident severity as reported by analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Severity> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Where an analysis result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    /// A language-model provider, by configured name.
    Provider(String),
    /// The fully deterministic extract-and-synthesize path.
    Deterministic,
}

/// Final analysis returned to the calling workflow.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub severity: Severity,
    pub affected_systems: Vec<String>,
    pub root_cause: String,
    pub actions: Vec<RemediationAction>,
    pub knowledge_base_entry: Option<String>,
    /// 0–100.
    pub confidence: u8,
    pub source: AnalysisSource,
}

/// Repository sync lifecycle. Terminal states are per attempt; a new
/// attempt restarts from `Syncing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Syncing,
    Completed,
    Failed,
    AuthError,
    AccessDenied,
    NotFound,
    RateLimited,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncState::Pending | SyncState::Syncing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
            SyncState::AuthError => "auth_error",
            SyncState::AccessDenied => "access_denied",
            SyncState::NotFound => "not_found",
            SyncState::RateLimited => "rate_limited",
        }
    }

    pub fn parse(s: &str) -> Option<SyncState> {
        match s {
            "pending" => Some(SyncState::Pending),
            "syncing" => Some(SyncState::Syncing),
            "completed" => Some(SyncState::Completed),
            "failed" => Some(SyncState::Failed),
            "auth_error" => Some(SyncState::AuthError),
            "access_denied" => Some(SyncState::AccessDenied),
            "not_found" => Some(SyncState::NotFound),
            "rate_limited" => Some(SyncState::RateLimited),
            _ => None,
        }
    }
}
