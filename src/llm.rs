//! Language-model providers for log analysis.
//!
//! Defines the [`CompletionProvider`] trait with OpenAI (chat
//! completions) and Anthropic (messages) implementations. Each provider
//! call is a single attempt with classified failures; retrying is the
//! orchestrator's job, done by moving to the next link in the fallback
//! chain rather than hammering the same provider.
//!
//! Also owns the analysis prompt and the fixed JSON response shape:
//! [`build_prompt`] embeds the retrieved context, and [`parse_analysis`]
//! turns raw model output into an [`AnalysisResult`], treating anything
//! unparseable as [`CompletionError::Malformed`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{LlmConfig, LlmProviderConfig};
use crate::error::CompletionError;
use crate::models::{
    ActionType, AnalysisResult, AnalysisSource, Priority, RagResponse, RemediationAction, Severity,
};

/// Trait for language-model completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Label used in logs and result provenance.
    fn name(&self) -> &str;

    /// Complete a prompt, returning the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Build the ordered provider chain from configuration. Providers whose
/// API key is not present in the environment are skipped with a warning
/// rather than failing the whole chain.
pub fn create_providers(config: &LlmConfig) -> Vec<Box<dyn CompletionProvider>> {
    let mut providers: Vec<Box<dyn CompletionProvider>> = Vec::new();
    for p in &config.providers {
        let key_env = api_key_env(p);
        if std::env::var(&key_env).is_err() {
            tracing::warn!(
                provider = %p.name,
                env = %key_env,
                "skipping llm provider, API key not set"
            );
            continue;
        }
        match p.kind.as_str() {
            "openai" => providers.push(Box::new(OpenAiProvider::new(p.clone()))),
            "anthropic" => providers.push(Box::new(AnthropicProvider::new(p.clone()))),
            other => {
                tracing::warn!(provider = %p.name, kind = %other, "unknown llm provider kind");
            }
        }
    }
    providers
}

fn api_key_env(p: &LlmProviderConfig) -> String {
    p.api_key_env.clone().unwrap_or_else(|| {
        match p.kind.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            _ => "OPENAI_API_KEY",
        }
        .to_string()
    })
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> CompletionError {
    let detail = format!(
        "HTTP {}: {}",
        status,
        body.chars().take(200).collect::<String>()
    );
    match status.as_u16() {
        429 => CompletionError::RateLimited(detail),
        401 | 403 => CompletionError::Auth(detail),
        _ => CompletionError::Other(detail),
    }
}

// ============ OpenAI provider ============

/// Chat-completions provider against the OpenAI API.
pub struct OpenAiProvider {
    config: LlmProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = std::env::var(api_key_env(&self.config))
            .map_err(|_| CompletionError::Auth("API key not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".to_string()))
    }
}

// ============ Anthropic provider ============

/// Messages-API provider against the Anthropic API.
pub struct AnthropicProvider {
    config: LlmProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: LlmProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = std::env::var(api_key_env(&self.config))
            .map_err(|_| CompletionError::Auth("API key not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        json.get("content")
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Malformed("missing content[0].text".to_string()))
    }
}

// ============ Prompt and response shape ============

const CONTEXT_SNIPPET_CHARS: usize = 1500;
const LOG_CHARS: usize = 4000;

/// Build the analysis prompt. Retrieved internal context is placed first
/// with an explicit instruction to prefer it over general knowledge.
pub fn build_prompt(log_text: &str, summary: &str, rag: &RagResponse) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are an incident-triage assistant. Analyze the log below and respond with ONLY a JSON object of this exact shape:\n\
         {\n\
           \"severity\": \"low|medium|high|critical\",\n\
           \"affected_systems\": [\"...\"],\n\
           \"root_cause\": \"...\",\n\
           \"recommended_actions\": [{\"title\": \"...\", \"description\": \"...\", \"priority\": \"LOW|MEDIUM|HIGH|CRITICAL\", \"estimated_time\": \"...\"}],\n\
           \"knowledge_base_entry\": \"...\",\n\
           \"confidence\": 0\n\
         }\n\n",
    );

    if rag.has_internal_content {
        prompt.push_str(
            "Internal knowledge-base context was retrieved for this incident. \
             Prefer it over general knowledge; cite the document titles you rely on.\n\n",
        );
        if !rag.internal_matches.is_empty() {
            prompt.push_str("## Internal documentation\n");
            for m in &rag.internal_matches {
                push_context(&mut prompt, &m.document.title, &m.snippet);
            }
        }
        if !rag.code_matches.is_empty() {
            prompt.push_str("## Source files\n");
            for m in &rag.code_matches {
                let label = m.document.file_path.as_deref().unwrap_or(&m.document.title);
                push_context(&mut prompt, label, &m.snippet);
            }
        }
    }

    if !summary.is_empty() {
        prompt.push_str("## Incident summary\n");
        prompt.push_str(summary);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Log\n```\n");
    prompt.push_str(&truncate_chars(log_text, LOG_CHARS));
    prompt.push_str("\n```\n");
    prompt
}

fn push_context(prompt: &mut String, label: &str, snippet: &str) {
    prompt.push_str("### ");
    prompt.push_str(label);
    prompt.push('\n');
    prompt.push_str(&truncate_chars(snippet, CONTEXT_SNIPPET_CHARS));
    prompt.push_str("\n\n");
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Parse a model response into an [`AnalysisResult`]. Code fences are
/// stripped first; any missing or malformed required field is a
/// [`CompletionError::Malformed`], which the orchestrator treats the same
/// as a transport failure.
pub fn parse_analysis(provider_name: &str, raw: &str) -> Result<AnalysisResult, CompletionError> {
    let stripped = strip_code_fences(raw);
    let json: serde_json::Value = serde_json::from_str(stripped.trim())
        .map_err(|e| CompletionError::Malformed(format!("not valid JSON: {}", e)))?;

    let severity = json
        .get("severity")
        .and_then(|s| s.as_str())
        .and_then(Severity::parse)
        .ok_or_else(|| CompletionError::Malformed("missing or invalid severity".to_string()))?;

    let root_cause = json
        .get("root_cause")
        .and_then(|s| s.as_str())
        .ok_or_else(|| CompletionError::Malformed("missing root_cause".to_string()))?
        .to_string();

    let affected_systems = json
        .get("affected_systems")
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let actions = json
        .get("recommended_actions")
        .and_then(|a| a.as_array())
        .map(|arr| arr.iter().filter_map(parse_action).collect())
        .unwrap_or_default();

    let knowledge_base_entry = json
        .get("knowledge_base_entry")
        .and_then(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let confidence = json
        .get("confidence")
        .and_then(|c| c.as_u64())
        .map(|c| c.min(100) as u8)
        .unwrap_or(70);

    Ok(AnalysisResult {
        severity,
        affected_systems,
        root_cause,
        actions,
        knowledge_base_entry,
        confidence,
        source: AnalysisSource::Provider(provider_name.to_string()),
    })
}

fn parse_action(value: &serde_json::Value) -> Option<RemediationAction> {
    let title = value.get("title")?.as_str()?.to_string();
    let description = value
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    let priority = value
        .get("priority")
        .and_then(|p| p.as_str())
        .and_then(parse_priority)
        .unwrap_or(Priority::Medium);
    let estimated_time = value
        .get("estimated_time")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    Some(RemediationAction {
        action_type: ActionType::Suggested,
        title,
        description,
        priority,
        estimated_time,
        source_document: None,
        source_type: None,
        source_location: None,
    })
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s.to_uppercase().as_str() {
        "LOW" => Some(Priority::Low),
        "MEDIUM" => Some(Priority::Medium),
        "HIGH" => Some(Priority::High),
        "CRITICAL" => Some(Priority::Critical),
        _ => None,
    }
}

/// Strip a surrounding markdown code fence, with or without a language
/// tag, from a model response.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, Document, MatchCategory, SearchMatch};

    fn response_json() -> &'static str {
        r#"{
            "severity": "high",
            "affected_systems": ["orders-api"],
            "root_cause": "Null order passed to placement flow",
            "recommended_actions": [
                {"title": "Add null check", "description": "Guard order before use", "priority": "HIGH", "estimated_time": "15 minutes"}
            ],
            "knowledge_base_entry": "Orders placed without a cart can be null.",
            "confidence": 85
        }"#
    }

    #[test]
    fn test_parse_well_formed_response() {
        let result = parse_analysis("primary", response_json()).unwrap();
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.affected_systems, vec!["orders-api"]);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action_type, ActionType::Suggested);
        assert_eq!(result.actions[0].priority, Priority::High);
        assert_eq!(result.confidence, 85);
        assert_eq!(
            result.source,
            AnalysisSource::Provider("primary".to_string())
        );
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let fenced = format!("```json\n{}\n```", response_json());
        let result = parse_analysis("p", &fenced).unwrap();
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_analysis("p", "I think the severity is high.").unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_missing_severity() {
        let err = parse_analysis("p", r#"{"root_cause": "x"}"#).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[test]
    fn test_parse_clamps_confidence() {
        let raw = r#"{"severity": "low", "root_cause": "x", "confidence": 900}"#;
        let result = parse_analysis("p", raw).unwrap();
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn test_prompt_prefers_internal_context() {
        let doc = Document {
            id: "d1".to_string(),
            title: "DB Timeout Runbook".to_string(),
            content: "connection timeout handling".to_string(),
            doc_type: DocType::Documentation,
            file_path: None,
            repository: None,
            tags: Vec::new(),
            is_active: true,
            last_updated: 0,
        };
        let rag = RagResponse::new(
            "timeout".to_string(),
            vec![SearchMatch {
                document: doc,
                relevance_score: 90.0,
                snippet: "connection timeout handling".to_string(),
                category: MatchCategory::Internal,
            }],
            Vec::new(),
        );
        let prompt = build_prompt("ERROR timeout", "db incident", &rag);
        assert!(prompt.contains("Prefer it over general knowledge"));
        assert!(prompt.contains("DB Timeout Runbook"));
        assert!(prompt.contains("ERROR timeout"));
    }

    #[test]
    fn test_prompt_without_context_has_no_preference_clause() {
        let rag = RagResponse::empty("q".to_string());
        let prompt = build_prompt("log", "", &rag);
        assert!(!prompt.contains("Prefer it over general knowledge"));
    }

    #[test]
    fn test_create_providers_skips_missing_keys() {
        let config = LlmConfig {
            providers: vec![LlmProviderConfig {
                name: "nokey".to_string(),
                kind: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: Some("TRIAGE_TEST_DEFINITELY_UNSET_KEY".to_string()),
                timeout_secs: 5,
                max_tokens: 256,
            }],
        };
        assert!(create_providers(&config).is_empty());
    }
}
