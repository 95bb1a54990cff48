//! Model orchestration for log analysis.
//!
//! Drives the fallback chain: each configured provider is tried in order
//! with the composed retrieval context; a parse failure counts the same
//! as a transport failure and moves to the next link. When every
//! provider is exhausted, the deterministic path (exception extraction
//! plus remediation synthesis) produces the result instead, so an
//! analysis request never errors back to the caller — the only rejected
//! input is an empty log.
//!
//! After a successful model response, the deterministic synthesizer is
//! still run when code matches exist and its actions are prepended, so
//! source-attributed fixes are always present when source context was
//! retrieved.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::extract::extract_all;
use crate::llm::{build_prompt, parse_analysis, CompletionProvider};
use crate::models::{
    ActionType, AnalysisResult, AnalysisSource, ExceptionFact, Priority, RagResponse,
    RemediationAction, Severity,
};
use crate::remediate::synthesize;
use crate::search::search;
use crate::store::Store;

/// Every provider in the chain failed or returned unusable output.
#[derive(Debug)]
struct ExhaustedProviders;

/// Analyze a log: retrieve context, fold over the provider chain, and
/// fall back to the deterministic path when the chain is exhausted.
pub async fn analyze_log(
    store: Arc<dyn Store>,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    providers: &[Box<dyn CompletionProvider>],
    log_text: &str,
    summary: &str,
    incident_id: Option<&str>,
) -> Result<AnalysisResult> {
    if log_text.trim().is_empty() {
        bail!("log text cannot be empty");
    }

    let facts = extract_all(log_text);
    let query = derive_query(&facts, summary, log_text);

    let rag = match search(
        store,
        embedder,
        retrieval,
        &query,
        incident_id,
        None,
    )
    .await
    {
        Ok(rag) => rag,
        Err(e) => {
            // Retrieval failure degrades analysis, it does not fail it.
            tracing::warn!(error = %e, "context retrieval failed, analyzing without context");
            RagResponse::empty(query.clone())
        }
    };

    let prompt = build_prompt(log_text, summary, &rag);

    match try_providers(providers, &prompt).await {
        Ok(mut result) => {
            if !rag.code_matches.is_empty() {
                let mut attributed = synthesize_all(&facts, &rag);
                attributed.append(&mut result.actions);
                result.actions = attributed;
            }
            Ok(result)
        }
        Err(ExhaustedProviders) => Ok(deterministic_analysis(&facts, &rag)),
    }
}

/// Fold over the provider chain: first provider whose response both
/// completes and parses wins.
async fn try_providers(
    providers: &[Box<dyn CompletionProvider>],
    prompt: &str,
) -> Result<AnalysisResult, ExhaustedProviders> {
    for provider in providers {
        let raw = match provider.complete(prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "provider failed");
                continue;
            }
        };

        match parse_analysis(provider.name(), &raw) {
            Ok(result) => {
                tracing::info!(provider = provider.name(), "analysis produced by provider");
                return Ok(result);
            }
            Err(e) => {
                // Unparseable output is a provider failure, not an error.
                tracing::warn!(provider = provider.name(), error = %e, "unparseable response");
            }
        }
    }
    Err(ExhaustedProviders)
}

/// The fully deterministic path: extracted facts plus template fixes.
/// With neither internal context nor actions, it yields exactly one
/// low-confidence prompt to supply more context.
fn deterministic_analysis(facts: &[ExceptionFact], rag: &RagResponse) -> AnalysisResult {
    let actions = synthesize_all(facts, rag);

    if actions.is_empty() && !rag.has_internal_content {
        return AnalysisResult {
            severity: deterministic_severity(facts),
            affected_systems: affected_systems(facts),
            root_cause: deterministic_root_cause(facts),
            actions: vec![upload_context_action()],
            knowledge_base_entry: None,
            confidence: 50,
            source: AnalysisSource::Deterministic,
        };
    }

    let confidence = if actions.is_empty() { 55 } else { 70 };
    AnalysisResult {
        severity: deterministic_severity(facts),
        affected_systems: affected_systems(facts),
        root_cause: deterministic_root_cause(facts),
        actions,
        knowledge_base_entry: None,
        confidence,
        source: AnalysisSource::Deterministic,
    }
}

fn synthesize_all(facts: &[ExceptionFact], rag: &RagResponse) -> Vec<RemediationAction> {
    facts
        .iter()
        .flat_map(|fact| synthesize(fact, &rag.code_matches))
        .collect()
}

fn deterministic_severity(facts: &[ExceptionFact]) -> Severity {
    if facts.is_empty() {
        return Severity::Medium;
    }
    // Input-shape failures are routine; anything else in production is
    // treated as high.
    if facts.iter().all(|f| {
        f.is_validation_error || f.exception_type == "HttpMessageNotReadableException"
    }) {
        Severity::Medium
    } else {
        Severity::High
    }
}

fn deterministic_root_cause(facts: &[ExceptionFact]) -> String {
    match facts.first() {
        Some(fact) => {
            let site = match (&fact.affected_class, &fact.affected_method) {
                (Some(class), Some(method)) => format!(" in {}.{}", class, method),
                (Some(class), None) => format!(" in {}", class),
                _ => String::new(),
            };
            if fact.message.is_empty() {
                format!("{}{}", fact.exception_type, site)
            } else {
                format!("{}{}: {}", fact.exception_type, site, fact.message)
            }
        }
        None => "No known exception signature found in the log.".to_string(),
    }
}

fn affected_systems(facts: &[ExceptionFact]) -> Vec<String> {
    let systems: std::collections::BTreeSet<String> = facts
        .iter()
        .filter_map(|f| f.affected_class.clone())
        .collect();
    systems.into_iter().collect()
}

fn upload_context_action() -> RemediationAction {
    RemediationAction {
        action_type: ActionType::UploadContext,
        title: "Upload documentation or connect a repository".to_string(),
        description: "No internal documentation or source context matched this incident. \
                      Upload relevant runbooks or connect the affected repository so future \
                      analyses can cite concrete fixes."
            .to_string(),
        priority: Priority::Medium,
        estimated_time: "5 minutes".to_string(),
        source_document: None,
        source_type: None,
        source_location: None,
    }
}

/// Search query for an incident: exception signature when one was
/// extracted, otherwise the summary, otherwise the first log line.
fn derive_query(facts: &[ExceptionFact], summary: &str, log_text: &str) -> String {
    if let Some(fact) = facts.first() {
        let mut parts = vec![fact.exception_type.clone()];
        if let Some(class) = &fact.affected_class {
            parts.push(class.clone());
        }
        if !summary.trim().is_empty() {
            parts.push(summary.trim().to_string());
        }
        return parts.join(" ");
    }
    if !summary.trim().is_empty() {
        return summary.trim().to_string();
    }
    log_text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or(log_text)
        .trim()
        .chars()
        .take(200)
        .collect()
}
