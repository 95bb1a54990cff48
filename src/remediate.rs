//! Remediation synthesis: exception facts + retrieved code context into
//! concrete, prioritized fix actions.
//!
//! Every emitted action is attributed to the resolved source document and,
//! where the stack frame gave us one, an exact `File.java:line` location.
//! With no code matches at all, no code-specific actions are produced.

use crate::models::{ActionType, ExceptionFact, Priority, RemediationAction, SearchMatch};

/// Synthesize template fixes for one exception fact against the retrieved
/// code matches. Returns an empty list when no code context is available.
pub fn synthesize(fact: &ExceptionFact, code_matches: &[SearchMatch]) -> Vec<RemediationAction> {
    let Some(resolved) = resolve_file(fact, code_matches) else {
        return Vec::new();
    };

    let location = source_location(fact);
    let source_document = Some(resolved.document.id.clone());
    let source_type = Some(resolved.document.doc_type);
    let target = fact
        .affected_class
        .clone()
        .unwrap_or_else(|| resolved.document.title.clone());

    let make = |action_type, title: String, description: String, priority| RemediationAction {
        action_type,
        title,
        description,
        priority,
        estimated_time: estimate(action_type).to_string(),
        source_document: source_document.clone(),
        source_type,
        source_location: location.clone(),
    };

    match fact.exception_type.as_str() {
        "NullPointerException" => vec![
            make(
                ActionType::NullCheck,
                format!("Add null check in {}", describe_site(fact, &target)),
                format!(
                    "Guard the dereference that raised `{}`. Check the value for null before use and return early or supply a default.",
                    fact.message_or_type()
                ),
                Priority::High,
            ),
            make(
                ActionType::DefensiveOptional,
                format!("Use Optional for nullable values in {}", target),
                "Wrap the nullable value in Optional and resolve it with orElse/orElseThrow so absence is handled explicitly instead of dereferenced."
                    .to_string(),
                Priority::Medium,
            ),
            make(
                ActionType::ExceptionHandler,
                format!("Wrap {} call path in exception handling", target),
                "Add a try/catch around the failing call path so an unexpected null surfaces as a handled error response rather than a 500."
                    .to_string(),
                Priority::Medium,
            ),
        ],
        "PatternSyntaxException" => vec![make(
            ActionType::RegexRepair,
            format!("Fix invalid regular expression in {}", target),
            format!(
                "The pattern fails to compile: {}. Correct the expression (check unescaped metacharacters and unclosed groups) and compile it once at startup so a bad pattern fails fast.",
                fact.message_or_type()
            ),
            Priority::High,
        )],
        "MethodArgumentNotValidException" => vec![make(
            ActionType::ValidationFix,
            validation_title(fact, &target),
            validation_description(fact),
            Priority::High,
        )],
        "HttpMessageNotReadableException" => vec![make(
            ActionType::RequestBodyFix,
            format!("Reject malformed request bodies in {}", target),
            "The request body could not be parsed. Validate the payload shape before binding and return 400 with a field-level message instead of letting deserialization fail."
                .to_string(),
            Priority::High,
        )],
        "DataIntegrityViolationException" | "ConstraintViolationException" => {
            let mut actions = vec![make(
                ActionType::DuplicateGuard,
                format!("Check for existing record before insert in {}", target),
                duplicate_guard_description(fact),
                Priority::High,
            )];
            actions.push(make(
                ActionType::CentralErrorHandler,
                "Map constraint violations in a central error handler".to_string(),
                "Add a shared exception handler that translates database constraint violations into 409 responses with the offending field, so every write path reports them consistently."
                    .to_string(),
                Priority::Medium,
            ));
            actions
        }
        _ => vec![make(
            ActionType::Suggested,
            format!("Review {} for {}", target, fact.exception_type),
            format!(
                "Inspect the attributed call site for the cause of `{}` and add handling or input validation as appropriate.",
                fact.message_or_type()
            ),
            Priority::Medium,
        )],
    }
}

/// File-resolution policy, in order:
/// 1. validation errors prefer a controller-looking match (request binding
///    fails at the controller boundary, not in the entity);
/// 2. exact `<Class>.java` filename match;
/// 3. fuzzy match where title/path/content contains the class name;
/// 4. first available code match.
fn resolve_file<'a>(
    fact: &ExceptionFact,
    code_matches: &'a [SearchMatch],
) -> Option<&'a SearchMatch> {
    if code_matches.is_empty() {
        return None;
    }

    if fact.is_validation_error {
        if let Some(m) = code_matches.iter().find(|m| {
            let title = m.document.title.to_lowercase();
            let path = m
                .document
                .file_path
                .as_deref()
                .unwrap_or("")
                .to_lowercase();
            title.contains("controller") || path.contains("controller")
        }) {
            return Some(m);
        }
    }

    if let Some(class) = &fact.affected_class {
        let file_name = format!("{}.java", class);
        if let Some(m) = code_matches.iter().find(|m| {
            m.document
                .file_path
                .as_deref()
                .map(|p| p.ends_with(&file_name))
                .unwrap_or(false)
                || m.document.title == file_name
        }) {
            return Some(m);
        }

        if let Some(m) = code_matches.iter().find(|m| {
            m.document.title.contains(class.as_str())
                || m.document
                    .file_path
                    .as_deref()
                    .map(|p| p.contains(class.as_str()))
                    .unwrap_or(false)
                || m.document.content.contains(class.as_str())
        }) {
            return Some(m);
        }
    }

    code_matches.first()
}

fn source_location(fact: &ExceptionFact) -> Option<String> {
    let file = fact.file_path.as_deref()?;
    Some(match fact.line_number {
        Some(line) => format!("{}:{}", file, line),
        None => file.to_string(),
    })
}

fn describe_site(fact: &ExceptionFact, target: &str) -> String {
    match (&fact.affected_method, &fact.line_number) {
        (Some(method), Some(line)) => format!("{}.{} (line {})", target, method, line),
        (Some(method), None) => format!("{}.{}", target, method),
        _ => target.to_string(),
    }
}

fn validation_title(fact: &ExceptionFact, target: &str) -> String {
    match &fact.validation {
        Some(v) => format!("Fix validation of {}.{}", v.entity_class, v.field_name),
        None => format!("Fix request validation in {}", target),
    }
}

fn validation_description(fact: &ExceptionFact) -> String {
    match &fact.validation {
        Some(v) => format!(
            "Field `{}` on `{}` failed validation: {}. Correct the constraint or the submitted value, and make sure the binding error is returned as a 400 with the field name.",
            v.field_name, v.entity_class, v.violation_message
        ),
        None => "Request validation failed. Surface the binding errors as a 400 response with per-field messages instead of a generic failure.".to_string(),
    }
}

fn duplicate_guard_description(fact: &ExceptionFact) -> String {
    match &fact.validation {
        Some(v) => format!(
            "`{}.{}` violates a uniqueness constraint ({}). Query for an existing record by `{}` before inserting and return a conflict response when one exists.",
            v.entity_class, v.field_name, v.violation_message, v.field_name
        ),
        None => "A database constraint rejected the write. Check for an existing record before inserting and return a conflict response instead of surfacing the raw database error.".to_string(),
    }
}

fn estimate(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::NullCheck => "15 minutes",
        ActionType::DefensiveOptional => "30 minutes",
        ActionType::ExceptionHandler => "30 minutes",
        ActionType::RegexRepair => "20 minutes",
        ActionType::DuplicateGuard => "45 minutes",
        ActionType::CentralErrorHandler => "1 hour",
        ActionType::ValidationFix => "30 minutes",
        ActionType::RequestBodyFix => "30 minutes",
        ActionType::UploadContext => "5 minutes",
        ActionType::Suggested => "1 hour",
    }
}

impl ExceptionFact {
    fn message_or_type(&self) -> &str {
        if self.message.is_empty() {
            &self.exception_type
        } else {
            &self.message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConstraintType, DocType, Document, MatchCategory, SearchMatch, ValidationDetail,
    };

    fn code_match(id: &str, title: &str, file_path: Option<&str>, content: &str) -> SearchMatch {
        SearchMatch {
            document: Document {
                id: id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                doc_type: DocType::Code,
                file_path: file_path.map(str::to_string),
                repository: Some("acme/orders".to_string()),
                tags: Vec::new(),
                is_active: true,
                last_updated: 0,
            },
            relevance_score: 80.0,
            snippet: String::new(),
            category: MatchCategory::Code,
        }
    }

    fn npe_fact() -> ExceptionFact {
        ExceptionFact {
            exception_type: "NullPointerException".to_string(),
            message: "order is null".to_string(),
            affected_class: Some("OrderService".to_string()),
            affected_method: Some("place".to_string()),
            line_number: Some(88),
            file_path: Some("OrderService.java".to_string()),
            is_validation_error: false,
            validation: None,
        }
    }

    #[test]
    fn test_no_code_matches_no_actions() {
        assert!(synthesize(&npe_fact(), &[]).is_empty());
    }

    #[test]
    fn test_null_pointer_emits_three_actions() {
        let matches = vec![code_match(
            "d1",
            "OrderService.java",
            Some("src/main/java/com/acme/orders/OrderService.java"),
            "class OrderService {}",
        )];
        let actions = synthesize(&npe_fact(), &matches);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].action_type, ActionType::NullCheck);
        assert_eq!(actions[0].priority, Priority::High);
        assert_eq!(actions[1].action_type, ActionType::DefensiveOptional);
        assert_eq!(actions[1].priority, Priority::Medium);
        assert_eq!(actions[2].action_type, ActionType::ExceptionHandler);
        // Attribution traces back to the resolved file and frame.
        assert_eq!(actions[0].source_document.as_deref(), Some("d1"));
        assert_eq!(
            actions[0].source_location.as_deref(),
            Some("OrderService.java:88")
        );
    }

    #[test]
    fn test_exact_filename_beats_fuzzy() {
        let matches = vec![
            code_match("fuzzy", "notes", None, "OrderService mentioned in passing"),
            code_match(
                "exact",
                "OrderService.java",
                Some("src/OrderService.java"),
                "class OrderService {}",
            ),
        ];
        let actions = synthesize(&npe_fact(), &matches);
        assert_eq!(actions[0].source_document.as_deref(), Some("exact"));
    }

    #[test]
    fn test_fuzzy_match_on_content() {
        let matches = vec![
            code_match("other", "Unrelated.java", Some("src/Unrelated.java"), "nothing"),
            code_match("hit", "service layer", None, "public class OrderService"),
        ];
        let actions = synthesize(&npe_fact(), &matches);
        assert_eq!(actions[0].source_document.as_deref(), Some("hit"));
    }

    #[test]
    fn test_unknown_class_falls_back_to_first_match() {
        let mut fact = npe_fact();
        fact.affected_class = None;
        fact.affected_method = None;
        let matches = vec![
            code_match("first", "a.java", Some("src/a.java"), "a"),
            code_match("second", "b.java", Some("src/b.java"), "b"),
        ];
        let actions = synthesize(&fact, &matches);
        assert_eq!(actions[0].source_document.as_deref(), Some("first"));
    }

    #[test]
    fn test_validation_prefers_controller_match() {
        let fact = ExceptionFact {
            exception_type: "MethodArgumentNotValidException".to_string(),
            message: "Validation failed".to_string(),
            affected_class: Some("Order".to_string()),
            affected_method: None,
            line_number: None,
            file_path: None,
            is_validation_error: true,
            validation: Some(ValidationDetail {
                entity_class: "Order".to_string(),
                field_name: "customerEmail".to_string(),
                violation_message: "must be a well-formed email address".to_string(),
                constraint_type: ConstraintType::Generic,
            }),
        };
        let matches = vec![
            code_match("entity", "Order.java", Some("src/Order.java"), "class Order"),
            code_match(
                "controller",
                "OrderController.java",
                Some("src/OrderController.java"),
                "class OrderController",
            ),
        ];
        let actions = synthesize(&fact, &matches);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::ValidationFix);
        // Controller heuristic wins over the exact entity filename.
        assert_eq!(actions[0].source_document.as_deref(), Some("controller"));
        assert!(actions[0].title.contains("customerEmail"));
    }

    #[test]
    fn test_unique_violation_emits_guard_and_handler() {
        let fact = ExceptionFact {
            exception_type: "DataIntegrityViolationException".to_string(),
            message: "could not execute statement".to_string(),
            affected_class: Some("UserService".to_string()),
            affected_method: Some("register".to_string()),
            line_number: Some(52),
            file_path: Some("UserService.java".to_string()),
            is_validation_error: true,
            validation: Some(ValidationDetail {
                entity_class: "User".to_string(),
                field_name: "email".to_string(),
                violation_message: "duplicate key value violates unique constraint".to_string(),
                constraint_type: ConstraintType::Unique,
            }),
        };
        let matches = vec![code_match(
            "svc",
            "UserService.java",
            Some("src/UserService.java"),
            "class UserService",
        )];
        let actions = synthesize(&fact, &matches);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::DuplicateGuard);
        assert_eq!(actions[0].priority, Priority::High);
        assert_eq!(actions[1].action_type, ActionType::CentralErrorHandler);
        assert_eq!(actions[1].priority, Priority::Medium);
    }

    #[test]
    fn test_pattern_syntax_emits_regex_repair() {
        let fact = ExceptionFact {
            exception_type: "PatternSyntaxException".to_string(),
            message: "Unclosed group near index 5".to_string(),
            affected_class: Some("LogFilter".to_string()),
            affected_method: Some("compile".to_string()),
            line_number: Some(33),
            file_path: Some("LogFilter.java".to_string()),
            is_validation_error: false,
            validation: None,
        };
        let matches = vec![code_match(
            "f",
            "LogFilter.java",
            Some("src/LogFilter.java"),
            "Pattern.compile",
        )];
        let actions = synthesize(&fact, &matches);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::RegexRepair);
        assert!(actions[0].description.contains("Unclosed group"));
    }

    #[test]
    fn test_unregistered_type_gets_generic_suggestion() {
        let fact = ExceptionFact {
            exception_type: "IllegalStateException".to_string(),
            message: "pool exhausted".to_string(),
            affected_class: Some("PoolManager".to_string()),
            affected_method: Some("acquire".to_string()),
            line_number: Some(77),
            file_path: Some("PoolManager.java".to_string()),
            is_validation_error: false,
            validation: None,
        };
        let matches = vec![code_match(
            "pm",
            "PoolManager.java",
            Some("src/PoolManager.java"),
            "class PoolManager",
        )];
        let actions = synthesize(&fact, &matches);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Suggested);
    }
}
