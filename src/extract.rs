//! Exception fact extraction from raw log text.
//!
//! A registry of known exception patterns is evaluated in priority order;
//! each pattern present in the text yields one structured
//! [`ExceptionFact`]. When no registered pattern matches, a generic
//! extractor takes over: it finds `<Identifier>Exception:` /
//! `<Identifier>Error:` header lines and attributes each to the first
//! stack frame that is not framework or runtime code — the first
//! application-level frame is assumed to be where the fix belongs.
//!
//! Multiple occurrences of the same exception type in one log are
//! deduplicated keep-first.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ConstraintType, ExceptionFact, ValidationDetail};

/// Stack-frame namespaces that never receive fix attribution.
const FRAMEWORK_PREFIXES: &[&str] = &[
    "java.",
    "javax.",
    "jakarta.",
    "jdk.",
    "sun.",
    "com.sun.",
    "kotlin.",
    "org.springframework.",
    "org.hibernate.",
    "org.apache.",
    "org.postgresql.",
    "org.junit.",
    "com.fasterxml.",
    "com.zaxxer.",
    "io.netty.",
    "reactor.",
];

/// One registered exception pattern: a detector plus a dedicated
/// extractor, evaluated in priority order.
struct PatternEntry {
    detector: fn() -> &'static Regex,
    extract: fn(&str) -> Option<ExceptionFact>,
}

/// Registry order is priority order: more specific patterns first, so a
/// validation failure wrapped in a broader exception is classified as
/// validation.
fn registry() -> &'static [PatternEntry] {
    &[
        PatternEntry {
            detector: validation_detector,
            extract: extract_validation,
        },
        PatternEntry {
            detector: malformed_request_detector,
            extract: extract_malformed_request,
        },
        PatternEntry {
            detector: null_dereference_detector,
            extract: extract_null_dereference,
        },
        PatternEntry {
            detector: pattern_syntax_detector,
            extract: extract_pattern_syntax,
        },
        PatternEntry {
            detector: constraint_violation_detector,
            extract: extract_constraint_violation,
        },
    ]
}

/// Extract all exception facts from one log. Registered patterns first;
/// the generic extractor only runs when none of them matched.
pub fn extract_all(log_text: &str) -> Vec<ExceptionFact> {
    let mut facts: Vec<ExceptionFact> = Vec::new();

    for entry in registry() {
        if !(entry.detector)().is_match(log_text) {
            continue;
        }
        if let Some(fact) = (entry.extract)(log_text) {
            if !facts.iter().any(|f| f.exception_type == fact.exception_type) {
                facts.push(fact);
            }
        }
    }

    if facts.is_empty() {
        facts = extract_generic(log_text);
    }

    facts
}

// ============ Shared parsing helpers ============

#[derive(Debug, Clone)]
struct Frame {
    class: String,
    method: String,
    file: String,
    line: u32,
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)([A-Z][A-Za-z0-9_]*(?:Exception|Error)):[ \t]*([^\r\n]*)").unwrap()
    })
}

fn frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*at\s+([A-Za-z_$][\w.$]*)\(([\w$]+\.\w+):(\d+)\)").unwrap()
    })
}

fn is_framework_frame(qualified: &str) -> bool {
    FRAMEWORK_PREFIXES.iter().any(|p| qualified.starts_with(p))
}

/// First application-level frame in `text`: the attribution site.
///
/// The qualified name's last two segments are the class and method; the
/// frame's file name becomes the fact's file path.
fn first_application_frame(text: &str) -> Option<Frame> {
    for caps in frame_re().captures_iter(text) {
        let qualified = caps.get(1)?.as_str();
        if is_framework_frame(qualified) {
            continue;
        }

        let mut segments: Vec<&str> = qualified.split('.').collect();
        if segments.len() < 2 {
            continue;
        }
        let method = segments.pop()?.to_string();
        let class = segments.pop()?.to_string();

        return Some(Frame {
            class,
            method,
            file: caps.get(2)?.as_str().to_string(),
            line: caps.get(3)?.as_str().parse().ok()?,
        });
    }
    None
}

/// Message text following the first `<type>:` header for a specific
/// exception type.
fn message_for(log_text: &str, exception_type: &str) -> String {
    for caps in header_re().captures_iter(log_text) {
        if &caps[1] == exception_type {
            return caps[2].trim().to_string();
        }
    }
    String::new()
}

fn fact_with_attribution(
    log_text: &str,
    exception_type: &str,
    is_validation_error: bool,
    validation: Option<ValidationDetail>,
) -> ExceptionFact {
    let frame = first_application_frame(log_text);
    ExceptionFact {
        exception_type: exception_type.to_string(),
        message: message_for(log_text, exception_type),
        affected_class: frame.as_ref().map(|f| f.class.clone()),
        affected_method: frame.as_ref().map(|f| f.method.clone()),
        line_number: frame.as_ref().map(|f| f.line),
        file_path: frame.as_ref().map(|f| f.file.clone()),
        is_validation_error,
        validation,
    }
}

// ============ Registered patterns ============

fn validation_detector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"MethodArgumentNotValidException").unwrap())
}

fn extract_validation(log_text: &str) -> Option<ExceptionFact> {
    let detail = parse_validation_detail(log_text);
    Some(fact_with_attribution(
        log_text,
        "MethodArgumentNotValidException",
        true,
        detail,
    ))
}

fn malformed_request_detector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"HttpMessageNotReadableException|JSON parse error").unwrap()
    })
}

fn extract_malformed_request(log_text: &str) -> Option<ExceptionFact> {
    Some(fact_with_attribution(
        log_text,
        "HttpMessageNotReadableException",
        false,
        None,
    ))
}

fn null_dereference_detector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"NullPointerException").unwrap())
}

fn extract_null_dereference(log_text: &str) -> Option<ExceptionFact> {
    Some(fact_with_attribution(
        log_text,
        "NullPointerException",
        false,
        None,
    ))
}

fn pattern_syntax_detector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PatternSyntaxException").unwrap())
}

fn extract_pattern_syntax(log_text: &str) -> Option<ExceptionFact> {
    Some(fact_with_attribution(
        log_text,
        "PatternSyntaxException",
        false,
        None,
    ))
}

fn constraint_violation_detector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"DataIntegrityViolationException|ConstraintViolationException").unwrap()
    })
}

fn extract_constraint_violation(log_text: &str) -> Option<ExceptionFact> {
    let exception_type = if log_text.contains("DataIntegrityViolationException") {
        "DataIntegrityViolationException"
    } else {
        "ConstraintViolationException"
    };
    let detail = parse_validation_detail(log_text);
    Some(fact_with_attribution(log_text, exception_type, true, detail))
}

/// Parse constraint-violation text of the form
/// `<package>.<Entity>.<field>: <message>`.
///
/// Only uniqueness is inferred as a specific constraint type; anything
/// else lands in the generic bucket.
fn parse_validation_detail(log_text: &str) -> Option<ValidationDetail> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?m)([a-z][\w]*(?:\.[\w]+)*)\.([A-Z]\w*)\.(\w+):\s*([^\r\n;\]]+)").unwrap()
    });

    let caps = re.captures(log_text)?;
    let violation_message = caps[4].trim().to_string();
    let lower = violation_message.to_lowercase();
    let constraint_type = if lower.contains("unique")
        || lower.contains("duplicate")
        || lower.contains("already exists")
    {
        ConstraintType::Unique
    } else {
        ConstraintType::Generic
    };

    Some(ValidationDetail {
        entity_class: caps[2].to_string(),
        field_name: caps[3].to_string(),
        violation_message,
        constraint_type,
    })
}

// ============ Generic fallback ============

/// One fact per distinct `<Identifier>Exception:` / `<Identifier>Error:`
/// header, keep-first, each attributed from the text between its header
/// and the next one.
fn extract_generic(log_text: &str) -> Vec<ExceptionFact> {
    let headers: Vec<(usize, String, String)> = header_re()
        .captures_iter(log_text)
        .map(|caps| {
            let m = caps.get(0).unwrap();
            (m.start(), caps[1].to_string(), caps[2].trim().to_string())
        })
        .collect();

    let mut facts: Vec<ExceptionFact> = Vec::new();

    for (i, (start, exception_type, message)) in headers.iter().enumerate() {
        if facts.iter().any(|f| &f.exception_type == exception_type) {
            continue;
        }

        let end = headers
            .get(i + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(log_text.len());
        let section = &log_text[*start..end];
        let frame = first_application_frame(section);

        facts.push(ExceptionFact {
            exception_type: exception_type.clone(),
            message: message.clone(),
            affected_class: frame.as_ref().map(|f| f.class.clone()),
            affected_method: frame.as_ref().map(|f| f.method.clone()),
            line_number: frame.as_ref().map(|f| f.line),
            file_path: frame.as_ref().map(|f| f.file.clone()),
            is_validation_error: false,
            validation: None,
        });
    }

    facts
}
