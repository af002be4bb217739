//! Wire-format detection and normalization
//!
//! Browsers deliver CSP violations in two shapes:
//! - Reporting API: a JSON array of typed items, each `csp-violation` item
//!   carrying the violation under `body`
//! - legacy `report-uri`: one object, usually wrapped in `csp-report`
//!
//! Detection runs in a fixed order (batch first, then legacy) and both shapes
//! go through the same hyphenated-key mapping.

use crate::record::RawViolation;
use serde_json::{Map, Value};

/// Content type browsers use for Reporting API deliveries
pub const REPORTS_CONTENT_TYPE: &str = "application/reports+json";

/// Reporting API item type carrying a CSP violation
pub const CSP_VIOLATION_TYPE: &str = "csp-violation";

const LEGACY_WRAPPER: &str = "csp-report";

/// A submission body after shape detection
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Reporting API array, items not yet filtered by type
    Batch(Vec<Value>),
    /// Single legacy report object, wrapper already removed
    Legacy(Map<String, Value>),
}

impl Submission {
    /// Detect the submission shape. `None` means the body is unusable.
    pub fn detect(body: &[u8], content_type: Option<&str>) -> Option<Self> {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();

        let declared_batch = content_type
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(REPORTS_CONTENT_TYPE));
        if declared_batch || parsed.as_ref().is_some_and(looks_like_reporting_api) {
            return match parsed? {
                Value::Array(items) => Some(Self::Batch(items)),
                _ => None,
            };
        }

        match parsed? {
            Value::Object(mut obj) => match obj.remove(LEGACY_WRAPPER) {
                Some(Value::Object(inner)) => Some(Self::Legacy(inner)),
                Some(Value::Null) | None => Some(Self::Legacy(obj)),
                Some(_) => None,
            },
            _ => None,
        }
    }

    /// Expand into one raw violation per usable report.
    pub fn into_violations(self) -> Vec<RawViolation> {
        match self {
            Self::Legacy(report) => vec![from_legacy(&report)],
            Self::Batch(items) => items
                .iter()
                .filter_map(Value::as_object)
                .filter(|item| {
                    item.get("type").and_then(Value::as_str) == Some(CSP_VIOLATION_TYPE)
                })
                .map(from_reporting_item)
                .collect(),
        }
    }
}

/// Normalize a submission body into zero or more raw violations.
///
/// An empty result means the payload was malformed or held no CSP violation.
pub fn normalize(body: &[u8], content_type: Option<&str>) -> Vec<RawViolation> {
    Submission::detect(body, content_type)
        .map(Submission::into_violations)
        .unwrap_or_default()
}

/// Reporting API sniff for clients that send the wrong content type:
/// a non-empty array whose first element has a `type` field.
fn looks_like_reporting_api(value: &Value) -> bool {
    value
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("type"))
}

fn field(report: &Map<String, Value>, key: &str) -> Option<Value> {
    report.get(key).filter(|v| !v.is_null()).cloned()
}

fn from_legacy(report: &Map<String, Value>) -> RawViolation {
    RawViolation {
        document_uri: field(report, "document-uri"),
        referrer: field(report, "referrer"),
        violated_directive: field(report, "violated-directive"),
        effective_directive: field(report, "effective-directive"),
        blocked_uri: field(report, "blocked-uri"),
        original_policy: field(report, "original-policy"),
        source_file: field(report, "source-file"),
        line_number: field(report, "line-number"),
        disposition: field(report, "disposition"),
        script_sample: field(report, "script-sample"),
        status_code: field(report, "status-code"),
        user_agent_hint_brand: None,
    }
}

fn from_reporting_item(item: &Map<String, Value>) -> RawViolation {
    let empty = Map::new();
    let body = item.get("body").and_then(Value::as_object).unwrap_or(&empty);

    // The item's url is the document; it wins over anything in body.
    RawViolation {
        document_uri: field(item, "url"),
        user_agent_hint_brand: field(item, "user_agent"),
        ..from_legacy(body)
    }
}
