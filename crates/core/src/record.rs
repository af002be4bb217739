//! Violation record shapes
//!
//! [`RawViolation`] is what the normalizer pulls off the wire, still holding
//! whatever JSON the client sent. [`CanonicalReport`] is the typed record that
//! is persisted, one per NDJSON line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One violation extracted from a submission, before canonicalization.
///
/// Every field is `None` when the wire key was absent or `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawViolation {
    pub document_uri: Option<Value>,
    pub referrer: Option<Value>,
    pub violated_directive: Option<Value>,
    pub effective_directive: Option<Value>,
    pub blocked_uri: Option<Value>,
    pub original_policy: Option<Value>,
    pub source_file: Option<Value>,
    pub line_number: Option<Value>,
    pub disposition: Option<Value>,
    pub script_sample: Option<Value>,
    pub status_code: Option<Value>,
    /// Reporting API `user_agent` of the outer report item
    pub user_agent_hint_brand: Option<Value>,
}

impl RawViolation {
    /// Blocked URI as a string, if the client sent one.
    pub fn blocked_uri_str(&self) -> Option<&str> {
        self.blocked_uri.as_ref().and_then(Value::as_str)
    }
}

/// Request-level facts recorded by the collector, never taken from the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalMetadata {
    pub received_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub content_type: Option<String>,
}

impl ArrivalMetadata {
    pub fn new(received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            user_agent: None,
            ip: None,
            content_type: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Stored violation record (stable schema, one NDJSON line)
///
/// Field order here is the key order on disk. Absent values serialize as
/// `null` so every line carries the full key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReport {
    pub received_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub document_uri: Option<String>,
    pub referrer: Option<String>,
    pub violated_directive: Option<String>,
    pub effective_directive: Option<String>,
    pub blocked_uri: Option<String>,
    pub source_file: Option<String>,
    pub line_number: Option<i64>,
    pub disposition: Option<String>,
    pub original_policy: Option<String>,
    pub script_sample: Option<String>,
    pub status_code: Option<i64>,
    pub ip: Option<String>,
}

impl CanonicalReport {
    /// Build the stored record from a raw violation and its arrival metadata.
    pub fn from_raw(raw: &RawViolation, arrival: &ArrivalMetadata) -> Self {
        Self {
            received_at: arrival.received_at,
            user_agent: arrival.user_agent.clone(),
            document_uri: coerce_string(raw.document_uri.as_ref()),
            referrer: coerce_string(raw.referrer.as_ref()),
            violated_directive: coerce_string(raw.violated_directive.as_ref()),
            effective_directive: coerce_string(raw.effective_directive.as_ref()),
            blocked_uri: coerce_string(raw.blocked_uri.as_ref()),
            source_file: coerce_string(raw.source_file.as_ref()),
            line_number: coerce_int(raw.line_number.as_ref()),
            disposition: coerce_string(raw.disposition.as_ref()),
            original_policy: coerce_string(raw.original_policy.as_ref()),
            script_sample: coerce_string(raw.script_sample.as_ref()),
            status_code: coerce_int(raw.status_code.as_ref()),
            ip: arrival.ip.clone(),
        }
    }
}

/// Strings pass through; numbers and booleans keep their JSON text.
fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integers pass through, floats truncate toward zero, numeric strings parse.
fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(f: f64) -> Option<i64> {
    f.is_finite().then(|| f.trunc() as i64)
}
