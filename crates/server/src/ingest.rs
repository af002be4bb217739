//! Ingestion pipeline: normalize -> canonicalize -> filter noise -> append

use crate::store::{ReportStore, StoreError};
use csp_core::{classify, normalize, ArrivalMetadata, CanonicalReport, NoiseKind};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Nothing usable in the body; the store was not touched
    #[error("Submission contained no usable CSP report")]
    BadPayload,

    #[error("Failed to store reports: {0}")]
    Storage(#[from] StoreError),
}

impl IngestError {
    /// Reason string returned to the submitter
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::BadPayload => "bad-payload",
            IngestError::Storage(_) => "storage-error",
        }
    }

    /// True when the submitter sent something unusable, as opposed to a
    /// failure on our side.
    pub fn is_rejected(&self) -> bool {
        matches!(self, IngestError::BadPayload)
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<ReportStore>,
}

impl IngestPipeline {
    pub fn new(store: Arc<ReportStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Process one submission. Returns how many records were appended, which
    /// is zero when every report in an otherwise valid payload was noise.
    pub fn ingest(&self, body: &[u8], arrival: &ArrivalMetadata) -> Result<usize, IngestError> {
        let violations = normalize(body, arrival.content_type.as_deref());
        if violations.is_empty() {
            tracing::debug!(
                content_type = arrival.content_type.as_deref().unwrap_or(""),
                bytes = body.len(),
                "rejected CSP submission"
            );
            return Err(IngestError::BadPayload);
        }

        let mut extension_noise = 0usize;
        let mut pseudo_scheme = 0usize;
        let records: Vec<CanonicalReport> = violations
            .iter()
            .map(|raw| CanonicalReport::from_raw(raw, arrival))
            .filter(|record| match classify(record.blocked_uri.as_deref()) {
                Some(NoiseKind::Extension) => {
                    extension_noise += 1;
                    false
                }
                Some(NoiseKind::PseudoScheme) => {
                    pseudo_scheme += 1;
                    false
                }
                None => true,
            })
            .collect();

        let written = self
            .store
            .append(arrival.received_at.date_naive(), &records)?;

        tracing::debug!(
            parsed = violations.len(),
            extension_noise,
            pseudo_scheme,
            written,
            "ingested CSP submission"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn pipeline(dir: &std::path::Path) -> IngestPipeline {
        IngestPipeline::new(Arc::new(ReportStore::new(dir)))
    }

    fn arrival() -> ArrivalMetadata {
        ArrivalMetadata::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap())
            .with_user_agent("Mozilla/5.0 (Macintosh)")
            .with_ip("192.0.2.10")
    }

    fn stored_lines(p: &IngestPipeline) -> Vec<serde_json::Value> {
        let path = p.store().path_for(arrival().received_at.date_naive());
        match fs::read_to_string(path) {
            Ok(s) => s.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_legacy_report_is_stored_with_arrival_metadata() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let body = br#"{"csp-report":{"document-uri":"https://x/","blocked-uri":"https://evil.test/x.js","effective-directive":"script-src","line-number":"7"}}"#;

        assert_eq!(p.ingest(body, &arrival()).unwrap(), 1);

        let lines = stored_lines(&p);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["blocked_uri"], "https://evil.test/x.js");
        assert_eq!(lines[0]["document_uri"], "https://x/");
        assert_eq!(lines[0]["line_number"], 7);
        assert_eq!(lines[0]["ip"], "192.0.2.10");
        assert_eq!(lines[0]["user_agent"], "Mozilla/5.0 (Macintosh)");
        assert_eq!(lines[0]["received_at"], "2025-06-01T08:30:00Z");
    }

    #[test]
    fn test_bad_payload_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let p = pipeline(&dir.path().join("reports"));

        let bodies: [&[u8]; 5] = [b"not json", b"", b"[1,2]", b"null", b"\"x\""];
        for body in bodies {
            let err = p.ingest(body, &arrival()).unwrap_err();
            assert!(err.is_rejected());
            assert_eq!(err.reason(), "bad-payload");
        }
        assert!(!dir.path().join("reports").exists());
    }

    #[test]
    fn test_noise_is_dropped_but_payload_accepted() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let body = json!([
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "chrome-extension://abc/x.js"}},
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "MOZ-EXTENSION://abc/y.js"}},
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "about:blank"}},
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "data:image/png;base64,AA"}}
        ])
        .to_string();
        let arrival = arrival().with_content_type("application/reports+json");

        assert_eq!(p.ingest(body.as_bytes(), &arrival).unwrap(), 0);
        assert!(stored_lines(&p).is_empty());
    }

    #[test]
    fn test_blob_and_missing_blocked_uri_are_kept() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let body = json!([
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "blob:https://x/123", "effective-directive": "worker-src"}},
            {"type": "csp-violation", "url": "https://x/", "body": {}},
            {"type": "csp-violation", "url": "https://x/", "body": {"blocked-uri": "edge-extension://nope"}}
        ])
        .to_string();

        assert_eq!(p.ingest(body.as_bytes(), &arrival()).unwrap(), 2);

        let lines = stored_lines(&p);
        assert_eq!(lines[0]["blocked_uri"], "blob:https://x/123");
        assert_eq!(lines[0]["document_uri"], "https://x/");
        assert!(lines[1]["blocked_uri"].is_null());
    }

    #[test]
    fn test_storage_failure_is_not_a_rejection() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let p = pipeline(&blocker);

        let err = p
            .ingest(br#"{"blocked-uri":"https://a.test/"}"#, &arrival())
            .unwrap_err();
        assert!(!err.is_rejected());
        assert_eq!(err.reason(), "storage-error");
    }
}
