//! Read-side aggregation over one day's report log
//!
//! Both views stream the file line by line. A line that is blank, not JSON,
//! or not a JSON object is skipped without complaint so one corrupt or
//! half-written line never hides the rest of the day.

use crate::store::{ReportStore, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, BufReader};

/// Default size of the top-offender ranking
pub const DEFAULT_OFFENDER_LIMIT: usize = 20;

/// Key used when a record has no directive or blocked URI
pub const UNKNOWN_KEY: &str = "unknown";

/// directive -> blocked URI -> count
pub type Summary = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffenderCount {
    pub blocked_uri: String,
    pub count: u64,
}

/// Two-level breakdown of the day's violations.
pub fn summarize(store: &ReportStore, date: NaiveDate) -> Result<Summary, StoreError> {
    let mut summary = Summary::new();
    if let Some(file) = store.open_log(date)? {
        let path = store.path_for(date);
        summarize_reader(BufReader::new(file), &mut summary)
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
    }
    Ok(summary)
}

/// Most frequent blocked URIs of the day, highest count first.
pub fn top_offenders(
    store: &ReportStore,
    date: NaiveDate,
    limit: usize,
) -> Result<Vec<OffenderCount>, StoreError> {
    let Some(file) = store.open_log(date)? else {
        return Ok(Vec::new());
    };
    let path = store.path_for(date);
    top_offenders_reader(BufReader::new(file), limit).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn summarize_reader<R: BufRead>(reader: R, summary: &mut Summary) -> io::Result<()> {
    for_each_record(reader, |record| {
        let directive = string_or_unknown(record.get("effective_directive"));
        let blocked = string_or_unknown(record.get("blocked_uri"));
        *summary
            .entry(directive)
            .or_default()
            .entry(blocked)
            .or_insert(0) += 1;
    })
}

pub fn top_offenders_reader<R: BufRead>(reader: R, limit: usize) -> io::Result<Vec<OffenderCount>> {
    let mut ranking: Vec<OffenderCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for_each_record(reader, |record| {
        let Some(blocked) = record
            .get("blocked_uri")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            return;
        };
        match index.get(blocked) {
            Some(&i) => ranking[i].count += 1,
            None => {
                index.insert(blocked.to_string(), ranking.len());
                ranking.push(OffenderCount {
                    blocked_uri: blocked.to_string(),
                    count: 1,
                });
            }
        }
    })?;

    // Stable sort: equal counts stay in first-seen order.
    ranking.sort_by(|a, b| b.count.cmp(&a.count));
    ranking.truncate(limit);
    Ok(ranking)
}

fn for_each_record<R, F>(reader: R, mut visit: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&Map<String, Value>),
{
    let mut skipped = 0usize;
    for line in reader.split(b'\n') {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Value>(&line) {
            Ok(Value::Object(record)) => visit(&record),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped unparseable report lines");
    }
    Ok(())
}

fn string_or_unknown(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_KEY)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(directive: Option<&str>, blocked: Option<&str>) -> String {
        serde_json::json!({
            "received_at": "2025-06-01T12:00:00Z",
            "effective_directive": directive,
            "blocked_uri": blocked,
        })
        .to_string()
    }

    #[test]
    fn test_summarize_counts_by_directive_then_uri() {
        let log = [
            line(Some("script-src"), Some("https://evil.test/x.js")),
            line(Some("script-src"), Some("https://evil.test/x.js")),
            line(Some("script-src"), Some("inline")),
            line(Some("style-src"), Some("https://fonts.test/a.css")),
        ]
        .join("\n");

        let mut summary = Summary::new();
        summarize_reader(Cursor::new(log), &mut summary).unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(summary["script-src"]["https://evil.test/x.js"], 2);
        assert_eq!(summary["script-src"]["inline"], 1);
        assert_eq!(summary["style-src"]["https://fonts.test/a.css"], 1);
    }

    #[test]
    fn test_summarize_defaults_missing_keys_to_unknown() {
        let log = format!(
            "{}\n{}\n{}\n",
            line(None, Some("https://a.test/")),
            line(Some("img-src"), None),
            r#"{"received_at":"2025-06-01T12:00:00Z"}"#
        );

        let mut summary = Summary::new();
        summarize_reader(Cursor::new(log), &mut summary).unwrap();

        assert_eq!(summary["unknown"]["https://a.test/"], 1);
        assert_eq!(summary["img-src"]["unknown"], 1);
        assert_eq!(summary["unknown"]["unknown"], 1);
    }

    #[test]
    fn test_corrupt_blank_and_partial_lines_are_skipped() {
        let log = format!(
            "{}\n\n   \nnot json\n[1,2]\n{}\n{{\"blocked_uri\":\"https://half",
            line(Some("script-src"), Some("https://a.test/")),
            line(Some("script-src"), Some("https://a.test/")),
        );

        let mut summary = Summary::new();
        summarize_reader(Cursor::new(log.clone()), &mut summary).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary["script-src"]["https://a.test/"], 2);

        let top = top_offenders_reader(Cursor::new(log), 10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut log = line(Some("script-src"), Some("https://a.test/")).into_bytes();
        log.extend_from_slice(b"\n\xff\xfe{\n");

        let top = top_offenders_reader(Cursor::new(log), 10).unwrap();
        assert_eq!(top[0].blocked_uri, "https://a.test/");
    }

    #[test]
    fn test_top_offenders_ranks_and_breaks_ties_by_first_seen() {
        let log = [
            line(Some("img-src"), Some("https://b.test/")),
            line(Some("img-src"), Some("https://a.test/")),
            line(Some("img-src"), Some("https://c.test/")),
            line(Some("img-src"), Some("https://c.test/")),
            line(Some("img-src"), Some("https://a.test/")),
            line(Some("img-src"), Some("https://b.test/")),
            line(Some("img-src"), Some("https://c.test/")),
            line(Some("img-src"), None),
            line(Some("img-src"), Some("")),
        ]
        .join("\n");

        let top = top_offenders_reader(Cursor::new(log.clone()), 20).unwrap();
        let order: Vec<(&str, u64)> = top
            .iter()
            .map(|o| (o.blocked_uri.as_str(), o.count))
            .collect();
        assert_eq!(
            order,
            vec![
                ("https://c.test/", 3),
                ("https://b.test/", 2),
                ("https://a.test/", 2)
            ]
        );

        let top = top_offenders_reader(Cursor::new(log), 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].blocked_uri, "https://c.test/");
    }

    #[test]
    fn test_missing_file_yields_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        assert!(summarize(&store, date).unwrap().is_empty());
        assert!(top_offenders(&store, date, DEFAULT_OFFENDER_LIMIT)
            .unwrap()
            .is_empty());
    }
}
