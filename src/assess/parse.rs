//! Strict parsing of engine output into criterion records.
//!
//! Engines answer with JSON, usually wrapped in prose or a fenced block:
//!
//! ```text
//! {"criteria_evaluation": {
//!     "study_design": {"assessment": "YES", "reasoning": "Cluster RCT"},
//!     "publication_year": {"year_extracted": "2016", "reasoning": "Dated 2016"}
//! }}
//! ```
//!
//! A bare criterion map (without `criteria_evaluation`) is accepted too. Keys
//! are matched against rubric ids and aliases; only requested criteria are
//! kept. Any output that yields no usable record is
//! [`Error::MalformedEngineOutput`].

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::screening::{
    Assessment, AssessmentSet, Criterion, CriterionDef, CriterionKind, CriterionRecord, Rubric,
};

/// Reasoning attached to criteria the engine did not answer.
pub const NOT_REPORTED: &str = "not reported by engine";

const NO_REASONING: &str = "No reasoning provided";

/// Parse engine output into records for the `requested` criteria.
///
/// Records are returned in rubric order. Criteria the engine skipped are
/// simply absent; use [`complete`] to fill them in as UNCLEAR.
pub fn parse_assessments(
    content: &str,
    rubric: &Rubric,
    requested: &[Criterion],
) -> Result<Vec<CriterionRecord>> {
    let normalized = normalize_quotes(content);
    let block = extract_json_block(&normalized);

    let value: Value = serde_json::from_str(block)
        .map_err(|e| Error::malformed(format!("engine output is not valid JSON: {}", e)))?;
    let root = value
        .as_object()
        .ok_or_else(|| Error::malformed("engine output is not a JSON object"))?;
    let evaluations = root
        .get("criteria_evaluation")
        .and_then(Value::as_object)
        .unwrap_or(root);

    // (reported under canonical id, record)
    let mut found: BTreeMap<Criterion, (bool, CriterionRecord)> = BTreeMap::new();
    for (key, entry) in evaluations {
        let Some(def) = rubric.resolve(key) else {
            debug!(key = %key, "Ignoring unknown criterion in engine output");
            continue;
        };
        if !requested.contains(&def.id) {
            debug!(criterion = %def.id, "Ignoring criterion that was not requested");
            continue;
        }
        let canonical = def.id.as_str().eq_ignore_ascii_case(key.trim());
        let replace = match found.get(&def.id) {
            None => true,
            Some((was_canonical, _)) => canonical && !was_canonical,
        };
        if replace {
            found.insert(def.id.clone(), (canonical, parse_entry(def, entry)));
        }
    }

    if found.is_empty() {
        return Err(Error::malformed(
            "engine output contains no assessment for any requested criterion",
        ));
    }

    Ok(rubric
        .criteria()
        .filter_map(|c| found.remove(c).map(|(_, record)| record))
        .collect())
}

/// Build a full set for `requested`, marking unreported criteria UNCLEAR.
pub fn complete(
    records: Vec<CriterionRecord>,
    rubric: &Rubric,
    requested: &[Criterion],
) -> Result<AssessmentSet> {
    let set = AssessmentSet::from_records(records)?;
    let gaps: Vec<CriterionRecord> = rubric
        .criteria()
        .filter(|c| requested.contains(c) && !set.contains(c))
        .map(|c| CriterionRecord::unclear(c.clone(), NOT_REPORTED))
        .collect();
    Ok(set.with_replaced(gaps))
}

fn parse_entry(def: &CriterionDef, entry: &Value) -> CriterionRecord {
    let criterion = def.id.clone();
    let fields = match entry {
        Value::Object(fields) => fields,
        Value::String(token) => return CriterionRecord::from_raw(criterion, token, NO_REASONING),
        other => return CriterionRecord::from_raw(criterion, &other.to_string(), NO_REASONING),
    };

    let reasoning = fields
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or(NO_REASONING);

    if let CriterionKind::MinimumYear { min_year } = def.kind() {
        if let Some(year) = fields.get("year_extracted") {
            return year_record(criterion, year, min_year, reasoning);
        }
    }

    match fields.get("assessment") {
        Some(Value::String(token)) => CriterionRecord::from_raw(criterion, token, reasoning),
        Some(other) => CriterionRecord::from_raw(criterion, &other.to_string(), reasoning),
        None => CriterionRecord::unclear(criterion, reasoning),
    }
}

/// Apply a minimum-year threshold to an extracted year.
fn year_record(
    criterion: Criterion,
    extracted: &Value,
    min_year: i32,
    reasoning: &str,
) -> CriterionRecord {
    match extracted_year(extracted) {
        Some(year) if year >= min_year => CriterionRecord::new(
            criterion,
            Assessment::Yes,
            format!("Year {} >= {} (extracted, threshold applied in code)", year, min_year),
        ),
        Some(year) => CriterionRecord::new(
            criterion,
            Assessment::No,
            format!("Year {} < {} (extracted, threshold applied in code)", year, min_year),
        ),
        None => CriterionRecord::unclear(criterion, format!("Year extraction: {}", reasoning)),
    }
}

fn extracted_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Replace typographic quotes that models sometimes emit inside JSON.
fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Extract the JSON body from a fenced block or the outermost braces.
pub(crate) fn extract_json_block(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        return match response[content_start..].find("```") {
            Some(end) => response[content_start..content_start + end].trim(),
            None => response[content_start..].trim(),
        };
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        let content_start = response[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return &response[start..=end];
            }
        }
    }

    response.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::ScreeningMode;
    use pretty_assertions::assert_eq;

    fn rubric() -> Rubric {
        Rubric::cash_plus_assets(ScreeningMode::TitleAbstract)
    }

    fn all(rubric: &Rubric) -> Vec<Criterion> {
        rubric.criteria().cloned().collect()
    }

    #[test]
    fn test_fenced_block_with_wrapper_key() {
        let rubric = rubric();
        let content = r#"Here is my evaluation:
```json
{"criteria_evaluation": {
  "lmic_participants": {"assessment": "YES", "reasoning": "Kenya"},
  "study_design": {"assessment": "no", "reasoning": "Review article"}
}}
```"#;
        let records = parse_assessments(content, &rubric, &all(&rubric)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].criterion().as_str(), "lmic_participants");
        assert_eq!(records[0].assessment(), Assessment::Yes);
        assert_eq!(records[1].assessment(), Assessment::No);
        assert_eq!(records[1].reasoning(), "Review article");
    }

    #[test]
    fn test_bare_map_and_aliases() {
        let rubric = rubric();
        let content = r#"{"component_a_cash_support": {"assessment": "UNCLEAR", "reasoning": "?"},
                         "participants_lmic": "YES"}"#;
        let records = parse_assessments(content, &rubric, &all(&rubric)).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.criterion().as_str()).collect();
        assert_eq!(ids, vec!["lmic_participants", "cash_support"]);
        assert_eq!(records[0].reasoning(), NO_REASONING);
    }

    #[test]
    fn test_canonical_key_wins_over_alias() {
        let rubric = rubric();
        let content = r#"{"publication_year_2004_plus": {"assessment": "NO"},
                         "publication_year": {"assessment": "YES"}}"#;
        let records = parse_assessments(content, &rubric, &all(&rubric)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assessment(), Assessment::Yes);
    }

    #[test]
    fn test_unknown_token_is_coerced_not_dropped() {
        let rubric = rubric();
        let content = r#"{"completed_study": {"assessment": "PARTIALLY", "reasoning": "Ongoing"}}"#;
        let records = parse_assessments(content, &rubric, &all(&rubric)).unwrap();
        assert_eq!(records[0].assessment(), Assessment::Unclear);
        assert_eq!(records[0].raw_assessment(), Some("PARTIALLY"));
    }

    #[test]
    fn test_year_threshold_applied_in_code() {
        let rubric = rubric();
        let requested = all(&rubric);
        let cases = [
            (r#"{"publication_year": {"year_extracted": "2016"}}"#, Assessment::Yes),
            (r#"{"publication_year": {"year_extracted": 2004}}"#, Assessment::Yes),
            (r#"{"publication_year": {"year_extracted": "1999"}}"#, Assessment::No),
            (
                r#"{"publication_year": {"year_extracted": "Year not provided", "reasoning": "none"}}"#,
                Assessment::Unclear,
            ),
        ];
        for (content, expected) in cases {
            let records = parse_assessments(content, &rubric, &requested).unwrap();
            assert_eq!(records[0].assessment(), expected, "{}", content);
        }
    }

    #[test]
    fn test_unrequested_criteria_are_ignored() {
        let rubric = rubric();
        let content = r#"{"lmic_participants": "YES", "cash_support": "NO"}"#;
        let records =
            parse_assessments(content, &rubric, &[Criterion::new("cash_support")]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].criterion().as_str(), "cash_support");
    }

    #[test]
    fn test_malformed_outputs() {
        let rubric = rubric();
        let requested = all(&rubric);
        for content in ["no json here", "[1, 2, 3]", r#"{"unrelated": "YES"}"#, "```json\n{broken"] {
            let err = parse_assessments(content, &rubric, &requested).unwrap_err();
            assert!(
                matches!(err, Error::MalformedEngineOutput { .. }),
                "{}: {}",
                content,
                err
            );
        }
    }

    #[test]
    fn test_smart_quotes_are_normalised() {
        let rubric = rubric();
        let content = "{\u{201C}study_design\u{201D}: {\u{201C}assessment\u{201D}: \u{201C}YES\u{201D}}}";
        let records = parse_assessments(content, &rubric, &all(&rubric)).unwrap();
        assert_eq!(records[0].assessment(), Assessment::Yes);
    }

    #[test]
    fn test_complete_fills_gaps_with_unclear() {
        let rubric = rubric();
        let requested = all(&rubric);
        let records = parse_assessments(r#"{"study_design": "YES"}"#, &rubric, &requested).unwrap();
        let set = complete(records, &rubric, &requested).unwrap();
        assert_eq!(set.len(), 7);
        assert!(set.missing_from(&rubric).is_empty());
        let gap = set.get(&Criterion::new("completed_study")).unwrap();
        assert_eq!(gap.assessment(), Assessment::Unclear);
        assert_eq!(gap.reasoning(), NOT_REPORTED);
    }

    #[test]
    fn test_extract_json_block_variants() {
        assert_eq!(extract_json_block("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json_block("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json_block("text {\"a\": {\"b\": 2}} tail"), "{\"a\": {\"b\": 2}}");
    }
}
