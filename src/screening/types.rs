//! Value types for criterion assessments, decisions, and reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::llm::TokenUsage;

use super::rubric::Rubric;

/// Identifier of one rubric criterion (e.g. `lmic_participants`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criterion(String);

impl Criterion {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Criterion {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Assessment of a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Assessment {
    Yes,
    No,
    Unclear,
}

impl Assessment {
    pub const ALL: [Assessment; 3] = [Assessment::Yes, Assessment::No, Assessment::Unclear];

    /// Parse a raw token. Only `YES`, `NO` and `UNCLEAR` are valid
    /// (case-insensitive, surrounding whitespace ignored).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            "UNCLEAR" => Some(Self::Unclear),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Unclear => "UNCLEAR",
        }
    }
}

impl std::fmt::Display for Assessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One criterion's assessment with its reasoning.
///
/// Records are immutable once built. When the engine reported a token that is
/// not a valid [`Assessment`], the record is UNCLEAR and the original token is
/// kept in `raw_assessment` for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionRecord {
    criterion: Criterion,
    assessment: Assessment,
    reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_assessment: Option<String>,
}

impl CriterionRecord {
    pub fn new(criterion: Criterion, assessment: Assessment, reasoning: impl Into<String>) -> Self {
        Self {
            criterion,
            assessment,
            reasoning: reasoning.into(),
            raw_assessment: None,
        }
    }

    /// Build from an unvalidated token, coercing anything unexpected to UNCLEAR.
    pub fn from_raw(criterion: Criterion, raw: &str, reasoning: impl Into<String>) -> Self {
        match Assessment::parse(raw) {
            Some(assessment) => Self::new(criterion, assessment, reasoning),
            None => Self {
                criterion,
                assessment: Assessment::Unclear,
                reasoning: reasoning.into(),
                raw_assessment: Some(raw.to_string()),
            },
        }
    }

    pub fn unclear(criterion: Criterion, reasoning: impl Into<String>) -> Self {
        Self::new(criterion, Assessment::Unclear, reasoning)
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    pub fn assessment(&self) -> Assessment {
        self.assessment
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// The engine's original token when it had to be coerced.
    pub fn raw_assessment(&self) -> Option<&str> {
        self.raw_assessment.as_deref()
    }

    pub fn is_coerced(&self) -> bool {
        self.raw_assessment.is_some()
    }
}

/// Mapping from criterion to its record, at most one record per criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentSet {
    records: BTreeMap<Criterion, CriterionRecord>,
}

impl AssessmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from records, rejecting duplicate criteria.
    pub fn from_records(records: impl IntoIterator<Item = CriterionRecord>) -> Result<Self> {
        let mut set = Self::new();
        for record in records {
            let criterion = record.criterion().clone();
            if set.records.insert(criterion.clone(), record).is_some() {
                return Err(Error::Internal(format!(
                    "duplicate assessment for criterion {}",
                    criterion
                )));
            }
        }
        Ok(set)
    }

    /// Every rubric criterion marked UNCLEAR with the same reasoning.
    pub fn all_unclear(rubric: &Rubric, reasoning: &str) -> Self {
        let records = rubric
            .criteria()
            .map(|c| (c.clone(), CriterionRecord::unclear(c.clone(), reasoning)))
            .collect();
        Self { records }
    }

    pub fn get(&self, criterion: &Criterion) -> Option<&CriterionRecord> {
        self.records.get(criterion)
    }

    pub fn assessment(&self, criterion: &Criterion) -> Option<Assessment> {
        self.records.get(criterion).map(|r| r.assessment())
    }

    pub fn contains(&self, criterion: &Criterion) -> bool {
        self.records.contains_key(criterion)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CriterionRecord> {
        self.records.values()
    }

    /// Rubric criteria with no record in this set, in rubric order.
    pub fn missing_from(&self, rubric: &Rubric) -> Vec<Criterion> {
        rubric
            .criteria()
            .filter(|c| !self.records.contains_key(*c))
            .cloned()
            .collect()
    }

    /// Rubric criteria carrying the given assessment, in rubric order.
    pub fn criteria_with(&self, rubric: &Rubric, assessment: Assessment) -> Vec<Criterion> {
        rubric
            .criteria()
            .filter(|c| self.assessment(c) == Some(assessment))
            .cloned()
            .collect()
    }

    /// A copy holding only the rubric's criteria.
    pub fn restricted_to(&self, rubric: &Rubric) -> Self {
        let records = self
            .records
            .iter()
            .filter(|(c, _)| rubric.contains(c))
            .map(|(c, r)| (c.clone(), r.clone()))
            .collect();
        Self { records }
    }

    /// A copy with the given records replacing (or adding) their criteria.
    pub fn with_replaced(&self, replacements: impl IntoIterator<Item = CriterionRecord>) -> Self {
        let mut records = self.records.clone();
        for record in replacements {
            records.insert(record.criterion().clone(), record);
        }
        Self { records }
    }
}

/// Final verdict for a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Include,
    Exclude,
    Maybe,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Include, Decision::Exclude, Decision::Maybe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "INCLUDE",
            Self::Exclude => "EXCLUDE",
            Self::Maybe => "MAYBE",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of criteria per assessment value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentCounts {
    pub yes: usize,
    pub no: usize,
    pub unclear: usize,
}

impl AssessmentCounts {
    pub fn total(&self) -> usize {
        self.yes + self.no + self.unclear
    }

    pub fn record(&mut self, assessment: Assessment) {
        match assessment {
            Assessment::Yes => self.yes += 1,
            Assessment::No => self.no += 1,
            Assessment::Unclear => self.unclear += 1,
        }
    }
}

/// Which branch of the decision logic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionRule {
    AnyNoExcludes,
    AllYesIncludes,
    UnclearRequiresReview,
}

impl DecisionRule {
    /// Stable identifier used in audit output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnyNoExcludes => "any-no-excludes",
            Self::AllYesIncludes => "all-yes-includes",
            Self::UnclearRequiresReview => "unclear-requires-review",
        }
    }
}

impl std::fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the decision processor for one assessment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub reasoning: String,
    pub rule_applied: DecisionRule,
    pub counts: AssessmentCounts,
    pub assessment_set: AssessmentSet,
}

/// Result of a follow-up pass over the criteria left UNCLEAR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpOutcome {
    pub original: AssessmentSet,
    pub resolved: AssessmentSet,
    /// Criteria the follow-up pass was asked to re-evaluate.
    pub targeted: BTreeSet<Criterion>,
    /// Targeted criteria whose assessment differs after follow-up.
    pub changed_criteria: BTreeSet<Criterion>,
    /// Targeted criteria the follow-up pass gave no usable answer for.
    pub unresolved: BTreeSet<Criterion>,
    /// Why the follow-up call failed, if it did.
    pub failure: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl FollowUpOutcome {
    pub fn changed(&self) -> bool {
        !self.changed_criteria.is_empty()
    }
}

/// One engine's final outcome for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub engine_id: String,
    pub decision_result: DecisionResult,
    /// Decision before any follow-up pass.
    pub first_pass_decision: Decision,
    pub followup: Option<FollowUpOutcome>,
    pub elapsed_ms: u64,
    /// Tokens spent across the first pass and any follow-up.
    #[serde(default)]
    pub usage: TokenUsage,
    /// Recovered problems worth keeping for audit (e.g. malformed output).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl EngineOutcome {
    pub fn decision(&self) -> Decision {
        self.decision_result.decision
    }
}

/// An engine that produced no outcome for a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub engine_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl EngineFailure {
    pub fn from_error(engine_id: impl Into<String>, error: &Error) -> Self {
        Self {
            engine_id: engine_id.into(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// How two engines' final decisions relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementCategory {
    AgreeInclude,
    AgreeExclude,
    AgreeMaybe,
    DisagreeIncludeExclude,
    DisagreeMaybeExclude,
    DisagreeMaybeInclude,
    /// Reserved; unreachable with a three-valued [`Decision`].
    DisagreeOther,
    /// Only one engine configured.
    SingleEngine,
    /// Two engines configured but only one reported.
    Incomplete,
}

impl AgreementCategory {
    pub fn is_agreement(&self) -> bool {
        matches!(
            self,
            Self::AgreeInclude | Self::AgreeExclude | Self::AgreeMaybe
        )
    }

    pub fn is_disagreement(&self) -> bool {
        matches!(
            self,
            Self::DisagreeIncludeExclude
                | Self::DisagreeMaybeExclude
                | Self::DisagreeMaybeInclude
                | Self::DisagreeOther
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgreeInclude => "agree_include",
            Self::AgreeExclude => "agree_exclude",
            Self::AgreeMaybe => "agree_maybe",
            Self::DisagreeIncludeExclude => "disagree_include_exclude",
            Self::DisagreeMaybeExclude => "disagree_maybe_exclude",
            Self::DisagreeMaybeInclude => "disagree_maybe_include",
            Self::DisagreeOther => "disagree_other",
            Self::SingleEngine => "single_engine",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for AgreementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consensus over all engines for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledResult {
    pub paper_id: String,
    pub engine_outcomes: Vec<EngineOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engine_failures: Vec<EngineFailure>,
    pub agreement_category: AgreementCategory,
    pub consensus_decision: Decision,
    pub needs_human_review: bool,
    /// Set when a dual-engine run only heard back from one engine.
    #[serde(default)]
    pub single_engine_reported: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::rubric::{CriterionDef, Rubric, ScreeningMode};

    fn rubric(ids: &[&str]) -> Rubric {
        Rubric::new(
            "test",
            ScreeningMode::TitleAbstract,
            ids.iter().map(|id| CriterionDef::new(*id, *id)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_assessment_parse_is_strict() {
        assert_eq!(Assessment::parse("yes"), Some(Assessment::Yes));
        assert_eq!(Assessment::parse("  NO "), Some(Assessment::No));
        assert_eq!(Assessment::parse("Unclear"), Some(Assessment::Unclear));
        assert_eq!(Assessment::parse("PARTIAL"), None);
        assert_eq!(Assessment::parse("Y"), None);
        assert_eq!(Assessment::parse(""), None);
    }

    #[test]
    fn test_record_coerces_unknown_token() {
        let record = CriterionRecord::from_raw("study_design".into(), "PROBABLY", "RCT-ish");
        assert_eq!(record.assessment(), Assessment::Unclear);
        assert_eq!(record.raw_assessment(), Some("PROBABLY"));
        assert!(record.is_coerced());
        assert_eq!(record.reasoning(), "RCT-ish");

        let clean = CriterionRecord::from_raw("study_design".into(), "yes", "");
        assert_eq!(clean.assessment(), Assessment::Yes);
        assert!(!clean.is_coerced());
        assert_eq!(clean.reasoning(), "");
    }

    #[test]
    fn test_set_rejects_duplicates() {
        let result = AssessmentSet::from_records(vec![
            CriterionRecord::new("a".into(), Assessment::Yes, ""),
            CriterionRecord::new("a".into(), Assessment::No, ""),
        ]);
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_set_missing_and_filters_follow_rubric_order() {
        let rubric = rubric(&["c", "a", "b"]);
        let set = AssessmentSet::from_records(vec![
            CriterionRecord::new("a".into(), Assessment::Unclear, ""),
            CriterionRecord::new("x".into(), Assessment::No, ""),
        ])
        .unwrap();

        assert_eq!(set.missing_from(&rubric), vec![Criterion::new("c"), Criterion::new("b")]);
        assert_eq!(
            set.criteria_with(&rubric, Assessment::Unclear),
            vec![Criterion::new("a")]
        );
        // "x" is not part of the rubric
        assert!(set.criteria_with(&rubric, Assessment::No).is_empty());
        assert_eq!(set.restricted_to(&rubric).len(), 1);
    }

    #[test]
    fn test_with_replaced_leaves_original_untouched() {
        let set = AssessmentSet::from_records(vec![
            CriterionRecord::new("a".into(), Assessment::Unclear, "first"),
        ])
        .unwrap();
        let replaced = set.with_replaced(vec![CriterionRecord::new(
            "a".into(),
            Assessment::Yes,
            "second",
        )]);

        assert_eq!(set.assessment(&"a".into()), Some(Assessment::Unclear));
        assert_eq!(replaced.assessment(&"a".into()), Some(Assessment::Yes));
    }

    #[test]
    fn test_serialized_forms() {
        assert_eq!(serde_json::to_string(&Decision::Maybe).unwrap(), "\"MAYBE\"");
        assert_eq!(
            serde_json::to_string(&DecisionRule::AnyNoExcludes).unwrap(),
            "\"any-no-excludes\""
        );
        assert_eq!(
            serde_json::to_string(&AgreementCategory::DisagreeMaybeInclude).unwrap(),
            "\"disagree_maybe_include\""
        );
        let record = CriterionRecord::new("a".into(), Assessment::No, "r");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["assessment"], "NO");
        assert!(json.get("raw_assessment").is_none());
    }

    #[test]
    fn test_counts_total() {
        let mut counts = AssessmentCounts::default();
        counts.record(Assessment::Yes);
        counts.record(Assessment::No);
        counts.record(Assessment::Unclear);
        counts.record(Assessment::Unclear);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.unclear, 2);
    }
}
