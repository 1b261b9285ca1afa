//! Single-engine decision processor.
//!
//! Turns a complete [`AssessmentSet`] into INCLUDE / EXCLUDE / MAYBE using a
//! fixed three-rule precedence:
//!
//! 1. `any-no-excludes`: at least one NO excludes the paper.
//! 2. `all-yes-includes`: no NO and no UNCLEAR includes it.
//! 3. `unclear-requires-review`: anything else is MAYBE.
//!
//! There is no scoring or weighting. The processor is pure and never suspends.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{Error, Result};

use super::rubric::Rubric;
use super::types::{
    Assessment, AssessmentCounts, AssessmentSet, Criterion, Decision, DecisionResult, DecisionRule,
};

/// Applies the decision rules against one rubric.
#[derive(Debug, Clone)]
pub struct DecisionProcessor {
    rubric: Arc<Rubric>,
}

impl DecisionProcessor {
    pub fn new(rubric: Arc<Rubric>) -> Self {
        Self { rubric }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Decide a paper from its assessment set.
    ///
    /// Fails with [`Error::IncompleteAssessment`] if any rubric criterion is
    /// missing. Records for criteria outside the rubric are dropped.
    pub fn decide(&self, assessments: &AssessmentSet) -> Result<DecisionResult> {
        decide(&self.rubric, assessments)
    }
}

/// Free-function form of [`DecisionProcessor::decide`].
pub fn decide(rubric: &Rubric, assessments: &AssessmentSet) -> Result<DecisionResult> {
    let missing = assessments.missing_from(rubric);
    if !missing.is_empty() {
        let err = Error::incomplete(missing);
        error!(rubric = rubric.name(), "{}", err);
        return Err(err);
    }

    let mut counts = AssessmentCounts::default();
    for criterion in rubric.criteria() {
        if let Some(assessment) = assessments.assessment(criterion) {
            counts.record(assessment);
        }
    }

    let (decision, rule_applied, reasoning) = if counts.no > 0 {
        let no = assessments.criteria_with(rubric, Assessment::No);
        (
            Decision::Exclude,
            DecisionRule::AnyNoExcludes,
            format!(
                "EXCLUDE: {} criteria marked as NO ({})",
                counts.no,
                join(&no)
            ),
        )
    } else if counts.unclear == 0 {
        (
            Decision::Include,
            DecisionRule::AllYesIncludes,
            format!("INCLUDE: All {} criteria marked as YES", counts.yes),
        )
    } else {
        let unclear = assessments.criteria_with(rubric, Assessment::Unclear);
        (
            Decision::Maybe,
            DecisionRule::UnclearRequiresReview,
            format!(
                "MAYBE: 0 NO criteria, {} unclear ({})",
                counts.unclear,
                join(&unclear)
            ),
        )
    };

    debug!(rule = %rule_applied, decision = %decision, "Decision rule applied");

    Ok(DecisionResult {
        decision,
        reasoning,
        rule_applied,
        counts,
        assessment_set: assessments.restricted_to(rubric),
    })
}

fn join(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .map(Criterion::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
