//! Follow-up resolver: a second, narrower pass over criteria left UNCLEAR.
//!
//! The resolver never decides anything itself. It asks the assessor again
//! about the UNCLEAR criteria only, merges the answers into the first pass,
//! and hands the merged set back for the caller to re-decide.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::assess::{parse_assessments, AssessmentRequest, Assessor};
use crate::error::{Error, Result};
use crate::paper::Paper;

use super::rubric::Rubric;
use super::types::{Assessment, AssessmentSet, Criterion, CriterionRecord, FollowUpOutcome};

#[derive(Debug, Clone)]
pub struct FollowUpResolver {
    rubric: Arc<Rubric>,
}

impl FollowUpResolver {
    pub fn new(rubric: Arc<Rubric>) -> Self {
        Self { rubric }
    }

    /// Criteria a follow-up pass would target, in rubric order.
    pub fn targets(&self, first_pass: &AssessmentSet) -> Vec<Criterion> {
        first_pass.criteria_with(&self.rubric, Assessment::Unclear)
    }

    /// Re-assess the UNCLEAR criteria of `first_pass`.
    ///
    /// A failed or unparseable second pass is not an error: the targeted
    /// criteria stay UNCLEAR and the failure is recorded in the outcome.
    /// Returns [`Error::NothingToResolve`] if nothing is UNCLEAR.
    #[instrument(skip_all, fields(paper_id = %paper.id, assessor = assessor.name()))]
    pub async fn resolve(
        &self,
        paper: &Paper,
        first_pass: &AssessmentSet,
        assessor: &dyn Assessor,
    ) -> Result<FollowUpOutcome> {
        let targets = self.targets(first_pass);
        if targets.is_empty() {
            return Err(Error::NothingToResolve);
        }
        debug!(targets = targets.len(), "Starting follow-up pass");

        let request = AssessmentRequest::followup(paper, &self.rubric, &targets, first_pass);
        let (second_pass, failure, usage) = match assessor.assess(request).await {
            Ok(output) => match parse_assessments(&output.content, &self.rubric, &targets) {
                Ok(records) => (records, None, output.usage),
                Err(e) => {
                    warn!("Follow-up output unusable: {}", e);
                    (Vec::new(), Some(e.to_string()), output.usage)
                }
            },
            Err(e) => {
                warn!("Follow-up call failed: {}", e);
                (Vec::new(), Some(e.to_string()), Default::default())
            }
        };

        let mut outcome = merge(first_pass, &targets, second_pass, failure);
        outcome.usage = usage;
        debug!(
            changed = outcome.changed_criteria.len(),
            unresolved = outcome.unresolved.len(),
            "Follow-up merged"
        );
        Ok(outcome)
    }
}

/// Merge a second pass into the first.
///
/// Only targets that were UNCLEAR in `first_pass` can be overwritten; records
/// for any other criterion are ignored. A target the second pass did not
/// report keeps its first-pass record and is listed as unresolved.
pub fn merge(
    first_pass: &AssessmentSet,
    targets: &[Criterion],
    second_pass: impl IntoIterator<Item = CriterionRecord>,
    failure: Option<String>,
) -> FollowUpOutcome {
    let targeted: BTreeSet<Criterion> = targets
        .iter()
        .filter(|c| first_pass.assessment(c) == Some(Assessment::Unclear))
        .cloned()
        .collect();

    let mut reported = BTreeSet::new();
    let replacements: Vec<CriterionRecord> = second_pass
        .into_iter()
        .filter(|r| targeted.contains(r.criterion()) && reported.insert(r.criterion().clone()))
        .collect();

    let resolved = first_pass.with_replaced(replacements);
    let changed_criteria = targeted
        .iter()
        .filter(|c| resolved.assessment(c) != first_pass.assessment(c))
        .cloned()
        .collect();
    let unresolved = targeted.difference(&reported).cloned().collect();

    FollowUpOutcome {
        original: first_pass.clone(),
        resolved,
        targeted,
        changed_criteria,
        unresolved,
        failure,
        usage: Default::default(),
    }
}
