//! Dual-engine reconciler.
//!
//! Classifies the pair of final decisions from two engines and derives a
//! conservative consensus: agreement keeps the shared decision, any
//! disagreement becomes MAYBE and is routed to a human reviewer. Neither
//! engine is ever preferred over the other.

use tracing::warn;

use crate::error::Error;

use super::types::{AgreementCategory, Decision, EngineFailure, EngineOutcome, ReconciledResult};

/// Classify a pair of decisions. Symmetric in its arguments.
pub fn classify(a: Decision, b: Decision) -> AgreementCategory {
    use AgreementCategory::*;
    use Decision::*;

    match (a, b) {
        (Include, Include) => AgreeInclude,
        (Exclude, Exclude) => AgreeExclude,
        (Maybe, Maybe) => AgreeMaybe,
        (Include, Exclude) | (Exclude, Include) => DisagreeIncludeExclude,
        (Maybe, Exclude) | (Exclude, Maybe) => DisagreeMaybeExclude,
        (Maybe, Include) | (Include, Maybe) => DisagreeMaybeInclude,
    }
}

/// Consensus for a category: the agreed decision, otherwise MAYBE.
pub fn consensus(category: AgreementCategory, agreed: Decision) -> Decision {
    if category.is_agreement() {
        agreed
    } else {
        Decision::Maybe
    }
}

/// Reconcile two engines' outcomes for one paper.
pub fn reconcile(paper_id: &str, a: &EngineOutcome, b: &EngineOutcome) -> ReconciledResult {
    let category = classify(a.decision(), b.decision());
    ReconciledResult {
        paper_id: paper_id.to_string(),
        engine_outcomes: vec![a.clone(), b.clone()],
        engine_failures: Vec::new(),
        agreement_category: category,
        consensus_decision: consensus(category, a.decision()),
        needs_human_review: category.is_disagreement(),
        single_engine_reported: false,
    }
}

/// Wrap the outcome of a single-engine run.
pub fn reconcile_single(paper_id: &str, outcome: &EngineOutcome) -> ReconciledResult {
    ReconciledResult {
        paper_id: paper_id.to_string(),
        engine_outcomes: vec![outcome.clone()],
        engine_failures: Vec::new(),
        agreement_category: AgreementCategory::SingleEngine,
        consensus_decision: outcome.decision(),
        needs_human_review: false,
        single_engine_reported: false,
    }
}

/// Handle a dual-engine paper where only one engine reported.
///
/// The surviving decision is kept for audit but never adopted: the consensus
/// is MAYBE and the paper goes to review.
pub fn reconcile_partial(
    paper_id: &str,
    outcome: &EngineOutcome,
    failure: EngineFailure,
) -> ReconciledResult {
    let err = Error::reconciliation_impossible(paper_id, vec![failure.engine_id.clone()]);
    warn!(
        paper_id,
        reported = %outcome.engine_id,
        reason = %failure.reason,
        "{}",
        err
    );

    ReconciledResult {
        paper_id: paper_id.to_string(),
        engine_outcomes: vec![outcome.clone()],
        engine_failures: vec![failure],
        agreement_category: AgreementCategory::Incomplete,
        consensus_decision: Decision::Maybe,
        needs_human_review: true,
        single_engine_reported: true,
    }
}
