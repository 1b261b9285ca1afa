//! Deterministic decision fusion.
//!
//! Everything in this module is synchronous and side-effect free apart from
//! the follow-up pass, which awaits the assessor:
//!
//! - [`decision`]: complete assessment set to INCLUDE / EXCLUDE / MAYBE
//! - [`followup`]: second pass over UNCLEAR criteria, merged into the first
//! - [`reconcile`]: two engines' decisions to a consensus and review flag
//!
//! Rubrics are data ([`Rubric`]), so none of the rules name a criterion.

pub mod decision;
pub mod followup;
mod proptest;
pub mod reconcile;
pub mod rubric;
pub mod types;

pub use decision::{decide, DecisionProcessor};
pub use followup::{merge, FollowUpResolver};
pub use reconcile::{classify, consensus, reconcile, reconcile_partial, reconcile_single};
pub use rubric::{CriterionDef, CriterionKind, Rubric, ScreeningMode};
pub use types::{
    AgreementCategory, Assessment, AssessmentCounts, AssessmentSet, Criterion, CriterionRecord,
    Decision, DecisionResult, DecisionRule, EngineFailure, EngineOutcome, FollowUpOutcome,
    ReconciledResult,
};
