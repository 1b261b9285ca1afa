//! Property-based tests for the decision-fusion layer using proptest.
//!
//! These tests check the invariants the screening pipeline relies on:
//!
//! - A single NO always excludes, whatever else is present
//! - Missing criteria always fail, complete sets never fail on coverage
//! - Follow-up never touches criteria that were already YES or NO
//! - Reconciliation is order-independent and every disagreement goes to review

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use crate::error::Error;
    use crate::screening::decision::decide;
    use crate::screening::followup::merge;
    use crate::screening::reconcile::{classify, consensus, reconcile};
    use crate::screening::rubric::{CriterionDef, Rubric, ScreeningMode};
    use crate::screening::types::{
        Assessment, AssessmentSet, Criterion, CriterionRecord, Decision, EngineOutcome,
    };

    fn assessment() -> impl Strategy<Value = Assessment> {
        prop_oneof![
            Just(Assessment::Yes),
            Just(Assessment::No),
            Just(Assessment::Unclear),
        ]
    }

    fn decision() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::Include),
            Just(Decision::Exclude),
            Just(Decision::Maybe),
        ]
    }

    // Rubric sizes 1..=10 with one assessment per criterion
    fn assessments() -> impl Strategy<Value = Vec<Assessment>> {
        prop::collection::vec(assessment(), 1..=10)
    }

    fn rubric(n: usize) -> Rubric {
        Rubric::new(
            "prop",
            ScreeningMode::TitleAbstract,
            (0..n)
                .map(|i| CriterionDef::new(format!("c{}", i), format!("C{}", i)))
                .collect(),
        )
        .unwrap()
    }

    fn set(values: &[Assessment]) -> AssessmentSet {
        AssessmentSet::from_records(values.iter().enumerate().map(|(i, a)| {
            CriterionRecord::new(Criterion::new(format!("c{}", i)), *a, "")
        }))
        .unwrap()
    }

    fn outcome(engine: &str, decision: Decision) -> EngineOutcome {
        let value = match decision {
            Decision::Include => Assessment::Yes,
            Decision::Exclude => Assessment::No,
            Decision::Maybe => Assessment::Unclear,
        };
        let result = decide(&rubric(1), &set(&[value])).unwrap();
        EngineOutcome {
            engine_id: engine.to_string(),
            first_pass_decision: result.decision,
            decision_result: result,
            followup: None,
            elapsed_ms: 0,
            usage: Default::default(),
            notes: Vec::new(),
        }
    }

    // =========================================================================
    // Decision Processor Properties
    // =========================================================================

    proptest! {
        /// Any NO excludes, regardless of the other assessments.
        #[test]
        fn any_no_is_absorbing(values in assessments()) {
            let result = decide(&rubric(values.len()), &set(&values)).unwrap();
            let has_no = values.contains(&Assessment::No);
            prop_assert_eq!(result.decision == Decision::Exclude, has_no);
        }

        /// The three rules partition every complete set.
        #[test]
        fn rules_partition_inputs(values in assessments()) {
            let result = decide(&rubric(values.len()), &set(&values)).unwrap();
            let expected = if values.contains(&Assessment::No) {
                Decision::Exclude
            } else if values.contains(&Assessment::Unclear) {
                Decision::Maybe
            } else {
                Decision::Include
            };
            prop_assert_eq!(result.decision, expected);
            prop_assert_eq!(result.counts.total(), values.len());
        }

        /// Dropping any criterion is always an IncompleteAssessment.
        #[test]
        fn missing_criterion_always_fails(
            values in assessments(),
            drop in any::<prop::sample::Index>()
        ) {
            let dropped = drop.index(values.len());
            let records = values.iter().enumerate().filter(|(i, _)| *i != dropped).map(|(i, a)| {
                CriterionRecord::new(Criterion::new(format!("c{}", i)), *a, "")
            });
            let partial = AssessmentSet::from_records(records).unwrap();
            let err = decide(&rubric(values.len()), &partial).unwrap_err();
            let is_incomplete = matches!(err, Error::IncompleteAssessment { .. });
            prop_assert!(is_incomplete);
        }
    }

    // =========================================================================
    // Follow-up Properties
    // =========================================================================

    proptest! {
        /// Follow-up leaves YES/NO untouched and only changes targeted criteria.
        #[test]
        fn followup_only_touches_unclear(
            first in assessments(),
            second in prop::collection::vec(assessment(), 10)
        ) {
            let rubric = rubric(first.len());
            let first_pass = set(&first);
            let targets: Vec<Criterion> = rubric.criteria().cloned().collect();
            let second_pass = set(&second[..first.len()]);

            let outcome = merge(&first_pass, &targets, second_pass.iter().cloned(), None);

            for (i, value) in first.iter().enumerate() {
                let c = Criterion::new(format!("c{}", i));
                if *value != Assessment::Unclear {
                    prop_assert_eq!(outcome.resolved.assessment(&c), Some(*value));
                    prop_assert!(!outcome.changed_criteria.contains(&c));
                } else {
                    prop_assert_eq!(outcome.resolved.assessment(&c), Some(second[i]));
                }
            }
            let unclear: BTreeSet<Criterion> =
                first_pass.criteria_with(&rubric, Assessment::Unclear).into_iter().collect();
            prop_assert!(outcome.changed_criteria.is_subset(&unclear));
            prop_assert!(decide(&rubric, &outcome.resolved).is_ok());
        }

        /// A second pass that stays UNCLEAR reproduces the first decision.
        #[test]
        fn unclear_followup_is_idempotent(first in assessments()) {
            let rubric = rubric(first.len());
            let first_pass = set(&first);
            let targets = first_pass.criteria_with(&rubric, Assessment::Unclear);
            let again = targets
                .iter()
                .map(|c| CriterionRecord::unclear(c.clone(), "still unclear"));

            let outcome = merge(&first_pass, &targets, again, None);

            prop_assert!(outcome.changed_criteria.is_empty());
            prop_assert_eq!(
                decide(&rubric, &outcome.resolved).unwrap().decision,
                decide(&rubric, &first_pass).unwrap().decision
            );
        }
    }

    // =========================================================================
    // Reconciliation Properties
    // =========================================================================

    proptest! {
        /// Swapping the engines never changes category or consensus.
        #[test]
        fn reconciliation_is_symmetric(a in decision(), b in decision()) {
            let (oa, ob) = (outcome("a", a), outcome("b", b));
            let ab = reconcile("p", &oa, &ob);
            let ba = reconcile("p", &ob, &oa);
            prop_assert_eq!(ab.agreement_category, ba.agreement_category);
            prop_assert_eq!(ab.consensus_decision, ba.consensus_decision);
            prop_assert_eq!(ab.needs_human_review, ba.needs_human_review);
        }

        /// Every disagreement is MAYBE and flagged for review.
        #[test]
        fn disagreement_routes_to_review(a in decision(), b in decision()) {
            let result = reconcile("p", &outcome("a", a), &outcome("b", b));
            if a != b {
                prop_assert!(result.agreement_category.is_disagreement());
                prop_assert_eq!(result.consensus_decision, Decision::Maybe);
                prop_assert!(result.needs_human_review);
            } else {
                prop_assert!(result.agreement_category.is_agreement());
                prop_assert_eq!(result.consensus_decision, a);
                prop_assert!(!result.needs_human_review);
            }
        }

        /// Consensus only ever returns MAYBE or the agreed value.
        #[test]
        fn consensus_is_conservative(a in decision(), b in decision()) {
            let category = classify(a, b);
            let decided = consensus(category, a);
            prop_assert!(decided == Decision::Maybe || (decided == a && a == b));
        }
    }
}
