//! Post-run analysis over the full set of paper records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::screening::Decision;

use super::record::PaperRecord;

/// Per-engine totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub papers: usize,
    pub decisions: BTreeMap<Decision, usize>,
    pub followups: usize,
    /// Follow-ups that changed the engine's decision.
    pub followups_changed: usize,
    /// Papers where this engine failed but the other reported.
    pub failures: usize,
    pub avg_elapsed_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Cross-engine agreement over papers where both engines reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgreementSummary {
    pub pairs: usize,
    pub agreements: usize,
    pub agreement_rate: f64,
    pub categories: BTreeMap<String, usize>,
    /// `"INCLUDE vs EXCLUDE"` and friends, independent of engine order.
    pub disagreement_patterns: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAnalysis {
    pub total_papers: usize,
    pub completed: usize,
    pub errors: usize,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub consensus: BTreeMap<Decision, usize>,
    pub engines: BTreeMap<String, EngineSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<AgreementSummary>,
    /// Papers that only one of two engines reported on.
    pub single_engine_reported: usize,
    pub review_queue: Vec<String>,
}

impl RunAnalysis {
    pub fn from_records(records: &[PaperRecord]) -> Self {
        let mut analysis = Self {
            total_papers: records.len(),
            ..Default::default()
        };
        let mut elapsed: BTreeMap<String, u64> = BTreeMap::new();
        let mut agreement = AgreementSummary::default();

        for record in records {
            let Some(result) = &record.result else {
                analysis.errors += 1;
                if let Some(error) = &record.error {
                    *analysis
                        .errors_by_kind
                        .entry(error.kind.to_string())
                        .or_default() += 1;
                }
                continue;
            };

            analysis.completed += 1;
            *analysis.consensus.entry(result.consensus_decision).or_default() += 1;
            if result.needs_human_review {
                analysis.review_queue.push(record.paper_id.clone());
            }
            if result.single_engine_reported {
                analysis.single_engine_reported += 1;
            }

            for outcome in &result.engine_outcomes {
                let summary = analysis.engines.entry(outcome.engine_id.clone()).or_default();
                summary.papers += 1;
                *summary.decisions.entry(outcome.decision()).or_default() += 1;
                if outcome.followup.is_some() {
                    summary.followups += 1;
                    if outcome.decision() != outcome.first_pass_decision {
                        summary.followups_changed += 1;
                    }
                }
                summary.input_tokens += outcome.usage.input_tokens;
                summary.output_tokens += outcome.usage.output_tokens;
                *elapsed.entry(outcome.engine_id.clone()).or_default() += outcome.elapsed_ms;
            }
            for failure in &result.engine_failures {
                analysis
                    .engines
                    .entry(failure.engine_id.clone())
                    .or_default()
                    .failures += 1;
            }

            if let [a, b] = result.engine_outcomes.as_slice() {
                agreement.pairs += 1;
                *agreement
                    .categories
                    .entry(result.agreement_category.to_string())
                    .or_default() += 1;
                if result.agreement_category.is_agreement() {
                    agreement.agreements += 1;
                } else {
                    *agreement
                        .disagreement_patterns
                        .entry(pattern(a.decision(), b.decision()))
                        .or_default() += 1;
                }
            }
        }

        for (engine, summary) in analysis.engines.iter_mut() {
            if summary.papers > 0 {
                let total = elapsed.get(engine).copied().unwrap_or_default();
                summary.avg_elapsed_ms = total as f64 / summary.papers as f64;
            }
        }
        if agreement.pairs > 0 {
            agreement.agreement_rate = agreement.agreements as f64 / agreement.pairs as f64;
            analysis.agreement = Some(agreement);
        }

        analysis
    }

    pub fn review_count(&self) -> usize {
        self.review_queue.len()
    }
}

fn pattern(a: Decision, b: Decision) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{} vs {}", first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::record::MonotonicClock;
    use crate::error::{Error, ErrorKind};
    use crate::paper::Paper;
    use crate::screening::{
        classify, consensus, AssessmentCounts, AssessmentSet, DecisionResult, DecisionRule,
        EngineFailure, EngineOutcome, ReconciledResult,
    };
    use pretty_assertions::assert_eq;

    fn outcome(engine: &str, decision: Decision, elapsed_ms: u64) -> EngineOutcome {
        EngineOutcome {
            engine_id: engine.to_string(),
            decision_result: DecisionResult {
                decision,
                reasoning: String::new(),
                rule_applied: DecisionRule::UnclearRequiresReview,
                counts: AssessmentCounts::default(),
                assessment_set: AssessmentSet::default(),
            },
            first_pass_decision: decision,
            followup: None,
            elapsed_ms,
            usage: Default::default(),
            notes: Vec::new(),
        }
    }

    fn pair(clock: &MonotonicClock, id: &str, a: Decision, b: Decision) -> PaperRecord {
        let category = classify(a, b);
        let result = ReconciledResult {
            paper_id: id.into(),
            engine_outcomes: vec![outcome("claude", a, 100), outcome("gpt", b, 300)],
            engine_failures: Vec::new(),
            agreement_category: category,
            consensus_decision: consensus(category, a),
            needs_human_review: category.is_disagreement(),
            single_engine_reported: false,
        };
        PaperRecord::completed(&Paper::new(id, id), result, clock.tick())
    }

    #[test]
    fn test_dual_engine_analysis() {
        let clock = MonotonicClock::new();
        let records = vec![
            pair(&clock, "p1", Decision::Include, Decision::Include),
            pair(&clock, "p2", Decision::Exclude, Decision::Include),
            pair(&clock, "p3", Decision::Include, Decision::Exclude),
            pair(&clock, "p4", Decision::Maybe, Decision::Maybe),
            PaperRecord::failed(&Paper::new("p5", "p5"), &Error::timeout(5), clock.tick()),
        ];

        let analysis = RunAnalysis::from_records(&records);

        assert_eq!(analysis.total_papers, 5);
        assert_eq!(analysis.completed, 4);
        assert_eq!(analysis.errors_by_kind.get("timeout"), Some(&1));
        assert_eq!(analysis.review_queue, vec!["p2".to_string(), "p3".to_string()]);
        assert_eq!(analysis.consensus.get(&Decision::Maybe), Some(&3));

        let agreement = analysis.agreement.unwrap();
        assert_eq!(agreement.pairs, 4);
        assert_eq!(agreement.agreement_rate, 0.5);
        assert_eq!(
            agreement.disagreement_patterns.get("INCLUDE vs EXCLUDE"),
            Some(&2)
        );

        let claude = &analysis.engines["claude"];
        assert_eq!(claude.papers, 4);
        assert_eq!(claude.avg_elapsed_ms, 100.0);
        assert_eq!(claude.decisions.get(&Decision::Include), Some(&2));
    }

    #[test]
    fn test_partial_results_count_failures() {
        let clock = MonotonicClock::new();
        let result = ReconciledResult {
            paper_id: "p1".into(),
            engine_outcomes: vec![outcome("claude", Decision::Include, 50)],
            engine_failures: vec![EngineFailure {
                engine_id: "gpt".into(),
                kind: ErrorKind::EngineFailure,
                reason: "down".into(),
            }],
            agreement_category: crate::screening::AgreementCategory::Incomplete,
            consensus_decision: Decision::Maybe,
            needs_human_review: true,
            single_engine_reported: true,
        };
        let records = vec![PaperRecord::completed(&Paper::new("p1", "t"), result, clock.tick())];

        let analysis = RunAnalysis::from_records(&records);
        assert_eq!(analysis.single_engine_reported, 1);
        assert_eq!(analysis.engines["gpt"].failures, 1);
        assert_eq!(analysis.engines["gpt"].papers, 0);
        assert!(analysis.agreement.is_none());
        assert_eq!(analysis.review_count(), 1);
    }
}
