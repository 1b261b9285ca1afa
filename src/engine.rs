//! One screening engine: first pass, decision, optional follow-up, re-decision.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::assess::{
    complete, parse_assessments, AssessmentRequest, Assessor, LlmAssessor, PromptConfig,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::llm::{client_for, TokenUsage};
use crate::paper::Paper;
use crate::screening::{
    AssessmentSet, Criterion, CriterionRecord, Decision, DecisionProcessor, DecisionResult,
    EngineOutcome, FollowUpOutcome, FollowUpResolver, Rubric,
};

/// An independently configured assessor bound to a rubric.
pub struct ScreeningEngine {
    id: String,
    assessor: Arc<dyn Assessor>,
    rubric: Arc<Rubric>,
    processor: DecisionProcessor,
    resolver: FollowUpResolver,
    followup: bool,
}

impl ScreeningEngine {
    pub fn new(id: impl Into<String>, assessor: Arc<dyn Assessor>, rubric: Arc<Rubric>) -> Self {
        Self {
            id: id.into(),
            assessor,
            processor: DecisionProcessor::new(Arc::clone(&rubric)),
            resolver: FollowUpResolver::new(Arc::clone(&rubric)),
            rubric,
            followup: true,
        }
    }

    /// Build an LLM-backed engine from its `[[engines]]` entry.
    pub fn from_config(
        config: &EngineConfig,
        rubric: Arc<Rubric>,
        prompts: &PromptConfig,
    ) -> Result<Self> {
        let client = client_for(config.provider, config.client_config()?)?;
        let assessor = LlmAssessor::new(client, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_prompts(prompts.clone())
            .with_retry(config.retry_policy());
        Ok(Self::new(config.id.clone(), Arc::new(assessor), rubric).with_followup(config.followup))
    }

    pub fn with_followup(mut self, enabled: bool) -> Self {
        self.followup = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Screen one paper end to end.
    ///
    /// Transport failures and incomplete assessment sets are returned as
    /// errors. Malformed output is recovered as all-UNCLEAR and noted.
    #[instrument(skip(self, paper), fields(engine = %self.id, paper_id = %paper.id))]
    pub async fn screen(&self, paper: &Paper) -> Result<EngineOutcome> {
        let started = Instant::now();
        let all: Vec<Criterion> = self.rubric.criteria().cloned().collect();
        let mut notes = Vec::new();
        let mut usage = TokenUsage::default();

        let output = self
            .assessor
            .assess(AssessmentRequest::first_pass(paper, &self.rubric, &all))
            .await?;
        usage.add(&output.usage);

        let first_pass = match parse_assessments(&output.content, &self.rubric, &all) {
            Ok(records) => complete(records, &self.rubric, &all)?,
            Err(e) => {
                warn!("First pass unusable, treating all criteria as UNCLEAR: {}", e);
                notes.push(format!("first pass: {}", e));
                AssessmentSet::all_unclear(&self.rubric, &e.to_string())
            }
        };
        notes.extend(coercion_notes("first pass", first_pass.iter()));

        let first = self.processor.decide(&first_pass)?;
        let first_pass_decision = first.decision;

        let (decision_result, followup) = if first.decision == Decision::Maybe && self.followup {
            let outcome = self
                .resolver
                .resolve(paper, &first_pass, self.assessor.as_ref())
                .await?;
            usage.add(&outcome.usage);
            if let Some(failure) = &outcome.failure {
                notes.push(format!("follow-up: {}", failure));
            }
            notes.extend(coercion_notes(
                "follow-up",
                outcome
                    .resolved
                    .iter()
                    .filter(|r| outcome.original.get(r.criterion()) != Some(*r)),
            ));

            let mut result = self.processor.decide(&outcome.resolved)?;
            result.reasoning = self.annotate(&result, first_pass_decision, &outcome);
            (result, Some(outcome))
        } else {
            (first, None)
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            decision = %decision_result.decision,
            rule = %decision_result.rule_applied,
            followup = followup.is_some(),
            elapsed_ms,
            "Screened paper"
        );

        Ok(EngineOutcome {
            engine_id: self.id.clone(),
            decision_result,
            first_pass_decision,
            followup,
            elapsed_ms,
            usage,
            notes,
        })
    }

    fn annotate(&self, result: &DecisionResult, before: Decision, followup: &FollowUpOutcome) -> String {
        let labels: Vec<&str> = followup
            .targeted
            .iter()
            .map(|c| self.rubric.label(c))
            .collect();
        let mut reasoning = format!(
            "{} | Follow-up targeted: {}",
            result.reasoning,
            labels.join(", ")
        );
        if result.decision != before {
            reasoning.push_str(&format!(
                " | Follow-up updated decision from {} to {}",
                before, result.decision
            ));
        } else {
            reasoning.push_str(" | Follow-up could not resolve uncertainty");
        }
        reasoning
    }
}

fn coercion_notes<'a>(
    pass: &str,
    records: impl Iterator<Item = &'a CriterionRecord>,
) -> Vec<String> {
    records
        .filter_map(|r| {
            r.raw_assessment().map(|raw| {
                format!(
                    "{}: '{}' for {} is not YES/NO/UNCLEAR, treated as UNCLEAR",
                    pass,
                    raw,
                    r.criterion()
                )
            })
        })
        .collect()
}
