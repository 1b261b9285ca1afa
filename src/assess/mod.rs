//! The assessment collaborator: whatever turns a paper into raw engine output.
//!
//! The screening core only depends on the [`Assessor`] trait. The production
//! implementation is [`LlmAssessor`], which renders prompts and calls an
//! [`LLMClient`](crate::llm::LLMClient); tests substitute canned fakes.

mod llm;
pub mod parse;
mod prompt;

pub use llm::{LlmAssessor, RetryPolicy};
pub use parse::{complete, parse_assessments, NOT_REPORTED};
pub use prompt::PromptConfig;

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::TokenUsage;
use crate::paper::Paper;
use crate::screening::{AssessmentSet, Criterion, Rubric};

/// What an engine is asked to evaluate.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentRequest<'a> {
    pub paper: &'a Paper,
    pub rubric: &'a Rubric,
    /// Criteria to (re-)evaluate, in rubric order.
    pub targets: &'a [Criterion],
    /// First-pass assessments, present on follow-up requests.
    pub prior: Option<&'a AssessmentSet>,
}

impl<'a> AssessmentRequest<'a> {
    /// A first-pass request covering the whole rubric.
    pub fn first_pass(paper: &'a Paper, rubric: &'a Rubric, targets: &'a [Criterion]) -> Self {
        Self {
            paper,
            rubric,
            targets,
            prior: None,
        }
    }

    /// A follow-up request restricted to `targets`, with prior context.
    pub fn followup(
        paper: &'a Paper,
        rubric: &'a Rubric,
        targets: &'a [Criterion],
        prior: &'a AssessmentSet,
    ) -> Self {
        Self {
            paper,
            rubric,
            targets,
            prior: Some(prior),
        }
    }

    pub fn is_followup(&self) -> bool {
        self.prior.is_some()
    }
}

/// Unparsed engine output.
#[derive(Debug, Clone, Default)]
pub struct RawModelOutput {
    pub content: String,
    pub model: Option<String>,
    pub usage: TokenUsage,
}

impl RawModelOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Produces raw output for an assessment request.
///
/// Errors returned here are transport failures; unparseable content is
/// returned as `Ok` and handled by the caller.
#[async_trait]
pub trait Assessor: Send + Sync {
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<RawModelOutput>;

    /// Label used in logs.
    fn name(&self) -> &str {
        "assessor"
    }
}
