//! Prompt rendering for first-pass and follow-up requests.
//!
//! Prompt wording is configuration. Templates are plain strings with these
//! placeholders:
//!
//! | Placeholder | Content |
//! |---|---|
//! | `{mode}` | screening mode (`title/abstract`, `full text`) |
//! | `{paper_info}` | the paper rendered by [`Paper::prompt_text`] |
//! | `{criteria}` | numbered list of the requested criteria |
//! | `{response_schema}` | JSON skeleton the engine must fill in |
//! | `{initial_json}` | first-pass assessments (follow-up only) |
//! | `{unclear_targets}` | `- label: first-pass reasoning` lines (follow-up only) |

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::paper::Paper;
use crate::screening::{CriterionKind, Rubric};

use super::AssessmentRequest;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a systematic review expert evaluating research papers.";

const DEFAULT_FOLLOWUP_SYSTEM_PROMPT: &str =
    "You are a systematic review expert resolving remaining uncertainties.";

const DEFAULT_SCREENING_TEMPLATE: &str = "\
You are evaluating a research paper against the inclusion criteria of a systematic review \
({mode} screening). Assess each criterion as YES, NO or UNCLEAR. Use UNCLEAR when the \
paper does not give enough information; do not guess.

## Paper
{paper_info}
## Criteria
{criteria}

Respond with JSON only:
{response_schema}
";

const DEFAULT_FOLLOWUP_TEMPLATE: &str = "\
You are reviewing a paper again to resolve criteria that remained UNCLEAR. Use the prior \
JSON assessment and the paper details to make a final call. Answer UNCLEAR again if the \
information is genuinely missing.

## Paper
{paper_info}
## Prior assessment
{initial_json}

## Criteria to re-evaluate
{unclear_targets}

Respond with JSON only, covering only the criteria listed above:
{response_schema}
";

/// Prompt configuration for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub followup_system_prompt: String,
    /// First-pass template; the built-in template when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screening_template: Option<String>,
    /// Follow-up template; the built-in template when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_template: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            followup_system_prompt: DEFAULT_FOLLOWUP_SYSTEM_PROMPT.to_string(),
            screening_template: None,
            followup_template: None,
        }
    }
}

impl PromptConfig {
    /// Check that custom templates can show the engine the paper.
    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("screening_template", &self.screening_template),
            ("followup_template", &self.followup_template),
        ] {
            if let Some(template) = template {
                if !template.contains("{paper_info}") {
                    return Err(Error::Config(format!(
                        "prompts.{} must contain the {{paper_info}} placeholder",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render `(system, user)` messages for a request.
    pub fn render(&self, request: &AssessmentRequest<'_>) -> Result<(String, String)> {
        let rubric = request.rubric;
        let paper_info = paper_info(request.paper, rubric);
        let criteria = criteria_list(request);
        let schema = response_schema(request)?;

        match request.prior {
            None => {
                let template = self
                    .screening_template
                    .as_deref()
                    .unwrap_or(DEFAULT_SCREENING_TEMPLATE);
                let user = template
                    .replace("{mode}", rubric.mode().label())
                    .replace("{criteria}", &criteria)
                    .replace("{response_schema}", &schema)
                    .replace("{paper_info}", &paper_info);
                Ok((self.system_prompt.clone(), user))
            }
            Some(prior) => {
                let template = self
                    .followup_template
                    .as_deref()
                    .unwrap_or(DEFAULT_FOLLOWUP_TEMPLATE);
                let initial_json = serde_json::to_string_pretty(prior)?;
                let targets = request
                    .targets
                    .iter()
                    .map(|c| {
                        let reasoning = prior.get(c).map(|r| r.reasoning()).unwrap_or("");
                        format!("- {} ({}): {}", rubric.label(c), c, reasoning)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let user = template
                    .replace("{mode}", rubric.mode().label())
                    .replace("{criteria}", &criteria)
                    .replace("{response_schema}", &schema)
                    .replace("{initial_json}", &initial_json)
                    .replace("{unclear_targets}", &targets)
                    .replace("{paper_info}", &paper_info);
                Ok((self.followup_system_prompt.clone(), user))
            }
        }
    }
}

fn paper_info(paper: &Paper, rubric: &Rubric) -> String {
    paper.prompt_text(rubric.mode())
}

fn criteria_list(request: &AssessmentRequest<'_>) -> String {
    request
        .targets
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let def = request.rubric.definition(c);
            let label = request.rubric.label(c);
            let mut line = format!("{}. {} (`{}`)", i + 1, label, c);
            if let Some(def) = def {
                if !def.description.is_empty() {
                    line.push_str(": ");
                    line.push_str(&def.description);
                }
                if let CriterionKind::MinimumYear { .. } = def.kind() {
                    line.push_str(" Report the publication year as `year_extracted`.");
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn response_schema(request: &AssessmentRequest<'_>) -> Result<String> {
    let mut entries = Map::new();
    for criterion in request.targets {
        let entry = match request.rubric.definition(criterion).map(|d| d.kind()) {
            Some(CriterionKind::MinimumYear { .. }) => json!({
                "year_extracted": "YYYY or Year not provided",
                "reasoning": "explanation"
            }),
            _ => json!({
                "assessment": "YES/NO/UNCLEAR",
                "reasoning": "explanation"
            }),
        };
        entries.insert(criterion.to_string(), entry);
    }
    let schema = json!({ "criteria_evaluation": Value::Object(entries) });
    Ok(serde_json::to_string_pretty(&schema)?)
}
