//! Screening rubrics: the ordered, configurable set of inclusion criteria.
//!
//! The decision rules never name a specific criterion, so any rubric with at
//! least one criterion can be screened. The built-in preset reproduces the
//! cash-plus-productive-assets review the tool was first used for.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::types::Criterion;

/// Which part of a paper the engines see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningMode {
    #[default]
    TitleAbstract,
    FullText,
}

impl ScreeningMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TitleAbstract => "title/abstract",
            Self::FullText => "full text",
        }
    }
}

/// How a criterion's assessment is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    /// The engine answers YES/NO/UNCLEAR directly.
    Judgement,
    /// The engine extracts a publication year; the threshold is applied in code.
    MinimumYear { min_year: i32 },
}

/// Definition of one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionDef {
    pub id: Criterion,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Alternative keys an engine may use for this criterion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
}

impl CriterionDef {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Criterion::new(id),
            label: label.into(),
            description: String::new(),
            aliases: Vec::new(),
            min_year: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_min_year(mut self, year: i32) -> Self {
        self.min_year = Some(year);
        self
    }

    pub fn kind(&self) -> CriterionKind {
        match self.min_year {
            Some(min_year) => CriterionKind::MinimumYear { min_year },
            None => CriterionKind::Judgement,
        }
    }

    fn answers_to(&self, key: &str) -> bool {
        self.id.as_str().eq_ignore_ascii_case(key)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(key))
    }
}

/// An ordered, non-empty set of criteria with unique ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rubric {
    name: String,
    mode: ScreeningMode,
    criteria: Vec<CriterionDef>,
}

impl Rubric {
    /// Create a rubric, rejecting empty rubrics and duplicate ids or aliases.
    pub fn new(
        name: impl Into<String>,
        mode: ScreeningMode,
        criteria: Vec<CriterionDef>,
    ) -> Result<Self> {
        let name = name.into();
        if criteria.is_empty() {
            return Err(Error::Config(format!("rubric '{}' has no criteria", name)));
        }

        let mut seen = HashSet::new();
        for def in &criteria {
            if def.id.as_str().trim().is_empty() {
                return Err(Error::Config(format!(
                    "rubric '{}' has a criterion with an empty id",
                    name
                )));
            }
            let keys = std::iter::once(def.id.as_str()).chain(def.aliases.iter().map(String::as_str));
            for key in keys {
                if !seen.insert(key.to_ascii_lowercase()) {
                    return Err(Error::Config(format!(
                        "rubric '{}' uses '{}' more than once",
                        name, key
                    )));
                }
            }
        }

        Ok(Self {
            name,
            mode,
            criteria,
        })
    }

    /// Look up a built-in rubric by name.
    pub fn preset(name: &str, mode: ScreeningMode) -> Result<Self> {
        match name {
            "cash-plus-assets" => Ok(Self::cash_plus_assets(mode)),
            other => Err(Error::Config(format!("unknown rubric preset '{}'", other))),
        }
    }

    /// Seven-criterion rubric for cash-plus-productive-asset programmes.
    pub fn cash_plus_assets(mode: ScreeningMode) -> Self {
        let criteria = vec![
            CriterionDef::new("lmic_participants", "LMIC participants")
                .with_description("Participants live in a low- or middle-income country.")
                .with_alias("participants_lmic"),
            CriterionDef::new("cash_support", "Cash support")
                .with_description(
                    "The programme provides cash or in-kind consumption support to participants.",
                )
                .with_alias("component_a_cash_support"),
            CriterionDef::new("productive_assets", "Productive assets")
                .with_description(
                    "The programme itself transfers productive assets (livestock, equipment, \
                     inputs) to participants; measuring asset outcomes alone does not count.",
                )
                .with_alias("component_b_productive_assets"),
            CriterionDef::new("relevant_outcomes", "Relevant outcomes")
                .with_description("The study measures economic or livelihood outcomes."),
            CriterionDef::new("study_design", "Study design")
                .with_description(
                    "Primary quantitative impact evaluation; reviews, syntheses and policy \
                     analyses do not qualify.",
                )
                .with_alias("appropriate_study_design"),
            CriterionDef::new("publication_year", "Year 2004+")
                .with_description("Published in 2004 or later.")
                .with_alias("publication_year_2004_plus")
                .with_min_year(2004),
            CriterionDef::new("completed_study", "Completed study")
                .with_description("The study is completed and reports results."),
        ];

        Self {
            name: "cash-plus-assets".to_string(),
            mode,
            criteria,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ScreeningMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Criterion ids in rubric order.
    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().map(|d| &d.id)
    }

    pub fn definitions(&self) -> &[CriterionDef] {
        &self.criteria
    }

    pub fn definition(&self, criterion: &Criterion) -> Option<&CriterionDef> {
        self.criteria.iter().find(|d| &d.id == criterion)
    }

    pub fn contains(&self, criterion: &Criterion) -> bool {
        self.definition(criterion).is_some()
    }

    /// Resolve an engine-supplied key (id or alias, case-insensitive).
    pub fn resolve(&self, key: &str) -> Option<&CriterionDef> {
        let key = key.trim();
        self.criteria.iter().find(|d| d.answers_to(key))
    }

    /// Human-readable label, falling back to the id.
    pub fn label<'a>(&'a self, criterion: &'a Criterion) -> &'a str {
        self.definition(criterion)
            .map(|d| d.label.as_str())
            .unwrap_or_else(|| criterion.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_has_seven_criteria() {
        let rubric = Rubric::cash_plus_assets(ScreeningMode::TitleAbstract);
        assert_eq!(rubric.len(), 7);
        assert_eq!(
            rubric.criteria().next().map(|c| c.as_str()),
            Some("lmic_participants")
        );
        assert_eq!(
            rubric.definition(&"publication_year".into()).map(|d| d.kind()),
            Some(CriterionKind::MinimumYear { min_year: 2004 })
        );
    }

    #[test]
    fn test_empty_rubric_is_rejected() {
        let err = Rubric::new("empty", ScreeningMode::FullText, vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_ids_and_aliases_rejected() {
        let dup_id = Rubric::new(
            "dup",
            ScreeningMode::TitleAbstract,
            vec![CriterionDef::new("a", "A"), CriterionDef::new("A", "A again")],
        );
        assert!(dup_id.is_err());

        let dup_alias = Rubric::new(
            "dup",
            ScreeningMode::TitleAbstract,
            vec![
                CriterionDef::new("a", "A").with_alias("shared"),
                CriterionDef::new("b", "B").with_alias("shared"),
            ],
        );
        assert!(dup_alias.is_err());
    }

    #[test]
    fn test_resolve_by_alias_case_insensitive() {
        let rubric = Rubric::cash_plus_assets(ScreeningMode::TitleAbstract);
        let def = rubric.resolve("Publication_Year_2004_Plus").unwrap();
        assert_eq!(def.id.as_str(), "publication_year");
        assert!(rubric.resolve("program_recognition").is_none());
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Rubric::preset("nope", ScreeningMode::TitleAbstract).is_err());
        assert!(Rubric::preset("cash-plus-assets", ScreeningMode::FullText).is_ok());
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let rubric = Rubric::cash_plus_assets(ScreeningMode::TitleAbstract);
        assert_eq!(rubric.label(&"cash_support".into()), "Cash support");
        let unknown = Criterion::new("other");
        assert_eq!(rubric.label(&unknown), "other");
    }
}
