//! Paper records handed to the screening engines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::screening::ScreeningMode;

/// A bibliographic record to screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Stable identifier; derived from year and title when the source has none.
    #[serde(default, alias = "paper_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(
        default,
        rename = "abstract",
        alias = "abstract_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_full_text(mut self, text: impl Into<String>) -> Self {
        self.full_text = Some(text.into());
        self
    }

    /// Identifier derived from year and a title hash: `2016_1a2b3c4d`.
    pub fn derived_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.trim().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        let year = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("{}_{}", year, &hash[..8])
    }

    /// Render the paper for an engine prompt.
    pub fn prompt_text(&self, mode: ScreeningMode) -> String {
        let mut text = format!(
            "**Title:** {}\n\
             **Authors:** {}\n\
             **Journal:** {}\n\
             **Year:** {}\n\
             **Abstract:** {}\n\
             **Keywords:** {}\n\
             **DOI:** {}\n\
             **Publication Type:** {}\n",
            self.title,
            join_or(&self.authors, "Unknown"),
            self.journal.as_deref().unwrap_or("Unknown"),
            self.year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            self.abstract_text
                .as_deref()
                .unwrap_or("No abstract available"),
            join_or(&self.keywords, "None"),
            self.doi.as_deref().unwrap_or("No DOI"),
            self.publication_type.as_deref().unwrap_or("Unknown"),
        );

        if mode == ScreeningMode::FullText {
            text.push_str("\n**Full Text:**\n");
            text.push_str(self.full_text.as_deref().unwrap_or("No full text available"));
            text.push('\n');
        }
        text
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id_is_stable() {
        let paper = Paper::new("", "Graduating from poverty").with_year(2015);
        let id = paper.derived_id();
        assert!(id.starts_with("2015_"));
        assert_eq!(id.len(), "2015_".len() + 8);
        assert_eq!(id, paper.clone().derived_id());

        let undated = Paper::new("", "Graduating from poverty");
        assert!(undated.derived_id().starts_with("unknown_"));
        assert_eq!(&undated.derived_id()[8..], &id[5..]);
    }

    #[test]
    fn test_prompt_text_placeholders() {
        let paper = Paper::new("p1", "Cash and cows").with_year(2012);
        let text = paper.prompt_text(ScreeningMode::TitleAbstract);
        assert!(text.contains("**Title:** Cash and cows"));
        assert!(text.contains("**Year:** 2012"));
        assert!(text.contains("**Abstract:** No abstract available"));
        assert!(text.contains("**Authors:** Unknown"));
        assert!(!text.contains("Full Text"));

        let full = paper
            .with_full_text("Body")
            .prompt_text(ScreeningMode::FullText);
        assert!(full.contains("**Full Text:**\nBody"));
    }

    #[test]
    fn test_json_field_names() {
        let paper: Paper = serde_json::from_str(
            r#"{"paper_id": "x1", "title": "T", "abstract": "A", "year": 2020}"#,
        )
        .unwrap();
        assert_eq!(paper.id, "x1");
        assert_eq!(paper.abstract_text.as_deref(), Some("A"));

        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "A");
        assert!(json.get("doi").is_none());
    }
}
