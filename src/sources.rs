//! Paper collections: RIS exports and JSON / JSON-lines files.
//!
//! Inputs may be glob patterns. Every returned paper has a unique id: missing
//! ids are derived from year and title, and repeated ids get a numeric suffix.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::paper::Paper;

static RIS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9])\s{1,2}-\s?(.*)$").expect("Invalid regex"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("Invalid regex"));

static DOI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)").expect("Invalid regex")
});

/// Input file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Ris,
    Json,
    JsonLines,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ris" | "txt" => Ok(Self::Ris),
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::JsonLines),
            _ => Err(Error::Source(format!(
                "{}: unknown format (expected .ris, .json or .jsonl)",
                path.display()
            ))),
        }
    }
}

/// Parse an RIS export. Records without a title are skipped.
pub fn parse_ris(content: &str) -> Vec<Paper> {
    let mut papers = Vec::new();
    let mut current = Paper::default();
    let mut last_tag: Option<String> = None;
    let mut skipped = 0;

    for line in content.lines() {
        let line = line.trim_end_matches('\r').trim_start_matches('\u{feff}');
        let Some(caps) = RIS_LINE.captures(line) else {
            // Continuation of a wrapped value.
            let extra = line.trim();
            if !extra.is_empty() {
                if let Some(tag) = &last_tag {
                    append(&mut current, tag, extra);
                }
            }
            continue;
        };
        let tag = &caps[1];
        let value = caps[2].trim();

        if tag == "ER" {
            let paper = std::mem::take(&mut current);
            if paper.title.trim().is_empty() {
                skipped += 1;
            } else {
                papers.push(paper);
            }
            last_tag = None;
            continue;
        }

        apply(&mut current, tag, value);
        last_tag = Some(tag.to_string());
    }

    if !current.title.trim().is_empty() {
        // File ended without a closing ER.
        papers.push(current);
    }
    if skipped > 0 {
        debug!(skipped, "Skipped RIS records without a title");
    }
    papers
}

fn apply(paper: &mut Paper, tag: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    match tag {
        "TI" | "T1" => {
            if paper.title.is_empty() {
                paper.title = value.to_string();
            }
        }
        "AB" | "N2" => {
            if paper.abstract_text.is_none() {
                paper.abstract_text = Some(value.to_string());
            }
        }
        "AU" | "A1" => paper.authors.push(value.to_string()),
        "PY" | "Y1" => {
            if paper.year.is_none() {
                paper.year = YEAR.captures(value).and_then(|c| c[1].parse().ok());
            }
        }
        "DO" => paper.doi = Some(DOI_PREFIX.replace(value, "").trim().to_string()),
        "KW" => paper.keywords.push(value.to_string()),
        "JO" | "JF" | "T2" => {
            if paper.journal.is_none() {
                paper.journal = Some(value.to_string());
            }
        }
        "TY" => paper.publication_type = Some(value.to_string()),
        "ID" | "U1" => {
            if paper.id.is_empty() {
                paper.id = value.to_string();
            }
        }
        _ => {}
    }
}

fn append(paper: &mut Paper, tag: &str, extra: &str) {
    let target = match tag {
        "TI" | "T1" => Some(&mut paper.title),
        "AB" | "N2" => paper.abstract_text.as_mut(),
        _ => None,
    };
    if let Some(text) = target {
        text.push(' ');
        text.push_str(extra);
    }
}

/// Parse a JSON array of papers, or one paper per line.
pub fn parse_json(content: &str, format: SourceFormat) -> Result<Vec<Paper>> {
    let trimmed = content.trim_start();
    let papers: Vec<Paper> = if format == SourceFormat::Json || trimmed.starts_with('[') {
        serde_json::from_str(content)?
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .map_err(|e| Error::Source(format!("line {}: {}", n + 1, e)))
            })
            .collect::<Result<_>>()?
    };

    let total = papers.len();
    let kept: Vec<Paper> = papers
        .into_iter()
        .filter(|p| !p.title.trim().is_empty())
        .collect();
    if kept.len() < total {
        debug!(skipped = total - kept.len(), "Skipped papers without a title");
    }
    Ok(kept)
}

pub fn load_file(path: &Path) -> Result<Vec<Paper>> {
    let format = SourceFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Source(format!("{}: {}", path.display(), e)))?;
    let papers = match format {
        SourceFormat::Ris => parse_ris(&content),
        _ => parse_json(&content, format)
            .map_err(|e| Error::Source(format!("{}: {}", path.display(), e)))?,
    };
    info!(path = %path.display(), papers = papers.len(), "Loaded papers");
    Ok(papers)
}

/// Expand `~` and glob patterns. A pattern matching nothing is an error.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let expanded = shellexpand::tilde(pattern).into_owned();
        let matches = glob::glob(&expanded)
            .map_err(|e| Error::Source(format!("bad pattern '{}': {}", pattern, e)))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return Err(Error::Source(format!("no input files match '{}'", pattern)));
        }
        paths.extend(matches);
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Give every paper a unique id.
pub fn ensure_ids(papers: &mut [Paper]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for paper in papers.iter_mut() {
        if paper.id.trim().is_empty() {
            paper.id = paper.derived_id();
        }
        let count = seen.entry(paper.id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let renamed = format!("{}_{}", paper.id, count);
            warn!(id = %paper.id, renamed = %renamed, "Duplicate paper id");
            paper.id = renamed;
        }
    }
}

/// Load every input, assign ids and apply `max_papers`.
pub fn load_papers(patterns: &[String], max_papers: Option<usize>) -> Result<Vec<Paper>> {
    let mut papers = Vec::new();
    for path in expand_inputs(patterns)? {
        papers.extend(load_file(&path)?);
    }
    if let Some(max) = max_papers {
        papers.truncate(max);
    }
    ensure_ids(&mut papers);
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RIS: &str = "\
TY  - JOUR
TI  - Graduating the ultra-poor in Bangladesh
AU  - Banerjee, A.
AU  - Duflo, E.
PY  - 2015///
JO  - Science
DO  - https://doi.org/10.1126/science.1260799
KW  - poverty
AB  - A multifaceted programme
  combining assets and consumption support.
ER  -

TY  - JOUR
AU  - Nobody
ER  -

TY  - RPRT
T1  - Cash plus livestock in Ethiopia
Y1  - 2019/05/01
ID  - ETH-7
ER  -
";

    #[test]
    fn test_parse_ris() {
        let papers = parse_ris(RIS);
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.title, "Graduating the ultra-poor in Bangladesh");
        assert_eq!(first.authors, vec!["Banerjee, A.", "Duflo, E."]);
        assert_eq!(first.year, Some(2015));
        assert_eq!(first.doi.as_deref(), Some("10.1126/science.1260799"));
        assert_eq!(first.journal.as_deref(), Some("Science"));
        assert_eq!(
            first.abstract_text.as_deref(),
            Some("A multifaceted programme combining assets and consumption support.")
        );
        assert_eq!(first.id, "");

        let second = &papers[1];
        assert_eq!(second.year, Some(2019));
        assert_eq!(second.id, "ETH-7");
        assert_eq!(second.publication_type.as_deref(), Some("RPRT"));
    }

    #[test]
    fn test_parse_json_and_jsonl() {
        let array = r#"[{"paper_id": "a", "title": "One", "abstract": "x", "year": 2010},
                        {"title": ""}]"#;
        let papers = parse_json(array, SourceFormat::Json).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "a");
        assert_eq!(papers[0].abstract_text.as_deref(), Some("x"));

        let lines = "{\"title\": \"One\"}\n\n{\"title\": \"Two\", \"id\": \"t\"}\n";
        let papers = parse_json(lines, SourceFormat::JsonLines).unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[1].id, "t");

        let err = parse_json("{\"title\": \"One\"}\nnot json\n", SourceFormat::JsonLines);
        assert!(matches!(err, Err(Error::Source(_))));
    }

    #[test]
    fn test_ensure_ids() {
        let mut papers = vec![
            Paper::new("", "Same title").with_year(2012),
            Paper::new("", "Same title").with_year(2012),
            Paper::new("x", "Other"),
        ];
        ensure_ids(&mut papers);
        assert!(papers[0].id.starts_with("2012_"));
        assert_eq!(papers[1].id, format!("{}_2", papers[0].id));
        assert_eq!(papers[2].id, "x");
    }

    #[test]
    fn test_load_papers_with_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ris"), RIS).unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"id\": \"j1\", \"title\": \"JSON paper\"}\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let pattern = dir.path().join("*.ris").to_string_lossy().into_owned();
        let jsonl = dir.path().join("b.jsonl").to_string_lossy().into_owned();
        let papers = load_papers(&[pattern, jsonl], None).unwrap();
        assert_eq!(papers.len(), 3);
        assert!(papers.iter().all(|p| !p.id.is_empty()));

        let limited = load_papers(&[dir.path().join("*.ris").to_string_lossy().into_owned()], Some(1))
            .unwrap();
        assert_eq!(limited.len(), 1);

        let missing = dir.path().join("*.xml").to_string_lossy().into_owned();
        assert!(load_papers(&[missing], None).is_err());
    }
}
