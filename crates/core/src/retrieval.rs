//! Literature retrieval used by the research specialist.
//!
//! [`LiteratureIndex`] stands in for an external vector store. The in-memory index scores
//! snippets by query-term overlap, ships with a handful of guideline excerpts and can ingest a
//! directory of `.md` / `.txt` documents split into paragraphs.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{SessionError, SessionResult};

/// A retrieved passage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub source: String,
    pub text: String,
    pub score: f64,
}

/// Research note merged into the record after a literature consult.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiteratureSummary {
    pub query: String,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
    pub synthesis: String,
}

pub trait LiteratureIndex: Send + Sync {
    /// Return at most `limit` snippets, best match first.
    fn search(&self, query: &str, limit: usize) -> Vec<Snippet>;
}

#[derive(Clone, Debug)]
struct Passage {
    source: String,
    text: String,
    terms: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLiteratureIndex {
    passages: Vec<Passage>,
}

const BUILTIN_GUIDELINES: &[(&str, &str)] = &[
    (
        "acs-guideline",
        "Acute coronary syndrome: chest pain with elevated cardiac troponin above the 99th \
         percentile indicates myocardial injury. Serial troponin and ECG are recommended; \
         a rising troponin with ischemic symptoms supports myocardial infarction.",
    ),
    (
        "pe-guideline",
        "Pulmonary embolism: a normal D-dimer in a low-risk patient effectively excludes PE. \
         An elevated D-dimer warrants CT pulmonary angiography, which shows filling defects \
         in the pulmonary arteries.",
    ),
    (
        "pneumonia-guideline",
        "Community-acquired pneumonia: fever, cough and leukocytosis with elevated CRP. Chest \
         x-ray showing lobar consolidation confirms the diagnosis.",
    ),
    (
        "sepsis-guideline",
        "Sepsis: suspected infection with organ dysfunction. Lactate above 2 mmol/L and \
         leukocytosis are common; early antibiotics and fluid resuscitation improve outcome.",
    ),
    (
        "heart-failure-guideline",
        "Heart failure: dyspnea, edema and elevated BNP. Chest x-ray may show cardiomegaly \
         and pulmonary edema.",
    ),
    (
        "appendicitis-guideline",
        "Appendicitis: right lower quadrant abdominal pain, leukocytosis and raised CRP. CT of \
         the abdomen shows a dilated appendix with fat stranding.",
    ),
    (
        "stroke-guideline",
        "Stroke: sudden focal neurological deficit. Non-contrast CT head excludes hemorrhage; \
         thunderclap headache suggests subarachnoid hemorrhage.",
    ),
    (
        "aki-guideline",
        "Acute kidney injury: rise in serum creatinine, often with hyperkalemia. Review \
         nephrotoxic medications and volume status.",
    ),
    (
        "anemia-guideline",
        "Anemia: low hemoglobin presenting with fatigue and dyspnea on exertion. Investigate \
         iron studies and sources of blood loss.",
    ),
    (
        "hyperglycemia-guideline",
        "Hyperglycemia: elevated blood glucose with polyuria and polydipsia. Check ketones to \
         exclude diabetic ketoacidosis.",
    ),
];

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}

impl InMemoryLiteratureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index preloaded with the built-in guideline excerpts.
    pub fn with_builtin_guidelines() -> Self {
        let mut index = Self::new();
        for (source, text) in BUILTIN_GUIDELINES {
            index.add(*source, *text);
        }
        index
    }

    pub fn add(&mut self, source: impl Into<String>, text: impl Into<String>) {
        let text = text.into();
        let terms = tokenize(&text);
        if terms.is_empty() {
            return;
        }
        self.passages.push(Passage {
            source: source.into(),
            text,
            terms,
        });
    }

    /// Ingest every `.md` and `.txt` file in `dir`, one passage per blank-line-separated
    /// paragraph. Returns the number of passages added.
    pub fn load_dir(&mut self, dir: &Path) -> SessionResult<usize> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(SessionError::FileRead)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("md") | Some("txt")
                    )
            })
            .collect();
        paths.sort();

        let before = self.passages.len();
        for path in paths {
            let content = fs::read_to_string(&path).map_err(SessionError::FileRead)?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for paragraph in content.split("\n\n") {
                let paragraph = paragraph.trim();
                if !paragraph.is_empty() {
                    self.add(source.clone(), paragraph);
                }
            }
        }
        let added = self.passages.len() - before;
        tracing::debug!("indexed {} passages from {}", added, dir.display());
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl LiteratureIndex for InMemoryLiteratureIndex {
    fn search(&self, query: &str, limit: usize) -> Vec<Snippet> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<Snippet> = self
            .passages
            .iter()
            .filter_map(|p| {
                let overlap = p.terms.intersection(&query_terms).count();
                (overlap > 0).then(|| Snippet {
                    source: p.source.clone(),
                    text: p.text.clone(),
                    score: overlap as f64 / query_terms.len() as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source.cmp(&b.source))
        });
        hits.truncate(limit);
        hits
    }
}
