//! Role instructions for prompted specialists.
//!
//! Defaults are built in; a YAML file with the same keys can override any of them.

use std::path::Path;

use serde::Deserialize;

use crate::record::PatientRecord;
use crate::specialist::{HypothesisRequest, SpecialistRequest, SpecialistRole};
use crate::{SessionError, SessionResult};

const TRIAGE: &str = "You are a senior emergency medicine physician performing triage. \
Screen for life threats first (crushing chest pain, thunderclap headache, inability to \
breathe, anaphylaxis). If one is present reply with outcome \"emergency\". If the complaint \
is too vague to stratify, reply with outcome \"clarify\" and one follow-up question. \
Otherwise reply with outcome \"assessment\", a one-paragraph summary, a risk level of LOW, \
MODERATE or HIGH, and any red flags.";

const HYPOTHESIS: &str = "You are a diagnostician. Produce a differential diagnosis of at \
most six conditions, ranked by probability, covering the most likely and the most dangerous \
causes. Probabilities must be between 0 and 1 and sum to at most 1. Justify the ranking with \
the objective data on the record.";

const EVIDENCE: &str = "You are the clinical laboratory. Return the result of the ordered \
test with its value, unit, reference range and a flag of NORMAL, HIGH, LOW or CRITICAL.";

const IMAGING: &str = "You are a radiologist. Report the ordered study with findings and a \
one-line impression. Write \"Normal.\" as the impression when nothing acute is seen.";

const RESEARCH: &str = "You are a clinical researcher. Answer the query from current \
guidelines and cite the sources you relied on.";

/// Instruction text per role.
#[derive(Debug, Clone, Deserialize)]
pub struct Prompts {
    pub triage: String,
    pub hypothesis: String,
    pub evidence: String,
    pub imaging: String,
    pub research: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            triage: TRIAGE.into(),
            hypothesis: HYPOTHESIS.into(),
            evidence: EVIDENCE.into(),
            imaging: IMAGING.into(),
            research: RESEARCH.into(),
        }
    }
}

impl Prompts {
    pub fn from_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(SessionError::FileRead)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> SessionResult<Self> {
        serde_yaml::from_str(content).map_err(SessionError::YamlDeserialization)
    }

    pub fn get(&self, role: SpecialistRole) -> &str {
        match role {
            SpecialistRole::Triage => &self.triage,
            SpecialistRole::Hypothesis => &self.hypothesis,
            SpecialistRole::Evidence => &self.evidence,
            SpecialistRole::Imaging => &self.imaging,
            SpecialistRole::Research => &self.research,
        }
    }
}

/// Shape of the JSON reply expected for each role.
pub fn reply_format(role: SpecialistRole) -> &'static str {
    match role {
        SpecialistRole::Triage => {
            r#"{"type":"triage","outcome":"assessment","summary":"...","risk":"MODERATE","red_flags":[]}
or {"type":"triage","outcome":"clarify","question":"..."}
or {"type":"triage","outcome":"emergency","condition":"...","action":"..."}"#
        }
        SpecialistRole::Hypothesis => {
            r#"{"type":"differential","differential":[{"condition":"...","probability":0.4}],"rationale":"..."}"#
        }
        SpecialistRole::Evidence => {
            r#"{"type":"lab","test_name":"WBC","value":7.2,"unit":"x10^9/L","reference_range":{"low":4.5,"high":11.0},"flag":"NORMAL","source":"simulated"}"#
        }
        SpecialistRole::Imaging => {
            r#"{"type":"imaging","modality":"CT","region":"chest","findings":"...","impression":"..."}"#
        }
        SpecialistRole::Research => {
            r#"{"type":"literature","query":"...","snippets":[],"synthesis":"..."}"#
        }
    }
}

/// User prompt: the task, the clinical summary and the reply format.
pub fn render(record: &PatientRecord, request: &SpecialistRequest) -> String {
    let task = match request {
        SpecialistRequest::Triage { attempt } => {
            format!("Assess the patient's complaint (attempt {}).", attempt)
        }
        SpecialistRequest::Hypotheses(HypothesisRequest::Initial) => {
            "Generate the initial differential diagnosis.".to_string()
        }
        SpecialistRequest::Hypotheses(HypothesisRequest::Refine { evidence }) => {
            let new_items: Vec<String> = evidence
                .iter()
                .filter_map(|id| record.evidence().get(*id))
                .map(|item| format!("- {}", item.describe()))
                .collect();
            format!(
                "Refine the differential in light of new evidence:\n{}",
                new_items.join("\n")
            )
        }
        SpecialistRequest::Lab(order) => format!("Result the ordered lab test: {}.", order.test),
        SpecialistRequest::Imaging(order) => format!(
            "Report the ordered study: {} {}.",
            order.modality, order.region
        ),
        SpecialistRequest::Literature(query) => {
            format!("Consult the literature: {}.", query.query)
        }
    };

    format!(
        "{}\n\n{}\nReply with a single JSON object and nothing else:\n{}",
        task,
        record.clinical_summary(),
        reply_format(request.role())
    )
}
