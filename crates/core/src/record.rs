//! The Patient Record: explicit session state passed through the orchestration loop.
//!
//! Fields are private. Readers get shared references; the only mutators are crate-private and
//! are called by the orchestrator's merge step, which keeps the evidence log append-only and
//! the differential history versioned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::differential::{Differential, DifferentialHistory, DifferentialVersion, Hypothesis};
use crate::evidence::{EvidenceItem, EvidenceLog};
use crate::intake::{Demographics, PatientIntake, Vitals};
use crate::judge::Termination;
use crate::retrieval::LiteratureSummary;
use crate::specialist::RiskLevel;
use crate::uuid::{CaseId, EvidenceId};
use crate::{NonEmptyText, SessionError, SessionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Intake,
    Active,
    Finalized,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordStatus::Intake => "intake",
            RecordStatus::Active => "active",
            RecordStatus::Finalized => "finalized",
        })
    }
}

/// Results held by external systems for this patient, visible only to the mock clinical tools.
///
/// `simulation` names the hidden condition that drives the lab and imaging simulators;
/// `recorded_labs` maps panel codes to values already on file and takes precedence over
/// simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub recorded_labs: BTreeMap<String, f64>,
}

impl CaseData {
    pub fn is_empty(&self) -> bool {
        self.simulation.is_none() && self.recorded_labs.is_empty()
    }

    /// Recorded value for a panel code, matched case-insensitively.
    pub fn recorded_lab(&self, code: &str) -> Option<f64> {
        self.recorded_labs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(code))
            .map(|(_, v)| *v)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    id: CaseId,
    created_at: DateTime<Utc>,
    demographics: Demographics,
    chief_complaint: NonEmptyText,
    #[serde(default)]
    history_present_illness: Option<String>,
    #[serde(default)]
    vitals: Vitals,
    #[serde(default)]
    risk: Option<RiskLevel>,
    #[serde(default)]
    red_flags: Vec<String>,
    evidence: EvidenceLog,
    differentials: DifferentialHistory,
    #[serde(default)]
    research_notes: Vec<LiteratureSummary>,
    #[serde(default)]
    triage_attempts: u32,
    #[serde(default)]
    iterations: u32,
    #[serde(default)]
    steps: u32,
    status: RecordStatus,
    #[serde(default)]
    termination: Option<Termination>,
    #[serde(default)]
    final_diagnosis: Option<String>,
    #[serde(default)]
    finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    audit_log: Vec<AuditEntry>,
    #[serde(default, skip_serializing_if = "CaseData::is_empty")]
    case_data: CaseData,
}

impl PatientRecord {
    /// Open a record in `Intake` status.
    pub fn from_intake(intake: &PatientIntake, now: DateTime<Utc>) -> SessionResult<Self> {
        intake.validate()?;
        let mut record = Self {
            id: CaseId::new(),
            created_at: now,
            demographics: intake.demographics(),
            chief_complaint: intake.chief_complaint.clone(),
            history_present_illness: None,
            vitals: intake.vitals.clone(),
            risk: None,
            red_flags: Vec::new(),
            evidence: EvidenceLog::new(),
            differentials: DifferentialHistory::default(),
            research_notes: Vec::new(),
            triage_attempts: 0,
            iterations: 0,
            steps: 0,
            status: RecordStatus::Intake,
            termination: None,
            final_diagnosis: None,
            finalized_at: None,
            audit_log: Vec::new(),
            case_data: CaseData::default(),
        };
        record.log(now, "system", format!("case opened: {}", record.chief_complaint));
        Ok(record)
    }

    pub fn with_case_data(mut self, case_data: CaseData) -> Self {
        self.case_data = case_data;
        self
    }

    pub fn id(&self) -> CaseId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn demographics(&self) -> &Demographics {
        &self.demographics
    }

    pub fn chief_complaint(&self) -> &NonEmptyText {
        &self.chief_complaint
    }

    pub fn history_present_illness(&self) -> Option<&str> {
        self.history_present_illness.as_deref()
    }

    pub fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    pub fn risk(&self) -> Option<RiskLevel> {
        self.risk
    }

    pub fn red_flags(&self) -> &[String] {
        &self.red_flags
    }

    pub fn evidence(&self) -> &EvidenceLog {
        &self.evidence
    }

    pub fn differentials(&self) -> &DifferentialHistory {
        &self.differentials
    }

    pub fn current_differential(&self) -> Option<&Differential> {
        self.differentials.current().map(|v| &v.differential)
    }

    pub fn top_hypothesis(&self) -> Option<&Hypothesis> {
        self.current_differential().and_then(Differential::top)
    }

    /// Probability of the leading hypothesis, or zero before the first differential.
    pub fn confidence(&self) -> f64 {
        self.current_differential()
            .map(Differential::top_probability)
            .unwrap_or(0.0)
    }

    pub fn research_notes(&self) -> &[LiteratureSummary] {
        &self.research_notes
    }

    pub fn triage_attempts(&self) -> u32 {
        self.triage_attempts
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn final_diagnosis(&self) -> Option<&str> {
        self.final_diagnosis.as_deref()
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn case_data(&self) -> &CaseData {
        &self.case_data
    }

    pub fn is_finalized(&self) -> bool {
        self.status == RecordStatus::Finalized
    }

    /// Evidence recorded after the current differential version was produced.
    pub fn evidence_since_last_differential(&self) -> &[EvidenceItem] {
        let start = self
            .differentials
            .current()
            .map(|v| v.evidence_count)
            .unwrap_or(0)
            .min(self.evidence.len());
        &self.evidence.as_slice()[start..]
    }

    /// True if the literature has already been consulted with this query.
    pub fn has_consulted(&self, query: &str) -> bool {
        self.research_notes
            .iter()
            .any(|n| n.query.eq_ignore_ascii_case(query))
    }

    /// Dense text summary injected into reasoning prompts.
    pub fn clinical_summary(&self) -> String {
        let labs: Vec<String> = self.evidence.labs().map(|l| l.to_string()).collect();
        let imaging: Vec<String> = self
            .evidence
            .imaging()
            .map(|r| format!("{} {}: {}", r.modality, r.region, r.impression))
            .collect();
        let differential = self
            .current_differential()
            .map(|d| {
                d.hypotheses()
                    .iter()
                    .map(|h| format!("{} ({:.0}%)", h.condition, h.probability * 100.0))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "none yet".into());

        let or_none = |items: Vec<String>| {
            if items.is_empty() {
                "None".to_string()
            } else {
                items.join("\n")
            }
        };

        format!(
            "--- PATIENT SUMMARY ---\n\
             ID: {}\n\
             DEMOGRAPHICS: {}yo {}\n\
             HISTORY: {}\n\
             CHIEF COMPLAINT: {}\n\
             HPI: {}\n\
             VITALS: {}\n\
             --- OBJECTIVE DATA ---\n\
             LABS:\n{}\n\
             IMAGING:\n{}\n\
             --- CURRENT THINKING ---\n\
             DIFFERENTIAL: {}\n",
            self.id,
            self.demographics.age,
            self.demographics.sex,
            if self.demographics.history.is_empty() {
                "none recorded"
            } else {
                &self.demographics.history
            },
            self.chief_complaint,
            self.history_present_illness.as_deref().unwrap_or("pending triage"),
            self.vitals.summary(),
            or_none(labs),
            or_none(imaging),
            differential,
        )
    }

    // ---- crate-private mutators used by the orchestrator merge ----

    pub(crate) fn ensure_open(&self) -> SessionResult<()> {
        if self.is_finalized() {
            return Err(SessionError::InvalidState(format!(
                "record {} is finalized",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn log(&mut self, at: DateTime<Utc>, actor: &str, message: impl Into<String>) {
        self.audit_log.push(AuditEntry {
            at,
            actor: actor.to_uppercase(),
            message: message.into(),
        });
    }

    pub(crate) fn record_step(&mut self) {
        self.steps = self.steps.saturating_add(1);
    }

    pub(crate) fn record_triage_attempt(&mut self) {
        self.triage_attempts = self.triage_attempts.saturating_add(1);
    }

    pub(crate) fn record_iteration(&mut self) {
        self.iterations = self.iterations.saturating_add(1);
    }

    pub(crate) fn append_evidence(&mut self, item: EvidenceItem) -> EvidenceId {
        self.evidence.append(item).id
    }

    pub(crate) fn extend_complaint(&mut self, addition: &str) {
        self.chief_complaint = self.chief_complaint.extended(addition);
    }

    pub(crate) fn complete_triage(
        &mut self,
        summary: String,
        risk: RiskLevel,
        red_flags: Vec<String>,
    ) {
        self.history_present_illness = Some(summary);
        self.risk = Some(risk);
        self.red_flags = red_flags;
        self.status = RecordStatus::Active;
    }

    pub(crate) fn push_differential(
        &mut self,
        differential: Differential,
        rationale: String,
        at: DateTime<Utc>,
    ) -> &DifferentialVersion {
        let triggered_by = self
            .evidence_since_last_differential()
            .iter()
            .map(|item| item.id)
            .collect();
        let evidence_count = self.evidence.len();
        self.differentials
            .push(differential, triggered_by, evidence_count, rationale, at)
    }

    pub(crate) fn add_research_note(&mut self, note: LiteratureSummary) {
        self.research_notes.push(note);
    }

    pub(crate) fn finalize(
        &mut self,
        termination: Termination,
        final_diagnosis: String,
        at: DateTime<Utc>,
    ) {
        self.termination = Some(termination);
        self.final_diagnosis = Some(final_diagnosis);
        self.finalized_at = Some(at);
        self.status = RecordStatus::Finalized;
    }
}
