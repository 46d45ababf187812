//! Handoff report synthesis.
//!
//! [`HandoffReport`] is the serialisable summary of a finalized record. [`ReportService`]
//! renders it as Markdown. Every piece of free text that came from the patient or a
//! specialist is escaped so it cannot introduce headings, horizontal rules, code fences or
//! table breaks into the rendered document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::differential::DifferentialVersion;
use crate::evidence::EvidenceKind;
use crate::intake::{Demographics, Vitals};
use crate::judge::Termination;
use crate::labs::LabFlag;
use crate::record::{AuditEntry, PatientRecord};
use crate::retrieval::LiteratureSummary;
use crate::specialist::{RiskLevel, SpecialistRole};
use crate::uuid::CaseId;
use crate::{SessionError, SessionResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub kind: EvidenceKind,
    pub ordered_by: SpecialistRole,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<LabFlag>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffReport {
    pub case_id: CaseId,
    pub generated_at: DateTime<Utc>,
    pub demographics: Demographics,
    pub chief_complaint: String,
    pub history_present_illness: Option<String>,
    pub risk: Option<RiskLevel>,
    pub red_flags: Vec<String>,
    pub vitals: Vitals,
    pub evidence: Vec<EvidenceRow>,
    pub differential_evolution: Vec<DifferentialVersion>,
    pub final_diagnosis: String,
    pub final_probability: f64,
    pub termination: Termination,
    pub low_confidence: bool,
    pub iterations: u32,
    pub research_notes: Vec<LiteratureSummary>,
    pub audit_log: Vec<AuditEntry>,
}

impl HandoffReport {
    /// Summarise a finalized record.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the record has not been finalized.
    pub fn from_record(record: &PatientRecord, generated_at: DateTime<Utc>) -> SessionResult<Self> {
        let (Some(termination), Some(final_diagnosis)) =
            (record.termination(), record.final_diagnosis())
        else {
            return Err(SessionError::InvalidState(format!(
                "record {} is not finalized",
                record.id()
            )));
        };

        let evidence = record
            .evidence()
            .iter()
            .map(|item| EvidenceRow {
                kind: item.kind(),
                ordered_by: item.ordered_by,
                result: item.describe(),
                flag: item.as_lab().map(|lab| lab.flag),
                recorded_at: item.recorded_at,
            })
            .collect();

        Ok(Self {
            case_id: record.id(),
            generated_at,
            demographics: record.demographics().clone(),
            chief_complaint: record.chief_complaint().to_string(),
            history_present_illness: record.history_present_illness().map(str::to_string),
            risk: record.risk(),
            red_flags: record.red_flags().to_vec(),
            vitals: record.vitals().clone(),
            evidence,
            differential_evolution: record.differentials().versions().to_vec(),
            final_diagnosis: final_diagnosis.to_string(),
            final_probability: record.confidence(),
            termination: termination.clone(),
            low_confidence: termination.is_low_confidence(),
            iterations: record.iterations(),
            research_notes: record.research_notes().to_vec(),
            audit_log: record.audit_log().to_vec(),
        })
    }
}

/// Markdown rendering for handoff reports.
#[derive(Debug, Clone, Default)]
pub struct ReportService;

impl ReportService {
    pub fn new() -> Self {
        Self
    }

    pub fn render_markdown(&self, report: &HandoffReport) -> String {
        let mut out = String::new();
        out.push_str("# Diagnostic Handoff Report\n\n");

        if let Termination::EmergencyEscalation { condition, action } = &report.termination {
            out.push_str(&format!(
                "> **EMERGENCY ESCALATION:** {}. {}\n\n",
                self.escape_inline(condition),
                self.escape_inline(action)
            ));
        }

        out.push_str(&format!("**Case ID:** {}\n", report.case_id));
        out.push_str(&format!(
            "**Generated:** {}\n",
            report
                .generated_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        ));
        out.push_str(&format!("**Outcome:** {}\n", report.termination));
        if report.low_confidence {
            out.push_str(&format!(
                "**Confidence:** LOW ({:.0}%). Treat this assessment as provisional.\n",
                report.final_probability * 100.0
            ));
        } else if !report.termination.is_emergency() {
            out.push_str(&format!(
                "**Confidence:** {:.0}%\n",
                report.final_probability * 100.0
            ));
        }

        out.push_str("\n## Patient\n\n");
        out.push_str(&format!(
            "- **Age / sex:** {} / {}\n",
            report.demographics.age, report.demographics.sex
        ));
        let history = if report.demographics.history.is_empty() {
            "None recorded".to_string()
        } else {
            self.escape_inline(&report.demographics.history)
        };
        out.push_str(&format!("- **History:** {}\n", history));
        out.push_str(&format!(
            "- **Chief complaint:** {}\n",
            self.escape_inline(&report.chief_complaint)
        ));
        out.push_str(&format!("- **Vitals:** {}\n", report.vitals.summary()));
        if let Some(risk) = report.risk {
            out.push_str(&format!("- **Risk:** {}\n", risk));
        }
        if !report.red_flags.is_empty() {
            let flags: Vec<_> = report
                .red_flags
                .iter()
                .map(|f| self.escape_inline(f))
                .collect();
            out.push_str(&format!("- **Red flags:** {}\n", flags.join(", ")));
        }

        if let Some(hpi) = &report.history_present_illness {
            out.push_str("\n## History of Present Illness\n\n");
            out.push_str(&self.escape_block(hpi));
            out.push('\n');
        }

        out.push_str("\n## Evidence\n\n");
        if report.evidence.is_empty() {
            out.push_str("No evidence was gathered.\n");
        } else {
            out.push_str("| # | Kind | Ordered by | Result | Flag |\n");
            out.push_str("|---|------|------------|--------|------|\n");
            for (i, row) in report.evidence.iter().enumerate() {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    i + 1,
                    row.kind,
                    row.ordered_by,
                    self.escape_cell(&row.result),
                    row.flag.map(LabFlag::as_str).unwrap_or("")
                ));
            }
        }

        out.push_str("\n## Differential Evolution\n");
        if report.differential_evolution.is_empty() {
            out.push_str("\nNo differential was generated.\n");
        }
        for version in &report.differential_evolution {
            out.push_str(&format!(
                "\n### Version {} ({} evidence item(s) considered)\n\n",
                version.version, version.evidence_count
            ));
            out.push_str("| Condition | Probability |\n");
            out.push_str("|-----------|-------------|\n");
            for h in version.differential.hypotheses() {
                out.push_str(&format!(
                    "| {} | {:.1}% |\n",
                    self.escape_cell(h.condition.as_str()),
                    h.probability * 100.0
                ));
            }
            if !version.rationale.is_empty() {
                out.push_str(&format!(
                    "\n_Rationale:_ {}\n",
                    self.escape_inline(&version.rationale)
                ));
            }
        }

        out.push_str("\n## Final Assessment\n\n");
        out.push_str(&format!(
            "**Diagnosis:** {}\n",
            self.escape_inline(&report.final_diagnosis)
        ));
        out.push_str(&format!(
            "**Evidence-gathering iterations:** {}\n",
            report.iterations
        ));

        if !report.research_notes.is_empty() {
            out.push_str("\n## Research Notes\n\n");
            for note in &report.research_notes {
                out.push_str(&format!(
                    "- **{}:** {}\n",
                    self.escape_inline(&note.query),
                    self.escape_inline(&note.synthesis)
                ));
            }
        }

        out.push_str("\n## Audit Log\n\n");
        for entry in &report.audit_log {
            out.push_str(&format!(
                "- `{}` **{}** {}\n",
                entry.at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                entry.actor,
                self.escape_inline(&entry.message)
            ));
        }

        out
    }

    /// Escape multi-line text: line-start `#`, standalone horizontal rules and code fences.
    pub fn escape_block(&self, text: &str) -> String {
        text.lines()
            .map(|line| {
                let trimmed = line.trim();
                if line.trim_start().starts_with('#') {
                    line.replacen('#', r"\#", 1)
                } else if is_rule_or_underline(trimmed) {
                    format!(r"\{}", trimmed)
                } else {
                    line.replace("```", r"\`\`\`")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Escape text rendered on a single line.
    pub fn escape_inline(&self, text: &str) -> String {
        let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let escaped = flattened.replace("```", r"\`\`\`");
        if escaped.starts_with('#') {
            escaped.replacen('#', r"\#", 1)
        } else {
            escaped
        }
    }

    /// Escape text rendered inside a table cell.
    pub fn escape_cell(&self, text: &str) -> String {
        self.escape_inline(text).replace('|', r"\|")
    }
}

/// A line that markdown reads as a thematic break or a setext heading underline.
fn is_rule_or_underline(trimmed: &str) -> bool {
    let mut marks = trimmed.chars().filter(|c| *c != ' ' && *c != '\t');
    match marks.next() {
        Some(first @ ('-' | '=' | '*' | '_')) => marks.all(|c| c == first),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differential::{Differential, Hypothesis};
    use crate::intake::{PatientIntake, Sex};

    fn finalized(termination: Termination) -> PatientRecord {
        let intake = PatientIntake::new(
            45,
            Sex::Male,
            "# hypertension",
            "chest pain | radiating\n---",
            Vitals::default(),
        )
        .unwrap();
        let now = Utc::now();
        let mut record = PatientRecord::from_intake(&intake, now).unwrap();
        record.complete_triage("```rm -rf```\n# heading".into(), RiskLevel::High, vec![]);
        let ddx = Differential::new(vec![
            Hypothesis::new("Acute coronary syndrome", 0.6).unwrap(),
            Hypothesis::new("GERD", 0.2).unwrap(),
        ])
        .unwrap();
        record.push_differential(ddx, "priors".into(), now);
        record.finalize(termination, "Acute coronary syndrome".into(), now);
        record
    }

    #[test]
    fn from_record_requires_finalized() {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        let record = PatientRecord::from_intake(&intake, Utc::now()).unwrap();
        assert!(matches!(
            HandoffReport::from_record(&record, Utc::now()),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn max_iterations_is_flagged_low_confidence() {
        let record = finalized(Termination::MaxIterationsExceeded);
        let report = HandoffReport::from_record(&record, Utc::now()).unwrap();
        assert!(report.low_confidence);
        assert_eq!(report.final_probability, 0.6);

        let markdown = ReportService::new().render_markdown(&report);
        assert!(markdown.contains("**Confidence:** LOW (60%)"));
        assert!(markdown.contains("### Version 1"));
        assert!(markdown.contains("| Acute coronary syndrome | 60.0% |"));
    }

    #[test]
    fn emergency_report_carries_banner() {
        let record = finalized(Termination::EmergencyEscalation {
            condition: "Suspected myocardial infarction".into(),
            action: "12-lead ECG now.".into(),
        });
        let report = HandoffReport::from_record(&record, Utc::now()).unwrap();
        let markdown = ReportService::new().render_markdown(&report);
        assert!(markdown.contains("> **EMERGENCY ESCALATION:** Suspected myocardial infarction"));
        assert!(!markdown.contains("**Confidence:**"));
    }

    #[test]
    fn patient_text_cannot_inject_markdown() {
        let record = finalized(Termination::ConfidenceReached);
        let report = HandoffReport::from_record(&record, Utc::now()).unwrap();
        let markdown = ReportService::new().render_markdown(&report);

        assert!(markdown.contains(r"- **History:** \# hypertension"));
        assert!(markdown.contains("chest pain | radiating ---"));
        assert!(markdown.contains(r"\`\`\`rm -rf\`\`\`"));
        assert!(markdown.contains("\n\\# heading"));
        assert!(!markdown.contains("\n# heading"));
    }

    #[test]
    fn escape_block_matches_line_rules() {
        let service = ReportService::new();
        assert_eq!(service.escape_block("a\n---\nb"), "a\n\\---\nb");
        assert_eq!(service.escape_block("  # x"), "  \\# x");
        assert_eq!(service.escape_cell("a|b"), r"a\|b");
    }

    #[test]
    fn escape_block_neutralizes_underlines_and_spaced_rules() {
        let service = ReportService::new();
        assert_eq!(
            service.escape_block("Title\n===\nSub\n-\n- - -\n*****"),
            "Title\n\\===\nSub\n\\-\n\\- - -\n\\*****"
        );
        assert_eq!(service.escape_block("- item\na = b"), "- item\na = b");
    }
}
