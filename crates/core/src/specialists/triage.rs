//! Rule-based triage: emergency screening, clarification and risk stratification.

use crate::intake::Vitals;
use crate::knowledge::KnowledgeBase;
use crate::record::PatientRecord;
use crate::specialist::{
    RiskLevel, Specialist, SpecialistError, SpecialistRequest, SpecialistRole, SpecialistUpdate,
    TriageUpdate,
};

/// Phrase, suspected condition, immediate action.
const RED_FLAGS: &[(&str, &str, &str)] = &[
    (
        "crushing chest pain",
        "Suspected myocardial infarction",
        "Activate the cardiac pathway: 12-lead ECG within 10 minutes.",
    ),
    (
        "thunderclap",
        "Suspected subarachnoid hemorrhage",
        "Urgent non-contrast CT head and neurosurgical review.",
    ),
    (
        "worst headache of my life",
        "Suspected subarachnoid hemorrhage",
        "Urgent non-contrast CT head and neurosurgical review.",
    ),
    (
        "inability to breathe",
        "Airway or respiratory failure",
        "Secure the airway and give high-flow oxygen.",
    ),
    (
        "can't breathe",
        "Airway or respiratory failure",
        "Secure the airway and give high-flow oxygen.",
    ),
    (
        "cannot breathe",
        "Airway or respiratory failure",
        "Secure the airway and give high-flow oxygen.",
    ),
    (
        "throat swelling",
        "Suspected anaphylaxis",
        "Intramuscular adrenaline and airway assessment.",
    ),
    (
        "unresponsive",
        "Reduced consciousness",
        "Immediate resuscitation team review.",
    ),
];

const HIGH_ACUITY: &[&str] = &[
    "chest pain",
    "shortness of breath",
    "syncope",
    "fainting",
    "confusion",
    "weakness",
    "severe",
];

#[derive(Debug, Default)]
pub struct RuleBasedTriage {
    knowledge: KnowledgeBase,
}

impl RuleBasedTriage {
    pub fn new() -> Self {
        Self::default()
    }

    fn screen_emergency(complaint: &str) -> Option<TriageUpdate> {
        let lower = complaint.to_lowercase();
        RED_FLAGS
            .iter()
            .find(|(phrase, _, _)| lower.contains(phrase))
            .map(|(_, condition, action)| TriageUpdate::Emergency {
                condition: (*condition).to_string(),
                action: (*action).to_string(),
            })
    }

    fn concerning_vitals(vitals: &Vitals) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(hr) = vitals.heart_rate {
            if hr > 120 {
                flags.push(format!("tachycardia (HR {})", hr));
            } else if hr < 40 {
                flags.push(format!("bradycardia (HR {})", hr));
            }
        }
        if let Some(spo2) = vitals.spo2.filter(|s| *s < 90.0) {
            flags.push(format!("hypoxia (SpO2 {}%)", spo2));
        }
        if let Some(sbp) = vitals.bp_systolic.filter(|s| *s < 90) {
            flags.push(format!("hypotension (SBP {})", sbp));
        }
        if let Some(t) = vitals.temp_c.filter(|t| *t >= 38.5) {
            flags.push(format!("fever ({:.1}C)", t));
        }
        flags
    }

    fn stratify(&self, complaint: &str, vitals: &Vitals) -> RiskLevel {
        let lower = complaint.to_lowercase();
        if !vitals.is_stable() || HIGH_ACUITY.iter().any(|k| lower.contains(k)) {
            RiskLevel::High
        } else if self.knowledge.recognises(complaint) {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

impl Specialist for RuleBasedTriage {
    fn role(&self) -> SpecialistRole {
        SpecialistRole::Triage
    }

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        let SpecialistRequest::Triage { attempt } = request else {
            return Err(SpecialistError::Rejected(format!(
                "triage cannot serve '{}'",
                request.describe()
            )));
        };

        let complaint = record.chief_complaint();
        if let Some(emergency) = Self::screen_emergency(complaint.as_str()) {
            return Ok(SpecialistUpdate::Triage(emergency));
        }

        if complaint.word_count() < 2 {
            return Ok(SpecialistUpdate::Triage(TriageUpdate::Clarify {
                question: format!(
                    "Can you describe the {} in more detail: where is it, when did it start and how severe is it?",
                    complaint
                ),
            }));
        }
        if !self.knowledge.recognises(complaint.as_str()) {
            let question = if *attempt <= 1 {
                "When did this start, and do you have any other symptoms such as pain, fever or shortness of breath?"
            } else {
                "Is there anything else you have noticed, for example where it hurts or what makes it worse?"
            };
            return Ok(SpecialistUpdate::Triage(TriageUpdate::Clarify {
                question: question.into(),
            }));
        }

        let demographics = record.demographics();
        let vitals = record.vitals();
        let history = if demographics.history.is_empty() {
            "no significant history"
        } else {
            demographics.history.as_str()
        };
        let summary = format!(
            "{}yo {} presenting with {}. Vitals: {}. History: {}.",
            demographics.age,
            demographics.sex,
            complaint,
            vitals.summary(),
            history
        );

        Ok(SpecialistUpdate::Triage(TriageUpdate::Assessment {
            summary,
            risk: self.stratify(complaint.as_str(), vitals),
            red_flags: Self::concerning_vitals(vitals),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{PatientIntake, Sex};
    use chrono::Utc;

    fn record(complaint: &str, vitals: Vitals) -> PatientRecord {
        let intake = PatientIntake::new(45, Sex::Male, "", complaint, vitals).unwrap();
        PatientRecord::from_intake(&intake, Utc::now()).unwrap()
    }

    fn triage(record: &PatientRecord) -> TriageUpdate {
        match RuleBasedTriage::new()
            .handle(record, &SpecialistRequest::Triage { attempt: 1 })
            .unwrap()
        {
            SpecialistUpdate::Triage(update) => update,
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn red_flag_phrase_escalates() {
        let update = triage(&record("sudden thunderclap headache", Vitals::default()));
        assert!(matches!(update, TriageUpdate::Emergency { .. }));
    }

    #[test]
    fn single_word_complaint_asks_for_detail() {
        let update = triage(&record("pain", Vitals::default()));
        match update {
            TriageUpdate::Clarify { question } => assert!(question.contains("pain")),
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn unrecognised_complaint_asks_for_symptoms() {
        let update = triage(&record("feeling off lately", Vitals::default()));
        assert!(matches!(update, TriageUpdate::Clarify { .. }));
    }

    #[test]
    fn unstable_vitals_raise_risk() {
        let vitals = Vitals {
            heart_rate: Some(135),
            ..Vitals::default()
        };
        match triage(&record("abdominal pain and nausea", vitals)) {
            TriageUpdate::Assessment {
                risk, red_flags, ..
            } => {
                assert_eq!(risk, RiskLevel::High);
                assert_eq!(red_flags, vec!["tachycardia (HR 135)".to_string()]);
            }
            other => panic!("expected assessment, got {other:?}"),
        }
    }

    #[test]
    fn recognised_complaint_is_moderate_risk() {
        match triage(&record("abdominal pain and nausea", Vitals::default())) {
            TriageUpdate::Assessment { risk, summary, .. } => {
                assert_eq!(risk, RiskLevel::Moderate);
                assert!(summary.starts_with("45yo Male presenting with abdominal pain"));
            }
            other => panic!("expected assessment, got {other:?}"),
        }
    }

    #[test]
    fn rejects_other_requests() {
        let r = record("chest pain", Vitals::default());
        let err = RuleBasedTriage::new()
            .handle(
                &r,
                &SpecialistRequest::Hypotheses(crate::specialist::HypothesisRequest::Initial),
            )
            .unwrap_err();
        assert!(matches!(err, SpecialistError::Rejected(_)));
    }
}
