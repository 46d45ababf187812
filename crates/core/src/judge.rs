//! Next-action selection and termination policy.
//!
//! The orchestrator asks a [`DecisionPolicy`] what to do with the current record. The default
//! [`RuleBasedJudge`] walks a fixed priority list:
//!
//! 1. a record still in intake is triaged;
//! 2. a record without a differential gets one;
//! 3. evidence newer than the latest differential triggers a refinement;
//! 4. a leading hypothesis at or above the confidence threshold finalizes the session;
//! 5. an exhausted iteration budget finalizes the session;
//! 6. otherwise the next evidence action is ordered: a discriminating lab for the leading
//!    hypotheses, their signature imaging, a literature consult on the leader, then any lab
//!    left on the panel;
//! 7. with nothing left to order the session finalizes as evidence-exhausted.

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::constants::JUDGE_CONSIDERED_HYPOTHESES;
use crate::knowledge::{ConditionProfile, KnowledgeBase};
use crate::labs::LAB_PANEL;
use crate::record::{PatientRecord, RecordStatus};
use crate::specialist::{
    HypothesisRequest, ImagingOrder, LabOrder, LiteratureQuery, SpecialistRequest,
};

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The leading hypothesis reached the confidence threshold.
    ConfidenceReached,
    /// The iteration budget ran out first.
    MaxIterationsExceeded,
    /// Nothing useful was left to order.
    EvidenceExhausted,
    /// Triage detected a life threat.
    EmergencyEscalation { condition: String, action: String },
}

impl Termination {
    /// True when the final differential did not reach the confidence threshold.
    pub fn is_low_confidence(&self) -> bool {
        matches!(
            self,
            Termination::MaxIterationsExceeded | Termination::EvidenceExhausted
        )
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, Termination::EmergencyEscalation { .. })
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::ConfidenceReached => f.write_str("confidence threshold reached"),
            Termination::MaxIterationsExceeded => f.write_str("maximum iterations exceeded"),
            Termination::EvidenceExhausted => f.write_str("evidence exhausted"),
            Termination::EmergencyEscalation { condition, .. } => {
                write!(f, "emergency escalation: {}", condition)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    Triage,
    GenerateHypotheses,
    RefineHypotheses,
    OrderLab(LabOrder),
    OrderImaging(ImagingOrder),
    ConsultLiterature(LiteratureQuery),
    Finalize(Termination),
}

impl NextAction {
    /// Lab, imaging and literature actions each consume one iteration.
    pub fn is_evidence_action(&self) -> bool {
        matches!(
            self,
            NextAction::OrderLab(_) | NextAction::OrderImaging(_) | NextAction::ConsultLiterature(_)
        )
    }

    /// The specialist request this action translates to. `Finalize` has none.
    pub fn request(&self, record: &PatientRecord) -> Option<SpecialistRequest> {
        match self {
            NextAction::Triage => Some(SpecialistRequest::Triage {
                attempt: record.triage_attempts() + 1,
            }),
            NextAction::GenerateHypotheses => {
                Some(SpecialistRequest::Hypotheses(HypothesisRequest::Initial))
            }
            NextAction::RefineHypotheses => Some(SpecialistRequest::Hypotheses(
                HypothesisRequest::Refine {
                    evidence: record
                        .evidence_since_last_differential()
                        .iter()
                        .map(|item| item.id)
                        .collect(),
                },
            )),
            NextAction::OrderLab(order) => Some(SpecialistRequest::Lab(order.clone())),
            NextAction::OrderImaging(order) => Some(SpecialistRequest::Imaging(order.clone())),
            NextAction::ConsultLiterature(query) => {
                Some(SpecialistRequest::Literature(query.clone()))
            }
            NextAction::Finalize(_) => None,
        }
    }
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextAction::Triage => f.write_str("triage"),
            NextAction::GenerateHypotheses => f.write_str("generate hypotheses"),
            NextAction::RefineHypotheses => f.write_str("refine hypotheses"),
            NextAction::OrderLab(order) => write!(f, "order lab {}", order.test),
            NextAction::OrderImaging(order) => {
                write!(f, "order imaging {} {}", order.modality, order.region)
            }
            NextAction::ConsultLiterature(query) => write!(f, "consult literature: {}", query.query),
            NextAction::Finalize(termination) => write!(f, "finalize ({})", termination),
        }
    }
}

pub trait DecisionPolicy: Send + Sync {
    fn next_action(&self, record: &PatientRecord, config: &CoreConfig) -> NextAction;
}

#[derive(Debug, Default)]
pub struct RuleBasedJudge {
    knowledge: KnowledgeBase,
}

impl RuleBasedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    fn leading_conditions(&self, record: &PatientRecord) -> Vec<&'static ConditionProfile> {
        record
            .current_differential()
            .map(|d| {
                d.hypotheses()
                    .iter()
                    .take(JUDGE_CONSIDERED_HYPOTHESES)
                    .filter_map(|h| self.knowledge.find(h.condition.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_evidence(&self, record: &PatientRecord) -> Option<NextAction> {
        let evidence = record.evidence();
        let leading = self.leading_conditions(record);

        let discriminating_lab = leading
            .iter()
            .flat_map(|c| c.labs.iter())
            .find(|s| !evidence.has_lab(s.code));
        if let Some(signature) = discriminating_lab {
            return Some(NextAction::OrderLab(LabOrder {
                test: signature.code.to_string(),
            }));
        }

        let imaging = leading
            .iter()
            .filter_map(|c| c.imaging.as_ref())
            .filter_map(|s| s.modalities.first().map(|m| (*m, s.region)))
            .find(|(modality, region)| !evidence.has_imaging(*modality, region));
        if let Some((modality, region)) = imaging {
            return Some(NextAction::OrderImaging(ImagingOrder {
                modality,
                region: region.to_string(),
            }));
        }

        if let Some(top) = record.top_hypothesis() {
            let query = top.condition.as_str();
            if !record.has_consulted(query) {
                return Some(NextAction::ConsultLiterature(LiteratureQuery {
                    query: query.to_string(),
                }));
            }
        }

        LAB_PANEL
            .iter()
            .find(|spec| !evidence.has_lab(spec.code))
            .map(|spec| {
                NextAction::OrderLab(LabOrder {
                    test: spec.code.to_string(),
                })
            })
    }
}

impl DecisionPolicy for RuleBasedJudge {
    fn next_action(&self, record: &PatientRecord, config: &CoreConfig) -> NextAction {
        if record.status() == RecordStatus::Intake {
            return NextAction::Triage;
        }
        if record.differentials().is_empty() {
            return NextAction::GenerateHypotheses;
        }
        if !record.evidence_since_last_differential().is_empty() {
            return NextAction::RefineHypotheses;
        }
        if record.confidence() >= config.confidence_threshold() {
            return NextAction::Finalize(Termination::ConfidenceReached);
        }
        if record.iterations() >= config.max_iterations() {
            return NextAction::Finalize(Termination::MaxIterationsExceeded);
        }
        self.next_evidence(record)
            .unwrap_or(NextAction::Finalize(Termination::EvidenceExhausted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differential::{Differential, Hypothesis};
    use crate::evidence::{EvidenceItem, EvidencePayload, LabResult, LabSource};
    use crate::intake::{PatientIntake, Sex, Vitals};
    use crate::labs;
    use crate::specialist::{RiskLevel, SpecialistRole};
    use chrono::Utc;

    fn active_record() -> PatientRecord {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        let mut record = PatientRecord::from_intake(&intake, Utc::now()).unwrap();
        record.complete_triage("summary".into(), RiskLevel::High, vec![]);
        record
    }

    fn with_differential(mut record: PatientRecord, top: f64) -> PatientRecord {
        let ddx = Differential::new(vec![
            Hypothesis::new("Acute coronary syndrome", top).unwrap(),
            Hypothesis::new("Pulmonary embolism", (1.0 - top) / 2.0).unwrap(),
        ])
        .unwrap();
        record.push_differential(ddx, "test".into(), Utc::now());
        record
    }

    fn add_lab(record: &mut PatientRecord, code: &str, value: f64) {
        let spec = labs::lookup(code).unwrap();
        record.append_evidence(EvidenceItem::new(
            SpecialistRole::Evidence,
            EvidencePayload::Lab(LabResult {
                test_name: spec.code.into(),
                value,
                unit: spec.unit.into(),
                reference_range: spec.range,
                flag: spec.classify(value),
                source: LabSource::Simulated,
            }),
            Utc::now(),
        ));
    }

    fn decide(record: &PatientRecord) -> NextAction {
        RuleBasedJudge::new().next_action(record, &CoreConfig::default())
    }

    #[test]
    fn intake_then_hypotheses() {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        let record = PatientRecord::from_intake(&intake, Utc::now()).unwrap();
        assert_eq!(decide(&record), NextAction::Triage);
        assert_eq!(decide(&active_record()), NextAction::GenerateHypotheses);
    }

    #[test]
    fn new_evidence_triggers_refinement() {
        let mut record = with_differential(active_record(), 0.4);
        add_lab(&mut record, "TROPONIN", 0.3);
        assert_eq!(decide(&record), NextAction::RefineHypotheses);
    }

    #[test]
    fn confident_leader_finalizes() {
        let record = with_differential(active_record(), 0.92);
        assert_eq!(
            decide(&record),
            NextAction::Finalize(Termination::ConfidenceReached)
        );
    }

    #[test]
    fn exhausted_iterations_finalize() {
        let mut record = with_differential(active_record(), 0.5);
        for _ in 0..CoreConfig::default().max_iterations() {
            record.record_iteration();
        }
        assert_eq!(
            decide(&record),
            NextAction::Finalize(Termination::MaxIterationsExceeded)
        );
    }

    #[test]
    fn orders_discriminating_labs_then_imaging() {
        let mut record = with_differential(active_record(), 0.5);
        assert_eq!(
            decide(&record),
            NextAction::OrderLab(LabOrder {
                test: "TROPONIN".into()
            })
        );

        add_lab(&mut record, "TROPONIN", 0.01);
        add_lab(&mut record, "D-DIMER", 0.9);
        let record = with_differential(record, 0.5);
        match decide(&record) {
            NextAction::OrderImaging(order) => {
                assert_eq!(order.region, "chest");
                assert_eq!(order.modality, crate::evidence::Modality::Ct);
            }
            other => panic!("expected imaging, got {other:?}"),
        }
    }

    #[test]
    fn unknown_conditions_fall_back_to_literature_then_panel() {
        let mut record = active_record();
        let ddx = Differential::new(vec![Hypothesis::new("Dragon pox", 0.3).unwrap()]).unwrap();
        record.push_differential(ddx, "test".into(), Utc::now());

        assert!(matches!(decide(&record), NextAction::ConsultLiterature(_)));
    }

    #[test]
    fn low_confidence_terminations() {
        assert!(Termination::MaxIterationsExceeded.is_low_confidence());
        assert!(Termination::EvidenceExhausted.is_low_confidence());
        assert!(!Termination::ConfidenceReached.is_low_confidence());
    }

    #[test]
    fn action_serializes_with_tag() {
        let action = NextAction::Finalize(Termination::MaxIterationsExceeded);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "finalize");
        assert_eq!(json["reason"], "max_iterations_exceeded");
    }
}
