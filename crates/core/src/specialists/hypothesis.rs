//! Bayesian differential ranking over the built-in knowledge base.
//!
//! Every call recomputes the posterior from scratch: complaint priors, multiplied by the
//! likelihood ratio of every lab and imaging result on the record, normalised so that a
//! residual mass stays reserved for conditions the knowledge base does not list.

use crate::constants::RESIDUAL_PROBABILITY_MASS;
use crate::differential::Differential;
use crate::knowledge::KnowledgeBase;
use crate::record::PatientRecord;
use crate::specialist::{
    HypothesisUpdate, Specialist, SpecialistError, SpecialistRequest, SpecialistRole,
    SpecialistUpdate,
};
use crate::NonEmptyText;

/// Largest number of conditions kept on the differential.
const MAX_HYPOTHESES: usize = 6;

#[derive(Debug, Default)]
pub struct BayesianHypothesisSpecialist {
    knowledge: KnowledgeBase,
}

impl BayesianHypothesisSpecialist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posterior weights (unnormalised) and the notable updates that produced them.
    fn rank(&self, record: &PatientRecord) -> (Vec<(&'static str, f64)>, Vec<String>) {
        let mut weights = self
            .knowledge
            .priors(record.chief_complaint().as_str(), record.demographics().age);
        let mut notes = Vec::new();

        for lab in record.evidence().labs() {
            for (condition, weight) in weights.iter_mut() {
                let ratio = condition.lab_likelihood(lab);
                if condition.expected_flag(&lab.test_name).is_some() && ratio != 1.0 {
                    notes.push(format!(
                        "{} {} (LR {:.1}) for {}",
                        lab.test_name, lab.flag, ratio, condition.name
                    ));
                }
                *weight *= ratio;
            }
        }

        for report in record.evidence().imaging() {
            for (condition, weight) in weights.iter_mut() {
                let ratio = condition.imaging_likelihood(report);
                if ratio != 1.0 {
                    notes.push(format!(
                        "{} {} '{}' (LR {:.2}) for {}",
                        report.modality,
                        report.region,
                        report.impression,
                        ratio,
                        condition.name
                    ));
                }
                *weight *= ratio;
            }
        }

        weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.name.cmp(b.0.name)));
        weights.truncate(MAX_HYPOTHESES);
        (
            weights.into_iter().map(|(c, w)| (c.name, w)).collect(),
            notes,
        )
    }
}

impl Specialist for BayesianHypothesisSpecialist {
    fn role(&self) -> SpecialistRole {
        SpecialistRole::Hypothesis
    }

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        if !matches!(request, SpecialistRequest::Hypotheses(_)) {
            return Err(SpecialistError::Rejected(format!(
                "hypothesis specialist cannot serve '{}'",
                request.describe()
            )));
        }

        let (ranked, notes) = self.rank(record);
        let weights = ranked
            .into_iter()
            .map(|(name, w)| {
                NonEmptyText::new(name)
                    .map(|n| (n, w))
                    .map_err(|e| SpecialistError::Malformed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let differential = Differential::from_weights(weights, 1.0 - RESIDUAL_PROBABILITY_MASS)
            .map_err(|e| SpecialistError::Malformed(e.to_string()))?;

        let rationale = if notes.is_empty() {
            format!(
                "Priors from presenting complaint '{}' (age {}).",
                record.chief_complaint(),
                record.demographics().age
            )
        } else {
            format!(
                "Updated from {} evidence item(s): {}.",
                record.evidence().len(),
                notes.join("; ")
            )
        };

        Ok(SpecialistUpdate::Differential(HypothesisUpdate {
            differential,
            rationale,
        }))
    }
}
