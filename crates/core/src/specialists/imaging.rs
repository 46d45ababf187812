//! Radiology simulator.

use crate::evidence::ImagingReport;
use crate::knowledge::KnowledgeBase;
use crate::record::PatientRecord;
use crate::specialist::{
    Specialist, SpecialistError, SpecialistRequest, SpecialistRole, SpecialistUpdate,
};

const NORMAL_FINDINGS: &str = "No acute abnormality.";
const NORMAL_IMPRESSION: &str = "Normal.";

/// Reports the hidden condition's signature finding when the study can show it, and a normal
/// study otherwise.
#[derive(Debug, Default)]
pub struct ImagingSimulator {
    knowledge: KnowledgeBase,
}

impl ImagingSimulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Specialist for ImagingSimulator {
    fn role(&self) -> SpecialistRole {
        SpecialistRole::Imaging
    }

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        let SpecialistRequest::Imaging(order) = request else {
            return Err(SpecialistError::Rejected(format!(
                "imaging specialist cannot serve '{}'",
                request.describe()
            )));
        };
        let region = order.region.trim().to_lowercase();
        if region.is_empty() {
            return Err(SpecialistError::Malformed(
                "imaging order has no region".into(),
            ));
        }

        let signature = record
            .case_data()
            .simulation
            .as_deref()
            .and_then(|profile| self.knowledge.find(profile))
            .and_then(|condition| condition.imaging.as_ref())
            .filter(|s| s.region == region && s.modalities.contains(&order.modality));

        let (findings, impression) = match signature {
            Some(s) => (s.findings, s.impression),
            None => (NORMAL_FINDINGS, NORMAL_IMPRESSION),
        };

        Ok(SpecialistUpdate::Imaging(ImagingReport {
            modality: order.modality,
            region,
            findings: findings.to_string(),
            impression: impression.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Modality;
    use crate::intake::{PatientIntake, Sex, Vitals};
    use crate::record::CaseData;
    use crate::specialist::ImagingOrder;
    use chrono::Utc;

    fn record(simulation: &str) -> PatientRecord {
        let intake =
            PatientIntake::new(60, Sex::Female, "", "shortness of breath", Vitals::default())
                .unwrap();
        PatientRecord::from_intake(&intake, Utc::now())
            .unwrap()
            .with_case_data(CaseData {
                simulation: Some(simulation.into()),
                ..CaseData::default()
            })
    }

    fn study(record: &PatientRecord, modality: Modality, region: &str) -> ImagingReport {
        let request = SpecialistRequest::Imaging(ImagingOrder {
            modality,
            region: region.into(),
        });
        match ImagingSimulator::new().handle(record, &request).unwrap() {
            SpecialistUpdate::Imaging(report) => report,
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn embolism_needs_ct() {
        let r = record("pe");
        assert_eq!(
            study(&r, Modality::Ct, "Chest").impression,
            "Pulmonary embolism."
        );
        assert!(study(&r, Modality::Xray, "chest").is_normal());
    }

    #[test]
    fn other_regions_are_normal() {
        let r = record("pneumonia");
        assert_eq!(study(&r, Modality::Xray, "chest").impression, "Pneumonia.");
        assert!(study(&r, Modality::Ct, "abdomen").is_normal());
    }

    #[test]
    fn blank_region_is_malformed() {
        let request = SpecialistRequest::Imaging(ImagingOrder {
            modality: Modality::Ct,
            region: "  ".into(),
        });
        assert!(matches!(
            ImagingSimulator::new().handle(&record("pe"), &request),
            Err(SpecialistError::Malformed(_))
        ));
    }
}
