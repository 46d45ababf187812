//! Lab ordering backed by recorded values and a seeded simulator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::evidence::{LabResult, LabSource};
use crate::knowledge::KnowledgeBase;
use crate::labs::{self, LabFlag, LabSpec};
use crate::record::PatientRecord;
use crate::specialist::{
    Specialist, SpecialistError, SpecialistRequest, SpecialistRole, SpecialistUpdate,
};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `bytes`, followed by a separator byte so that part boundaries matter.
fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .chain(std::iter::once(&0xff))
        .fold(hash, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Returns recorded lab values when the case holds them, otherwise simulates a value for the
/// case's hidden condition.
///
/// Simulated values depend only on the configured seed, the test, the simulation profile and
/// the complaint, so independent sessions for the same case see the same results.
#[derive(Debug)]
pub struct LabSimulator {
    seed: u64,
    knowledge: KnowledgeBase,
}

impl LabSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            knowledge: KnowledgeBase::builtin(),
        }
    }

    fn rng_for(&self, spec: &LabSpec, record: &PatientRecord) -> StdRng {
        let simulation = record.case_data().simulation.as_deref().unwrap_or("");
        let seed = [spec.code, simulation, record.chief_complaint().as_str()]
            .iter()
            .fold(self.seed ^ FNV_OFFSET_BASIS, |hash, part| {
                fnv1a(hash, part.as_bytes())
            });
        StdRng::seed_from_u64(seed)
    }

    fn simulate(&self, spec: &LabSpec, record: &PatientRecord) -> f64 {
        let expected = record
            .case_data()
            .simulation
            .as_deref()
            .and_then(|profile| self.knowledge.find(profile))
            .and_then(|condition| condition.expected_flag(spec.code));

        let mut rng = self.rng_for(spec, record);
        let range = spec.range;
        let value = match expected {
            Some(LabFlag::High) => range.high * rng.gen_range(1.3..3.0),
            Some(LabFlag::Low) => range.low * rng.gen_range(0.45..0.85),
            _ => rng.gen_range(range.low..=range.high),
        };
        (value * 100.0).round() / 100.0
    }
}

impl Specialist for LabSimulator {
    fn role(&self) -> SpecialistRole {
        SpecialistRole::Evidence
    }

    fn handle(
        &self,
        record: &PatientRecord,
        request: &SpecialistRequest,
    ) -> Result<SpecialistUpdate, SpecialistError> {
        let SpecialistRequest::Lab(order) = request else {
            return Err(SpecialistError::Rejected(format!(
                "evidence specialist cannot serve '{}'",
                request.describe()
            )));
        };
        let spec = labs::lookup(&order.test).ok_or_else(|| {
            SpecialistError::Malformed(format!("unsupported lab test '{}'", order.test))
        })?;

        let (value, source) = match record.case_data().recorded_lab(spec.code) {
            Some(value) => (value, LabSource::Recorded),
            None => (self.simulate(spec, record), LabSource::Simulated),
        };
        tracing::debug!("{} resulted {} ({:?})", spec.code, value, source);

        Ok(SpecialistUpdate::Lab(LabResult {
            test_name: spec.code.to_string(),
            value,
            unit: spec.unit.to_string(),
            reference_range: spec.range,
            flag: spec.classify(value),
            source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{PatientIntake, Sex, Vitals};
    use crate::record::CaseData;
    use crate::specialist::LabOrder;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(simulation: Option<&str>, recorded: &[(&str, f64)]) -> PatientRecord {
        let intake = PatientIntake::new(45, Sex::Male, "", "chest pain", Vitals::default()).unwrap();
        PatientRecord::from_intake(&intake, Utc::now())
            .unwrap()
            .with_case_data(CaseData {
                simulation: simulation.map(str::to_string),
                recorded_labs: recorded
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<BTreeMap<_, _>>(),
            })
    }

    fn order(simulator: &LabSimulator, record: &PatientRecord, test: &str) -> LabResult {
        let request = SpecialistRequest::Lab(LabOrder { test: test.into() });
        match simulator.handle(record, &request).unwrap() {
            SpecialistUpdate::Lab(lab) => lab,
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn seed_mixing_is_fixed_fnv1a() {
        assert_eq!(
            b"a".iter()
                .fold(FNV_OFFSET_BASIS, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME)),
            0xaf63_dc4c_8601_ec8c
        );
        assert_eq!(fnv1a(FNV_OFFSET_BASIS, b"a"), 0x089b_c907_b544_c769);
        assert_ne!(
            fnv1a(fnv1a(FNV_OFFSET_BASIS, b"ab"), b"c"),
            fnv1a(fnv1a(FNV_OFFSET_BASIS, b"a"), b"bc")
        );
    }

    #[test]
    fn recorded_value_takes_precedence() {
        let r = record(Some("cardiac_ischemia"), &[("TROPONIN", 0.02)]);
        let lab = order(&LabSimulator::new(42), &r, "troponin");
        assert_eq!(lab.value, 0.02);
        assert_eq!(lab.source, LabSource::Recorded);
        assert_eq!(lab.flag, LabFlag::Normal);
    }

    #[test]
    fn hidden_condition_drives_abnormal_values() {
        let r = record(Some("heart_attack"), &[]);
        let lab = order(&LabSimulator::new(42), &r, "TROPONIN");
        assert!(lab.flag.is_abnormal());
        assert!(lab.is_elevated());

        let anemic = record(Some("anemia"), &[]);
        assert!(order(&LabSimulator::new(42), &anemic, "HGB").is_depressed());
    }

    #[test]
    fn unrelated_tests_stay_in_range() {
        let r = record(Some("cardiac_ischemia"), &[]);
        let lab = order(&LabSimulator::new(42), &r, "GLUCOSE");
        assert_eq!(lab.flag, LabFlag::Normal);
    }

    #[test]
    fn same_seed_same_value() {
        let r = record(None, &[]);
        let a = order(&LabSimulator::new(7), &r, "WBC");
        let b = order(&LabSimulator::new(7), &r, "WBC");
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn unsupported_test_is_malformed() {
        let r = record(None, &[]);
        let request = SpecialistRequest::Lab(LabOrder {
            test: "unobtainium".into(),
        });
        assert!(matches!(
            LabSimulator::new(42).handle(&r, &request),
            Err(SpecialistError::Malformed(_))
        ));
    }
}
