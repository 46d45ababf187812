//! Built-in clinical knowledge: condition profiles, complaint priors and likelihood ratios.
//!
//! The hypothesis specialist ranks conditions with these tables, the judge reads the lab and
//! imaging signatures to pick discriminating tests, and the simulators use the same signatures
//! to produce results for a hidden condition.

use crate::evidence::{ImagingReport, LabResult, Modality};
use crate::labs::LabFlag;

/// Likelihood ratio when a lab moves in the direction a condition predicts.
const LR_LAB_MATCH: f64 = 6.0;
/// Likelihood ratio when a critical lab moves in the predicted direction.
const LR_LAB_CRITICAL_MATCH: f64 = 10.0;
/// Likelihood ratio when a lab a condition predicts to be abnormal comes back normal.
const LR_LAB_EXPECTED_ABNORMAL: f64 = 0.2;
/// Likelihood ratio when a predicted lab moves in the opposite direction.
const LR_LAB_OPPOSITE: f64 = 0.3;
/// Likelihood ratio for an abnormal lab a condition does not account for.
const LR_LAB_UNEXPLAINED: f64 = 0.3;
const LR_IMAGING_MATCH: f64 = 8.0;
const LR_IMAGING_NORMAL: f64 = 0.25;
const LR_IMAGING_OTHER: f64 = 0.5;

#[derive(Debug)]
pub struct LabSignature {
    pub code: &'static str,
    /// `High` or `Low`.
    pub expected: LabFlag,
}

#[derive(Debug)]
pub struct ImagingSignature {
    /// Studies able to show the finding, preferred first.
    pub modalities: &'static [Modality],
    pub region: &'static str,
    pub findings: &'static str,
    pub impression: &'static str,
}

#[derive(Debug)]
pub struct AgeModifier {
    pub min_age: u8,
    pub max_age: u8,
    pub factor: f64,
}

#[derive(Debug)]
pub struct ConditionProfile {
    /// Snake-case key used by simulation profiles.
    pub key: &'static str,
    /// Display name used in differentials.
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Complaint phrases that put the condition on the differential.
    pub keywords: &'static [&'static str],
    pub prior: f64,
    pub age_modifiers: &'static [AgeModifier],
    pub labs: &'static [LabSignature],
    pub imaging: Option<ImagingSignature>,
}

impl ConditionProfile {
    /// Number of keywords found in a lower-cased complaint.
    pub fn keyword_hits(&self, complaint_lower: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| complaint_lower.contains(*k))
            .count()
    }

    pub fn age_factor(&self, age: u8) -> f64 {
        self.age_modifiers
            .iter()
            .filter(|m| (m.min_age..=m.max_age).contains(&age))
            .map(|m| m.factor)
            .product()
    }

    pub fn expected_flag(&self, code: &str) -> Option<LabFlag> {
        self.labs
            .iter()
            .find(|s| s.code.eq_ignore_ascii_case(code))
            .map(|s| s.expected)
    }

    /// Likelihood ratio contributed by one lab result.
    pub fn lab_likelihood(&self, lab: &LabResult) -> f64 {
        let observed = if lab.is_elevated() {
            Some(LabFlag::High)
        } else if lab.is_depressed() {
            Some(LabFlag::Low)
        } else {
            None
        };

        match (self.expected_flag(&lab.test_name), observed) {
            (Some(expected), Some(direction)) if expected == direction => {
                if lab.flag == LabFlag::Critical {
                    LR_LAB_CRITICAL_MATCH
                } else {
                    LR_LAB_MATCH
                }
            }
            (Some(_), Some(_)) => LR_LAB_OPPOSITE,
            (Some(_), None) => LR_LAB_EXPECTED_ABNORMAL,
            (None, Some(_)) => LR_LAB_UNEXPLAINED,
            (None, None) => 1.0,
        }
    }

    /// Likelihood ratio contributed by one imaging report. Studies of other regions, or with
    /// a modality unable to show the finding, leave the condition unchanged.
    pub fn imaging_likelihood(&self, report: &ImagingReport) -> f64 {
        let Some(signature) = &self.imaging else {
            return 1.0;
        };
        if !signature.region.eq_ignore_ascii_case(&report.region)
            || !signature.modalities.contains(&report.modality)
        {
            return 1.0;
        }
        if report
            .impression
            .trim()
            .eq_ignore_ascii_case(signature.impression)
        {
            LR_IMAGING_MATCH
        } else if report.is_normal() {
            LR_IMAGING_NORMAL
        } else {
            LR_IMAGING_OTHER
        }
    }

    fn matches_name(&self, name: &str) -> bool {
        let wanted = name.trim();
        self.key.eq_ignore_ascii_case(wanted)
            || self.name.eq_ignore_ascii_case(wanted)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(wanted))
    }
}

const fn lab(code: &'static str, expected: LabFlag) -> LabSignature {
    LabSignature { code, expected }
}

const fn age(min_age: u8, max_age: u8, factor: f64) -> AgeModifier {
    AgeModifier {
        min_age,
        max_age,
        factor,
    }
}

static CONDITIONS: &[ConditionProfile] = &[
    ConditionProfile {
        key: "cardiac_ischemia",
        name: "Acute coronary syndrome",
        aliases: &["heart_attack", "acs", "myocardial infarction", "cardiac ischemia"],
        keywords: &["chest pain", "chest pressure", "chest tightness", "left arm", "jaw", "crushing"],
        prior: 0.35,
        age_modifiers: &[age(40, 255, 1.3), age(0, 29, 0.3)],
        labs: &[lab("TROPONIN", LabFlag::High)],
        imaging: None,
    },
    ConditionProfile {
        key: "pulmonary_embolism",
        name: "Pulmonary embolism",
        aliases: &["pe"],
        keywords: &["chest pain", "shortness of breath", "breathless", "pleuritic", "calf", "dyspnea"],
        prior: 0.15,
        age_modifiers: &[],
        labs: &[lab("D-DIMER", LabFlag::High)],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Ct],
            region: "chest",
            findings: "Filling defect within the segmental pulmonary arteries.",
            impression: "Pulmonary embolism.",
        }),
    },
    ConditionProfile {
        key: "pneumonia",
        name: "Pneumonia",
        aliases: &["infection", "community-acquired pneumonia"],
        keywords: &["cough", "fever", "chest pain", "shortness of breath", "sputum"],
        prior: 0.12,
        age_modifiers: &[age(65, 255, 1.3)],
        labs: &[lab("WBC", LabFlag::High), lab("CRP", LabFlag::High)],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Xray, Modality::Ct],
            region: "chest",
            findings: "Right lower lobe consolidation with air bronchograms.",
            impression: "Pneumonia.",
        }),
    },
    ConditionProfile {
        key: "heart_failure",
        name: "Heart failure",
        aliases: &["chf", "congestive heart failure"],
        keywords: &["shortness of breath", "dyspnea", "swelling", "edema", "orthopnea"],
        prior: 0.1,
        age_modifiers: &[age(60, 255, 1.5)],
        labs: &[lab("BNP", LabFlag::High)],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Xray, Modality::Ct],
            region: "chest",
            findings: "Cardiomegaly with bilateral interstitial edema.",
            impression: "Congestive heart failure.",
        }),
    },
    ConditionProfile {
        key: "sepsis",
        name: "Sepsis",
        aliases: &["septic shock"],
        keywords: &["fever", "chills", "rigors", "confusion", "infection"],
        prior: 0.12,
        age_modifiers: &[age(65, 255, 1.3)],
        labs: &[
            lab("WBC", LabFlag::High),
            lab("LACTATE", LabFlag::High),
            lab("CRP", LabFlag::High),
        ],
        imaging: None,
    },
    ConditionProfile {
        key: "appendicitis",
        name: "Acute appendicitis",
        aliases: &["appendicitis"],
        keywords: &["abdominal pain", "right lower", "belly", "nausea", "vomiting"],
        prior: 0.25,
        age_modifiers: &[age(0, 39, 1.3)],
        labs: &[lab("WBC", LabFlag::High), lab("CRP", LabFlag::High)],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Ct, Modality::Ultrasound],
            region: "abdomen",
            findings: "Dilated appendix with periappendiceal fat stranding.",
            impression: "Acute appendicitis.",
        }),
    },
    ConditionProfile {
        key: "ischemic_stroke",
        name: "Ischemic stroke",
        aliases: &["stroke", "cva"],
        keywords: &["weakness", "numbness", "slurred", "facial droop", "confusion", "vision loss"],
        prior: 0.3,
        age_modifiers: &[age(60, 255, 1.5)],
        labs: &[],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Ct, Modality::Mri],
            region: "head",
            findings: "Hypodensity in the left middle cerebral artery territory.",
            impression: "Acute ischemic stroke.",
        }),
    },
    ConditionProfile {
        key: "subarachnoid_hemorrhage",
        name: "Subarachnoid hemorrhage",
        aliases: &["bleed", "sah", "brain bleed"],
        keywords: &["headache", "thunderclap", "neck stiffness", "worst headache"],
        prior: 0.15,
        age_modifiers: &[],
        labs: &[],
        imaging: Some(ImagingSignature {
            modalities: &[Modality::Ct, Modality::Mri],
            region: "head",
            findings: "Hyperdensity within the basal cisterns.",
            impression: "Subarachnoid hemorrhage.",
        }),
    },
    ConditionProfile {
        key: "migraine",
        name: "Migraine",
        aliases: &[],
        keywords: &["headache", "aura", "light sensitivity", "throbbing"],
        prior: 0.3,
        age_modifiers: &[age(60, 255, 0.5)],
        labs: &[],
        imaging: None,
    },
    ConditionProfile {
        key: "acute_kidney_injury",
        name: "Acute kidney injury",
        aliases: &["kidney_failure", "aki", "renal failure"],
        keywords: &["urine", "swelling", "nausea", "fatigue"],
        prior: 0.1,
        age_modifiers: &[age(65, 255, 1.3)],
        labs: &[lab("CREATININE", LabFlag::High), lab("K", LabFlag::High)],
        imaging: None,
    },
    ConditionProfile {
        key: "anemia",
        name: "Anemia",
        aliases: &["anaemia"],
        keywords: &["fatigue", "tired", "pale", "dizziness", "weakness", "shortness of breath"],
        prior: 0.2,
        age_modifiers: &[],
        labs: &[lab("HGB", LabFlag::Low)],
        imaging: None,
    },
    ConditionProfile {
        key: "hyperglycemia",
        name: "Hyperglycemia",
        aliases: &["diabetes", "dka"],
        keywords: &["thirst", "urination", "polyuria", "fatigue", "blurred vision"],
        prior: 0.2,
        age_modifiers: &[],
        labs: &[lab("GLUCOSE", LabFlag::High)],
        imaging: None,
    },
    ConditionProfile {
        key: "gerd",
        name: "Gastroesophageal reflux",
        aliases: &["reflux", "heartburn"],
        keywords: &["chest pain", "burning", "heartburn", "after meals", "abdominal pain"],
        prior: 0.2,
        age_modifiers: &[],
        labs: &[],
        imaging: None,
    },
    ConditionProfile {
        key: "musculoskeletal",
        name: "Musculoskeletal chest pain",
        aliases: &["costochondritis", "muscle strain"],
        keywords: &["chest pain", "chest wall", "tender", "on movement"],
        prior: 0.18,
        age_modifiers: &[age(0, 39, 1.3)],
        labs: &[],
        imaging: None,
    },
];

/// Read-only table of condition profiles.
#[derive(Clone, Copy, Debug)]
pub struct KnowledgeBase {
    conditions: &'static [ConditionProfile],
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    pub fn builtin() -> Self {
        Self {
            conditions: CONDITIONS,
        }
    }

    pub fn conditions(&self) -> &'static [ConditionProfile] {
        self.conditions
    }

    /// Look up a condition by key, display name or alias, case-insensitively.
    pub fn find(&self, name: &str) -> Option<&'static ConditionProfile> {
        self.conditions.iter().find(|c| c.matches_name(name))
    }

    /// Prior weights for a complaint and age.
    ///
    /// Conditions whose keywords appear in the complaint are weighted by their base prior,
    /// boosted by a quarter for every additional keyword hit. When nothing matches, every
    /// condition keeps its base prior.
    pub fn priors(&self, complaint: &str, age: u8) -> Vec<(&'static ConditionProfile, f64)> {
        let lower = complaint.to_lowercase();
        let matched: Vec<_> = self
            .conditions
            .iter()
            .filter_map(|c| {
                let hits = c.keyword_hits(&lower);
                (hits > 0).then(|| {
                    let boost = 1.0 + 0.25 * (hits - 1) as f64;
                    (c, c.prior * boost * c.age_factor(age))
                })
            })
            .collect();

        if !matched.is_empty() {
            return matched;
        }
        self.conditions
            .iter()
            .map(|c| (c, c.prior * c.age_factor(age)))
            .collect()
    }

    /// True when any condition's keywords appear in the complaint.
    pub fn recognises(&self, complaint: &str) -> bool {
        let lower = complaint.to_lowercase();
        self.conditions.iter().any(|c| c.keyword_hits(&lower) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::LabSource;
    use crate::labs;

    fn lab_result(code: &str, value: f64) -> LabResult {
        let spec = labs::lookup(code).unwrap();
        LabResult {
            test_name: spec.code.into(),
            value,
            unit: spec.unit.into(),
            reference_range: spec.range,
            flag: spec.classify(value),
            source: LabSource::Simulated,
        }
    }

    #[test]
    fn find_matches_key_name_and_alias() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(kb.find("heart_attack").unwrap().key, "cardiac_ischemia");
        assert_eq!(kb.find("Pulmonary Embolism").unwrap().key, "pulmonary_embolism");
        assert_eq!(kb.find("kidney_failure").unwrap().key, "acute_kidney_injury");
        assert!(kb.find("dragon pox").is_none());
    }

    #[test]
    fn every_signature_lab_is_on_the_panel() {
        for condition in KnowledgeBase::builtin().conditions() {
            for signature in condition.labs {
                assert!(
                    labs::lookup(signature.code).is_some(),
                    "{} references unknown lab {}",
                    condition.key,
                    signature.code
                );
            }
        }
    }

    #[test]
    fn chest_pain_priors_favour_cardiac_causes_in_middle_age() {
        let kb = KnowledgeBase::builtin();
        let priors = kb.priors("chest pain", 45);
        let acs = priors
            .iter()
            .find(|(c, _)| c.key == "cardiac_ischemia")
            .unwrap()
            .1;
        assert!(priors.iter().all(|(_, w)| *w <= acs));
        assert!(priors.iter().all(|(c, _)| c.key != "hyperglycemia"));
    }

    #[test]
    fn unrecognised_complaint_falls_back_to_all_conditions() {
        let kb = KnowledgeBase::builtin();
        assert!(!kb.recognises("itchy elbow"));
        assert_eq!(kb.priors("itchy elbow", 30).len(), kb.conditions().len());
    }

    #[test]
    fn lab_likelihoods_follow_signature_direction() {
        let acs = KnowledgeBase::builtin().find("cardiac_ischemia").unwrap();
        assert_eq!(acs.lab_likelihood(&lab_result("TROPONIN", 0.06)), LR_LAB_MATCH);
        assert_eq!(
            acs.lab_likelihood(&lab_result("TROPONIN", 0.5)),
            LR_LAB_CRITICAL_MATCH
        );
        assert_eq!(
            acs.lab_likelihood(&lab_result("TROPONIN", 0.01)),
            LR_LAB_EXPECTED_ABNORMAL
        );
        assert_eq!(acs.lab_likelihood(&lab_result("WBC", 7.0)), 1.0);
        assert_eq!(acs.lab_likelihood(&lab_result("WBC", 15.0)), LR_LAB_UNEXPLAINED);
    }

    #[test]
    fn imaging_likelihood_ignores_other_regions() {
        let pe = KnowledgeBase::builtin().find("pe").unwrap();
        let ct_chest = |impression: &str| ImagingReport {
            modality: Modality::Ct,
            region: "chest".into(),
            findings: String::new(),
            impression: impression.into(),
        };
        assert_eq!(pe.imaging_likelihood(&ct_chest("Pulmonary embolism.")), LR_IMAGING_MATCH);
        assert_eq!(pe.imaging_likelihood(&ct_chest("Normal.")), LR_IMAGING_NORMAL);
        assert_eq!(pe.imaging_likelihood(&ct_chest("Pneumonia.")), LR_IMAGING_OTHER);

        let head = ImagingReport {
            region: "head".into(),
            ..ct_chest("Normal.")
        };
        assert_eq!(pe.imaging_likelihood(&head), 1.0);
    }
}
